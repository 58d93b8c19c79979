/// Schema for the cache stores and the pending mutation queue.
pub const SCHEMA: &str = r#"
-- Named cache stores (one per worker version)
CREATE TABLE IF NOT EXISTS cache_stores (
    cache_name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    -- Set once the owning version has activated
    activated_at TEXT
);

-- Cached responses, keyed by request hash within a store
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    entry_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    kind TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, entry_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_store ON cache_entries(cache_name);

-- Expense creations captured while offline, replayed in seq order
CREATE TABLE IF NOT EXISTS pending_expenses (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
