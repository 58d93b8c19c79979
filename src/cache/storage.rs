//! SQLite implementation of the cache storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::traits::{CacheStorage, CachedResponse};
use crate::db::{parse_datetime, Database};
use crate::net::{RequestKey, Response, ResponseKind};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

fn ensure_store(conn: &Connection, cache_name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_stores (cache_name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, entry_hash, method, url, status, status_text, headers, body, kind, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        key.cache_hash(),
        key.method,
        key.url,
        response.status,
        response.status_text,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {} {}: {}", key.method, key.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    let conn = self.db.conn()?;
    ensure_store(&conn, cache_name)
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT cache_name FROM cache_stores ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache_name, e))?;

    let removed = tx
      .execute(
        "DELETE FROM cache_stores WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn mark_activated(&self, cache_name: &str) -> Result<()> {
    let conn = self.db.conn()?;
    ensure_store(&conn, cache_name)?;
    conn
      .execute(
        "UPDATE cache_stores SET activated_at = datetime('now') WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to mark cache {} activated: {}", cache_name, e))?;
    Ok(())
  }

  fn is_activated(&self, cache_name: &str) -> Result<bool> {
    let conn = self.db.conn()?;

    let activated: Option<bool> = conn
      .query_row(
        "SELECT activated_at IS NOT NULL FROM cache_stores WHERE cache_name = ?",
        params![cache_name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read state of cache {}: {}", cache_name, e))?;

    Ok(activated.unwrap_or(false))
  }

  fn match_entry(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, String, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT status, status_text, headers, body, kind, cached_at FROM cache_entries
         WHERE cache_name = ? AND entry_hash = ?",
        params![cache_name, key.cache_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} {}: {}", key.method, key.url, e))?;

    let Some((status, status_text, headers, body, kind, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
    let kind =
      ResponseKind::parse(&kind).ok_or_else(|| eyre!("Unknown response kind '{}'", kind))?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        status_text,
        headers,
        body,
        kind,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.db.conn()?;
    ensure_store(&conn, cache_name)?;
    insert_entry(&conn, cache_name, key, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_store(&tx, cache_name)?;
    for (key, response) in entries {
      insert_entry(&tx, cache_name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.db.conn()?;

    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ? AND entry_hash = ?",
        params![cache_name, key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to delete {} {}: {}", key.method, key.url, e))?;

    Ok(removed > 0)
  }

  fn keys(&self, cache_name: &str) -> Result<Vec<RequestKey>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE cache_name = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![cache_name], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", cache_name, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}
