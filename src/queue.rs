//! Durable queue of expense creations captured while offline.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Database;

/// Expense fields as the page submits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpense {
  pub title: String,
  pub amount: f64,
  pub category: String,
  pub date: NaiveDate,
  #[serde(default)]
  pub description: String,
}

/// An expense creation waiting to be replayed against the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingExpense {
  pub id: String,
  #[serde(flatten)]
  pub expense: NewExpense,
}

impl PendingExpense {
  /// Wrap an expense with a freshly generated id.
  pub fn new(expense: NewExpense) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      expense,
    }
  }
}

/// Queue of pending mutations, replayed first-in first-out.
pub trait MutationQueue: Send + Sync {
  fn enqueue(&self, pending: &PendingExpense) -> Result<()>;

  /// All queued entries, oldest first.
  fn pending(&self) -> Result<Vec<PendingExpense>>;

  /// Drop an entry after a successful replay. Returns false if it was gone.
  fn remove(&self, id: &str) -> Result<bool>;
}

/// SQLite-backed mutation queue.
pub struct SqliteQueue {
  db: Arc<Database>,
}

impl SqliteQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl MutationQueue for SqliteQueue {
  fn enqueue(&self, pending: &PendingExpense) -> Result<()> {
    let payload = serde_json::to_string(pending)
      .map_err(|e| eyre!("Failed to serialize pending expense: {}", e))?;

    self
      .db
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO pending_expenses (id, payload) VALUES (?, ?)",
        params![pending.id, payload],
      )
      .map_err(|e| eyre!("Failed to queue expense {}: {}", pending.id, e))?;

    Ok(())
  }

  fn pending(&self) -> Result<Vec<PendingExpense>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT payload FROM pending_expenses ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let payloads = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to read pending expenses: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read pending expense: {}", e))?;

    payloads
      .iter()
      .map(|payload| {
        serde_json::from_str(payload)
          .map_err(|e| eyre!("Failed to deserialize pending expense: {}", e))
      })
      .collect()
  }

  fn remove(&self, id: &str) -> Result<bool> {
    let removed = self
      .db
      .conn()?
      .execute("DELETE FROM pending_expenses WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove pending expense {}: {}", id, e))?;

    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lunch() -> NewExpense {
    NewExpense {
      title: "Lunch".to_string(),
      amount: 12.5,
      category: "Food".to_string(),
      date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
      description: "Team lunch".to_string(),
    }
  }

  fn queue() -> SqliteQueue {
    SqliteQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn test_payload_shape_is_flat() {
    let pending = PendingExpense {
      id: "abc".to_string(),
      expense: lunch(),
    };

    let value = serde_json::to_value(&pending).unwrap();
    assert_eq!(
      value,
      serde_json::json!({
        "id": "abc",
        "title": "Lunch",
        "amount": 12.5,
        "category": "Food",
        "date": "2024-03-01",
        "description": "Team lunch"
      })
    );
  }

  #[test]
  fn test_pending_is_fifo() {
    let queue = queue();
    let first = PendingExpense::new(lunch());
    let second = PendingExpense::new(NewExpense {
      title: "Taxi".to_string(),
      ..lunch()
    });

    queue.enqueue(&first).unwrap();
    queue.enqueue(&second).unwrap();

    assert_eq!(queue.pending().unwrap(), vec![first, second]);
  }

  #[test]
  fn test_remove_drops_only_that_entry() {
    let queue = queue();
    let first = PendingExpense::new(lunch());
    let second = PendingExpense::new(lunch());
    queue.enqueue(&first).unwrap();
    queue.enqueue(&second).unwrap();

    assert!(queue.remove(&first.id).unwrap());
    assert!(!queue.remove(&first.id).unwrap());
    assert_eq!(queue.pending().unwrap(), vec![second]);
  }

  #[test]
  fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    let pending = PendingExpense::new(lunch());

    SqliteQueue::new(Arc::new(Database::open(&path).unwrap()))
      .enqueue(&pending)
      .unwrap();

    let reopened = SqliteQueue::new(Arc::new(Database::open(&path).unwrap()));
    assert_eq!(reopened.pending().unwrap(), vec![pending]);
  }
}
