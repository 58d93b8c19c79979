use reqwest::Method;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{OfflineWorker, WorkerError};
use crate::cache::CacheStorage;
use crate::net::{fetch_with_timeout, Fetch, FetchError, Request};
use crate::queue::{MutationQueue, PendingExpense};

/// Outcome of one background sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  /// Ids replayed and removed from the queue
  pub synced: Vec<String>,
  /// Ids left queued for the next cycle
  pub failed: Vec<String>,
}

#[derive(Error, Debug)]
enum ReplayError {
  #[error("Failed to encode expense: {0}")]
  Encode(#[from] serde_json::Error),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("Server rejected expense with status {0}")]
  Rejected(u16),
}

impl<S: CacheStorage, F: Fetch, Q: MutationQueue> OfflineWorker<S, F, Q> {
  /// Handle a background sync trigger.
  ///
  /// Tags other than the expense sync tag are ignored (`None`). Queued
  /// expenses are replayed oldest first; each failure is logged and the entry
  /// stays queued, and later entries are still attempted.
  pub async fn sync(&self, tag: &str) -> Result<Option<SyncReport>, WorkerError> {
    if tag != self.settings.sync_tag {
      debug!(tag, "Ignoring unknown sync tag");
      return Ok(None);
    }
    info!(tag, "Background sync triggered");

    let pending = self.queue.pending().map_err(|e| {
      error!(error = %e, "Sync failed");
      WorkerError::Storage(e)
    })?;

    let mut report = SyncReport::default();
    if pending.is_empty() {
      return Ok(Some(report));
    }
    info!(count = pending.len(), "Syncing offline expenses");

    for expense in pending {
      report.attempted += 1;
      match self.replay(&expense).await {
        Ok(()) => {
          if let Err(e) = self.queue.remove(&expense.id) {
            warn!(id = %expense.id, error = %e, "Synced expense but failed to dequeue it");
          }
          info!(id = %expense.id, title = %expense.expense.title, "Synced expense");
          report.synced.push(expense.id);
        }
        Err(e) => {
          error!(id = %expense.id, error = %e, "Failed to sync expense");
          report.failed.push(expense.id);
        }
      }
    }

    Ok(Some(report))
  }

  async fn replay(&self, expense: &PendingExpense) -> Result<(), ReplayError> {
    let token = self
      .clients
      .request_token(self.settings.token_timeout)
      .await;
    if token.is_none() {
      warn!(id = %expense.id, "No session token available, sending unauthenticated");
    }

    let request = Request::json(Method::POST, self.settings.expenses_url.clone(), expense)?
      .with_bearer(token.as_deref());
    let response = fetch_with_timeout(
      self.fetcher.as_ref(),
      &request,
      self.settings.fetch_timeout,
    )
    .await?;

    if response.ok() {
      Ok(())
    } else {
      Err(ReplayError::Rejected(response.status))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clients::{ClientMessage, TokenReply};
  use crate::net::Response;
  use crate::testing::sample_expense;
  use crate::worker::tests::harness;
  use url::Url;

  const EXPENSES: &str = "http://localhost:3000/api/expenses";

  fn serve_token(h: &crate::worker::tests::Harness, token: &'static str) {
    h.clients.claim();
    let (_id, mut rx) = h.clients.connect(Url::parse("http://localhost:3000/").unwrap());
    tokio::spawn(async move {
      while let Some(ClientMessage::GetToken { reply }) = rx.recv().await {
        let _ = reply.send(TokenReply {
          token: Some(token.to_string()),
        });
      }
    });
  }

  #[tokio::test]
  async fn test_sync_removes_success_and_keeps_failure() {
    let h = harness();
    let first = PendingExpense::new(sample_expense("Lunch"));
    let second = PendingExpense::new(sample_expense("Taxi"));
    h.queue.enqueue(&first).unwrap();
    h.queue.enqueue(&second).unwrap();
    h.fetcher.respond("POST", EXPENSES, Response::new(201, "{}"));
    h.fetcher.respond("POST", EXPENSES, Response::new(500, "boom"));

    let report = h.worker.sync("expense-sync").await.unwrap().unwrap();

    assert_eq!(report.attempted, 2);
    assert_eq!(report.synced, vec![first.id.clone()]);
    assert_eq!(report.failed, vec![second.id.clone()]);
    assert_eq!(h.queue.pending().unwrap(), vec![second]);
  }

  #[tokio::test]
  async fn test_sync_continues_after_network_error() {
    let h = harness();
    let first = PendingExpense::new(sample_expense("Lunch"));
    let second = PendingExpense::new(sample_expense("Taxi"));
    h.queue.enqueue(&first).unwrap();
    h.queue.enqueue(&second).unwrap();
    h.fetcher.fail("POST", EXPENSES);
    h.fetcher.respond("POST", EXPENSES, Response::new(201, "{}"));

    let report = h.worker.sync("expense-sync").await.unwrap().unwrap();

    assert_eq!(report.failed, vec![first.id.clone()]);
    assert_eq!(report.synced, vec![second.id]);
    assert_eq!(h.queue.pending().unwrap(), vec![first]);
  }

  #[tokio::test]
  async fn test_sync_posts_payload_with_bearer_token() {
    let h = harness();
    serve_token(&h, "jwt-token");
    let pending = PendingExpense::new(sample_expense("Lunch"));
    h.queue.enqueue(&pending).unwrap();
    h.fetcher.respond("POST", EXPENSES, Response::new(201, "{}"));

    h.worker.sync("expense-sync").await.unwrap();

    let calls = h.fetcher.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0]
      .headers
      .contains(&("Authorization".to_string(), "Bearer jwt-token".to_string())));
    let body: PendingExpense = serde_json::from_slice(calls[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body, pending);
  }

  #[tokio::test]
  async fn test_sync_without_pages_sends_unauthenticated() {
    let h = harness();
    h.queue
      .enqueue(&PendingExpense::new(sample_expense("Lunch")))
      .unwrap();
    h.fetcher.respond("POST", EXPENSES, Response::new(401, "unauthorized"));

    let report = h.worker.sync("expense-sync").await.unwrap().unwrap();

    let calls = h.fetcher.calls();
    assert!(calls[0].headers.iter().all(|(k, _)| k != "Authorization"));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(h.queue.pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_unknown_tag_is_ignored() {
    let h = harness();
    h.queue
      .enqueue(&PendingExpense::new(sample_expense("Lunch")))
      .unwrap();

    assert_eq!(h.worker.sync("other-sync").await.unwrap(), None);
    assert_eq!(h.fetcher.call_count(), 0);
  }

  #[tokio::test]
  async fn test_empty_queue_makes_no_requests() {
    let h = harness();

    let report = h.worker.sync("expense-sync").await.unwrap().unwrap();

    assert_eq!(report, SyncReport::default());
    assert_eq!(h.fetcher.call_count(), 0);
  }
}
