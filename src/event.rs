use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::CacheStorage;
use crate::net::{Fetch, Request};
use crate::notify::{ClickOutcome, Notification};
use crate::queue::MutationQueue;
use crate::worker::{FetchOutcome, OfflineWorker, SyncReport, WorkerError};

/// Events the host delivers to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  /// An outgoing request from a page
  Fetch(Request),
  /// Background sync fired for a tag
  Sync { tag: String },
  /// Push message, with its text payload if any
  Push { payload: Option<String> },
  NotificationClick { action: Option<String> },
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed,
  Activated { evicted: Vec<String> },
  Fetch(FetchOutcome),
  Synced(Option<SyncReport>),
  Notification(Notification),
  Click(ClickOutcome),
}

#[derive(Error, Debug)]
pub enum DispatchError {
  #[error(transparent)]
  Worker(#[from] WorkerError),

  #[error("Worker is not running")]
  Closed,

  #[error("Unexpected outcome: {0}")]
  Mismatch(String),
}

type Envelope = (WorkerEvent, oneshot::Sender<Result<EventOutcome, WorkerError>>);

/// Handle for delivering events to a running worker.
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
  /// Deliver an event and wait for its outcome.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, DispatchError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send((event, reply))
      .map_err(|_| DispatchError::Closed)?;

    rx.await
      .map_err(|_| DispatchError::Closed)?
      .map_err(DispatchError::from)
  }

  /// Deliver an intercepted request.
  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome, DispatchError> {
    match self.dispatch(WorkerEvent::Fetch(request)).await? {
      EventOutcome::Fetch(outcome) => Ok(outcome),
      other => Err(DispatchError::Mismatch(format!("{:?}", other))),
    }
  }
}

/// Event loop that runs every delivered event as its own task.
///
/// Tasks for different events interleave freely; they share the worker,
/// whose storage serializes individual operations.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Envelope>,
  task: JoinHandle<()>,
}

impl EventHandler {
  /// Start the event loop for a worker.
  pub fn spawn<S, F, Q>(worker: Arc<OfflineWorker<S, F, Q>>) -> Self
  where
    S: CacheStorage + 'static,
    F: Fetch + 'static,
    Q: MutationQueue + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let task = tokio::spawn(async move {
      while let Some((event, reply)) = rx.recv().await {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
          let outcome = handle(&worker, event).await;
          if reply.send(outcome).is_err() {
            debug!("Event outcome dropped, caller went away");
          }
        });
      }
    });

    Self { tx, task }
  }

  pub fn sender(&self) -> EventSender {
    EventSender {
      tx: self.tx.clone(),
    }
  }

  /// Stop accepting events and wait for the loop to drain.
  ///
  /// The loop ends once every `EventSender` handed out is dropped.
  pub async fn shutdown(self) {
    drop(self.tx);
    let _ = self.task.await;
  }
}

async fn handle<S, F, Q>(
  worker: &OfflineWorker<S, F, Q>,
  event: WorkerEvent,
) -> Result<EventOutcome, WorkerError>
where
  S: CacheStorage,
  F: Fetch,
  Q: MutationQueue,
{
  match event {
    WorkerEvent::Install => worker.install().await.map(|()| EventOutcome::Installed),
    WorkerEvent::Activate => worker
      .activate()
      .map(|evicted| EventOutcome::Activated { evicted }),
    WorkerEvent::Fetch(request) => worker
      .handle_fetch(&request)
      .await
      .map(EventOutcome::Fetch),
    WorkerEvent::Sync { tag } => worker.sync(&tag).await.map(EventOutcome::Synced),
    WorkerEvent::Push { payload } => Ok(EventOutcome::Notification(
      worker.push(payload.as_deref()),
    )),
    WorkerEvent::NotificationClick { action } => Ok(EventOutcome::Click(
      worker.notification_click(action.as_deref()),
    )),
  }
}
