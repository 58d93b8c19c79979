//! Open page clients and the messages the worker exchanges with them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

pub type ClientId = u64;

/// Messages the worker posts to a page.
#[derive(Debug)]
pub enum ClientMessage {
  /// Ask the page for its session token; the page answers once on `reply`.
  GetToken { reply: oneshot::Sender<TokenReply> },
}

/// A page's answer to `GetToken`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReply {
  pub token: Option<String>,
}

/// Snapshot of one open page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
  pub id: ClientId,
  pub url: Url,
  pub controlled: bool,
}

/// What the host should do with a window after a notification click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowAction {
  /// An open page already shows the target; bring it to front
  Focus(ClientId),
  /// No page shows the target; open a new one
  Open(String),
}

struct PageClient {
  info: ClientInfo,
  tx: mpsc::UnboundedSender<ClientMessage>,
}

/// Registry of open pages.
///
/// Pages that connect while the worker controls clients are controlled
/// straight away; earlier ones only after `claim`.
#[derive(Default)]
pub struct Clients {
  pages: Mutex<Vec<PageClient>>,
  next_id: AtomicU64,
  controlling: AtomicBool,
}

impl Clients {
  pub fn new() -> Self {
    Self::default()
  }

  fn pages(&self) -> MutexGuard<'_, Vec<PageClient>> {
    self.pages.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Register an open page. Messages posted to it arrive on the receiver.
  pub fn connect(&self, url: Url) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let (tx, rx) = mpsc::unbounded_channel();
    let controlled = self.controlling.load(Ordering::SeqCst);
    debug!(client = id, url = %url, controlled, "Page connected");

    self.pages().push(PageClient {
      info: ClientInfo { id, url, controlled },
      tx,
    });

    (id, rx)
  }

  pub fn disconnect(&self, id: ClientId) {
    self.pages().retain(|page| page.info.id != id);
  }

  /// Take control of every open page. Returns how many pages are controlled.
  pub fn claim(&self) -> usize {
    self.controlling.store(true, Ordering::SeqCst);
    let mut pages = self.pages();
    for page in pages.iter_mut() {
      page.info.controlled = true;
    }
    pages.len()
  }

  /// Stop controlling pages (worker shutting down).
  pub fn release(&self) {
    self.controlling.store(false, Ordering::SeqCst);
    for page in self.pages().iter_mut() {
      page.info.controlled = false;
    }
  }

  /// Controlled pages, in connection order.
  pub fn match_all(&self) -> Vec<ClientInfo> {
    self
      .pages()
      .iter()
      .filter(|page| page.info.controlled && !page.tx.is_closed())
      .map(|page| page.info.clone())
      .collect()
  }

  /// Post a message to one page. Returns false if the page is gone.
  pub fn post_message(&self, id: ClientId, message: ClientMessage) -> bool {
    self
      .pages()
      .iter()
      .find(|page| page.info.id == id)
      .map(|page| page.tx.send(message).is_ok())
      .unwrap_or(false)
  }

  /// Ask the first controlled page for its session token.
  ///
  /// No page, a page that drops the request, and a page that does not answer
  /// within `timeout` all yield `None`.
  pub async fn request_token(&self, timeout: Duration) -> Option<String> {
    let Some(client) = self.match_all().into_iter().next() else {
      debug!("No open page to ask for a token");
      return None;
    };

    let (reply, rx) = oneshot::channel();
    if !self.post_message(client.id, ClientMessage::GetToken { reply }) {
      warn!(client = client.id, "Page went away before the token request");
      return None;
    }

    match tokio::time::timeout(timeout, rx).await {
      Ok(Ok(TokenReply { token })) => token,
      Ok(Err(_)) => {
        warn!(client = client.id, "Page dropped the token request");
        None
      }
      Err(_) => {
        warn!(client = client.id, timeout = ?timeout, "Page did not answer the token request");
        None
      }
    }
  }

  /// Focus a page showing `path`, or ask for a new one. Query and fragment
  /// of open pages are ignored.
  pub fn focus_or_open(&self, path: &str) -> WindowAction {
    self
      .match_all()
      .into_iter()
      .find(|client| client.url.path() == path)
      .map(|client| WindowAction::Focus(client.id))
      .unwrap_or_else(|| WindowAction::Open(path.to_string()))
  }
}
