use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clients::{ClientMessage, TokenReply};

/// The page's session token, held in memory.
#[derive(Debug, Default)]
pub struct Session {
  token: RwLock<Option<String>>,
}

impl Session {
  pub fn new(token: Option<String>) -> Self {
    Self {
      token: RwLock::new(token),
    }
  }

  pub fn token(&self) -> Option<String> {
    self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn set_token(&self, token: String) {
    *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
  }

  /// Forget the token (logout or expiry).
  pub fn clear(&self) {
    *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
  }

  pub fn is_authenticated(&self) -> bool {
    self.token().is_some()
  }

  /// Answer worker messages for a page until its channel closes.
  pub fn serve(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<ClientMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        match message {
          ClientMessage::GetToken { reply } => {
            let token = self.token();
            debug!(present = token.is_some(), "Answering token request");
            let _ = reply.send(TokenReply { token });
          }
        }
      }
    })
  }
}
