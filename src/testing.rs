//! Test doubles shared by the module tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::net::{Fetch, FetchError, Request, Response};

#[derive(Clone)]
enum Reply {
  Respond(Response),
  Fail,
}

/// Fetcher that replays canned replies and records every request it sees.
///
/// Routes are keyed by method and URL. A route with several replies pops them
/// in order and keeps repeating the last one. Unknown routes fail as if the
/// network were down.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<(String, String), VecDeque<Reply>>>,
  calls: Mutex<Vec<Request>>,
  offline: AtomicBool,
  delay: Option<Duration>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  fn push(&self, method: &str, url: &str, reply: Reply) {
    self
      .routes
      .lock()
      .unwrap()
      .entry((method.to_string(), url.to_string()))
      .or_default()
      .push_back(reply);
  }

  pub fn respond(&self, method: &str, url: &str, response: Response) {
    self.push(method, url, Reply::Respond(response));
  }

  pub fn fail(&self, method: &str, url: &str) {
    self.push(method, url, Reply::Fail);
  }

  /// Make every request fail regardless of routes.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  fn next_reply(&self, request: &Request) -> Option<Reply> {
    let mut routes = self.routes.lock().unwrap();
    let queue = routes.get_mut(&(request.method.as_str().to_string(), request.url.to_string()))?;
    if queue.len() > 1 {
      queue.pop_front()
    } else {
      queue.front().cloned()
    }
  }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    self.calls.lock().unwrap().push(request.clone());

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    if self.offline.load(Ordering::SeqCst) {
      return Err(FetchError::Unreachable(request.url.to_string()));
    }

    match self.next_reply(request) {
      Some(Reply::Respond(response)) => Ok(response),
      Some(Reply::Fail) | None => Err(FetchError::Unreachable(request.url.to_string())),
    }
  }
}

/// An expense as the page would submit it.
pub fn sample_expense(title: &str) -> crate::queue::NewExpense {
  crate::queue::NewExpense {
    title: title.to_string(),
    amount: 12.5,
    category: "Food".to_string(),
    date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    description: String::new(),
  }
}
