//! REST client a page uses to talk to the expense API through the worker.
//!
//! GETs are routed through the worker's fetch handling, so they are served
//! network-first with the cached copy as fallback. Writes pass through the
//! worker untouched and are sent here directly.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{ApiError, Session};
use crate::cache::CacheSource;
use crate::config::Config;
use crate::event::{DispatchError, EventSender};
use crate::net::{fetch_with_timeout, Fetch, Request, Response};
use crate::queue::{MutationQueue, NewExpense, PendingExpense};
use crate::worker::{FetchOutcome, WorkerError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub token: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
}

/// Monthly spending limit for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
  pub category: String,
  pub limit: f64,
  /// `YYYY-MM`
  pub month: String,
}

/// Result of creating an expense.
#[derive(Debug)]
pub enum CreateOutcome {
  /// Accepted by the server
  Created(serde_json::Value),
  /// Network unavailable; stored for background sync
  Queued(PendingExpense),
}

pub struct ApiClient<F: Fetch, Q: MutationQueue> {
  events: EventSender,
  fetcher: Arc<F>,
  queue: Arc<Q>,
  session: Arc<Session>,
  base: Url,
  timeout: Duration,
  online: AtomicBool,
}

impl<F: Fetch, Q: MutationQueue> ApiClient<F, Q> {
  pub fn new(
    events: EventSender,
    fetcher: Arc<F>,
    queue: Arc<Q>,
    session: Arc<Session>,
    config: &Config,
  ) -> color_eyre::Result<Self> {
    Ok(Self {
      events,
      fetcher,
      queue,
      session,
      base: config.resolve(&config.api_prefix)?,
      timeout: config.fetch_timeout(),
      online: AtomicBool::new(true),
    })
  }

  pub fn session(&self) -> &Arc<Session> {
    &self.session
  }

  /// Last observed network status.
  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  fn note_online(&self, online: bool) {
    let was = self.online.swap(online, Ordering::SeqCst);
    if was != online {
      if online {
        info!("Back online");
      } else {
        warn!("You are offline. Some features may be limited.");
      }
    }
  }

  fn url(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::InvalidResponse(format!("Invalid API path '{}': {}", path, e)))
  }

  fn url_with_query(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
    let mut url = self.url(path)?;
    if !params.is_empty() {
      url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
  }

  /// Send a request through the worker, falling back to the network for
  /// anything the worker passes through.
  async fn send(&self, request: Request) -> Result<Response, ApiError> {
    let request = request.with_bearer(self.session.token().as_deref());
    debug!(method = %request.method, url = %request.url, "API request");

    let response = match self.events.fetch(request.clone()).await {
      Ok(FetchOutcome::Respond(result)) => {
        match result.source {
          CacheSource::Network => self.note_online(true),
          CacheSource::Offline | CacheSource::Synthetic => self.note_online(false),
          CacheSource::Cache => {}
        }
        if result.source == CacheSource::Synthetic {
          return Err(ApiError::Offline);
        }
        result.data
      }
      Ok(FetchOutcome::Passthrough) => {
        match fetch_with_timeout(self.fetcher.as_ref(), &request, self.timeout).await {
          Ok(response) => {
            self.note_online(true);
            response
          }
          Err(e) => {
            self.note_online(false);
            return Err(ApiError::Network(e));
          }
        }
      }
      Err(DispatchError::Worker(WorkerError::Fetch(e))) => {
        self.note_online(false);
        return Err(ApiError::Network(e));
      }
      Err(e) => return Err(ApiError::Worker(e.to_string())),
    };

    self.check_response(response)
  }

  fn check_response(&self, response: Response) -> Result<Response, ApiError> {
    if response.ok() {
      return Ok(response);
    }
    if response.status == 401 {
      warn!("Session expired. Please login again.");
      self.session.clear();
    }
    Err(ApiError::from_status(response.status, &response.text()))
  }

  async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, ApiError> {
    let response = self
      .send(Request::get(self.url_with_query(path, params)?))
      .await?;
    response
      .json()
      .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
  }

  async fn send_json<B: Serialize, T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    let response = self
      .send(Request::json(method, self.url(path)?, body)?)
      .await?;
    response
      .json()
      .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
  }

  /// Start a login; the server mails a one-time code on success.
  pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
    #[derive(Serialize)]
    struct Body<'a> {
      email: &'a str,
      password: &'a str,
    }
    self
      .send_json(Method::POST, "/auth/login", &Body { email, password })
      .await
  }

  /// Complete a login. A successful reply's token becomes the session token.
  pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<AuthResponse, ApiError> {
    #[derive(Serialize)]
    struct Body<'a> {
      email: &'a str,
      otp: &'a str,
    }
    let auth: AuthResponse = self
      .send_json(Method::POST, "/auth/verify-otp", &Body { email, otp })
      .await?;

    if auth.success {
      if let Some(token) = &auth.token {
        self.session.set_token(token.clone());
        info!("Logged in");
      }
    }
    Ok(auth)
  }

  pub async fn get_expenses(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ApiError> {
    self.get("/expenses", params).await
  }

  /// Create an expense, queueing it for background sync if the network is
  /// unavailable.
  pub async fn create_expense(&self, expense: NewExpense) -> Result<CreateOutcome, ApiError> {
    match self
      .send_json(Method::POST, "/expenses", &expense)
      .await
    {
      Ok(created) => Ok(CreateOutcome::Created(created)),
      Err(ApiError::Network(e)) => {
        let pending = PendingExpense::new(expense);
        self
          .queue
          .enqueue(&pending)
          .map_err(|err| ApiError::Worker(format!("Failed to queue expense: {}", err)))?;
        info!(id = %pending.id, error = %e, "Expense queued for sync");
        Ok(CreateOutcome::Queued(pending))
      }
      Err(e) => Err(e),
    }
  }

  pub async fn update_expense(&self, id: &str, expense: &NewExpense) -> Result<serde_json::Value, ApiError> {
    self
      .send_json(Method::PUT, &format!("/expenses/{}", id), expense)
      .await
  }

  pub async fn delete_expense(&self, id: &str) -> Result<(), ApiError> {
    self
      .send(Request::new(Method::DELETE, self.url(&format!("/expenses/{}", id))?))
      .await?;
    Ok(())
  }

  pub async fn get_budgets(&self) -> Result<serde_json::Value, ApiError> {
    self.get("/budgets", &[]).await
  }

  pub async fn create_budget(&self, budget: &Budget) -> Result<serde_json::Value, ApiError> {
    self.send_json(Method::POST, "/budgets", budget).await
  }

  pub async fn update_budget(&self, id: &str, budget: &Budget) -> Result<serde_json::Value, ApiError> {
    self
      .send_json(Method::PUT, &format!("/budgets/{}", id), budget)
      .await
  }

  pub async fn get_analytics(&self, params: &[(&str, &str)]) -> Result<serde_json::Value, ApiError> {
    self.get("/analytics", params).await
  }

  /// Raw CSV export bytes.
  pub async fn export_csv(&self, params: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
    let response = self
      .send(Request::get(self.url_with_query("/export/csv", params)?))
      .await?;
    Ok(response.body)
  }

  /// Raw PDF export bytes.
  pub async fn export_pdf(&self, params: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
    let response = self
      .send(Request::get(self.url_with_query("/export/pdf", params)?))
      .await?;
    Ok(response.body)
  }

  pub async fn toggle_email_reports(&self, enabled: bool) -> Result<serde_json::Value, ApiError> {
    #[derive(Serialize)]
    struct Body {
      enabled: bool,
    }
    self
      .send_json(Method::POST, "/settings/email-reports", &Body { enabled })
      .await
  }
}
