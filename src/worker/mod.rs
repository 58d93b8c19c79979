//! The offline cache and sync manager.
//!
//! `OfflineWorker` owns everything a worker instance needs for its lifetime:
//! the versioned cache store, the fetch pipeline, the pending mutation queue
//! and the registry of open pages. It is built at startup and torn down with
//! `shutdown`; each host event maps to one method:
//!
//! - `install`: precache the essential assets
//! - `activate`: evict stores of other versions and claim open pages
//! - `handle_fetch`: network-first for API reads, cache-first for the rest
//! - `sync`: replay queued expense creations
//! - `push` / `notification_click`: notification presentation

mod intercept;
mod lifecycle;
mod sync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage};
use crate::clients::Clients;
use crate::config::Config;
use crate::net::{Fetch, FetchError, Request};
use crate::notify::{ClickOutcome, Notification, EXPLORE_ACTION};
use crate::queue::MutationQueue;

pub use intercept::FetchOutcome;
pub use sync::SyncReport;

/// Page opened from a notification's explore action.
const ROOT_PAGE: &str = "/";

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("Install failed while caching {asset}: {reason}")]
  Install { asset: String, reason: String },

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("Offline page {0} is not cached")]
  OfflinePageMissing(String),

  #[error("Cache {0} is not installed")]
  NotInstalled(String),

  #[error("Storage error: {0}")]
  Storage(color_eyre::Report),
}

/// Lifecycle phase of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; this instance will never activate
  Redundant,
  Stopped,
}

/// Settings resolved from the config at startup.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub precache: Vec<Url>,
  pub offline_page: Url,
  pub expenses_url: Url,
  pub api_prefix: String,
  pub sync_tag: String,
  pub fetch_timeout: Duration,
  pub token_timeout: Duration,
}

impl WorkerSettings {
  pub fn from_config(config: &Config) -> color_eyre::Result<Self> {
    let precache = config
      .precache
      .iter()
      .map(|path| config.resolve(path))
      .collect::<color_eyre::Result<Vec<_>>>()?;

    Ok(Self {
      precache,
      offline_page: config.resolve(&config.offline_page)?,
      expenses_url: config.resolve("/api/expenses")?,
      api_prefix: config.api_prefix.clone(),
      sync_tag: config.sync_tag.clone(),
      fetch_timeout: config.fetch_timeout(),
      token_timeout: config.token_timeout(),
    })
  }
}

pub struct OfflineWorker<S: CacheStorage, F: Fetch, Q: MutationQueue> {
  cache: CacheLayer<S>,
  fetcher: Arc<F>,
  queue: Arc<Q>,
  clients: Arc<Clients>,
  settings: WorkerSettings,
  phase: Mutex<Phase>,
  skip_waiting: AtomicBool,
}

impl<S: CacheStorage, F: Fetch, Q: MutationQueue> OfflineWorker<S, F, Q> {
  pub fn new(
    cache: CacheLayer<S>,
    fetcher: Arc<F>,
    queue: Arc<Q>,
    clients: Arc<Clients>,
    settings: WorkerSettings,
  ) -> Self {
    Self {
      cache,
      fetcher,
      queue,
      clients,
      settings,
      phase: Mutex::new(Phase::Parsed),
      skip_waiting: AtomicBool::new(false),
    }
  }

  /// Pick up where a previous instance of the same version left off.
  ///
  /// Only a store that finished activating and still holds every precached
  /// asset counts. The instance then starts activated and controls open pages.
  pub fn resume(&self) -> color_eyre::Result<bool> {
    let name = self.cache.cache_name();
    let active = self.cache.storage().is_activated(name)? && self.precache_complete()?;
    if active {
      self.set_phase(Phase::Activated);
      self.clients.claim();
      debug!(cache = %name, "Resumed activated worker");
    } else {
      debug!(cache = %name, "No activated cache to resume");
    }
    Ok(active)
  }

  /// Whether this version's store holds every precache asset.
  pub(crate) fn precache_complete(&self) -> color_eyre::Result<bool> {
    let keys = self.cache.storage().keys(self.cache.cache_name())?;
    Ok(self.settings.precache.iter().all(|url| {
      let key = Request::get(url.clone()).key();
      keys.contains(&key)
    }))
  }

  /// Tear down: stop controlling pages.
  pub fn shutdown(&self) {
    self.clients.release();
    self.set_phase(Phase::Stopped);
    info!(cache = %self.cache.cache_name(), "Worker stopped");
  }

  pub fn phase(&self) -> Phase {
    *self.phase.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_phase(&self, phase: Phase) {
    *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
  }

  /// Whether install asked to activate without waiting for old pages to close.
  pub fn skips_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn clients(&self) -> &Arc<Clients> {
    &self.clients
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  /// Build the notification for a push message.
  pub fn push(&self, payload: Option<&str>) -> Notification {
    info!(has_payload = payload.is_some(), "Push notification received");
    Notification::from_push(payload)
  }

  /// Handle a click on a shown notification. The notification is always
  /// closed; only the explore action brings up the app.
  pub fn notification_click(&self, action: Option<&str>) -> ClickOutcome {
    info!(action = action.unwrap_or(""), "Notification click received");
    match action {
      Some(EXPLORE_ACTION) => ClickOutcome::Window(self.clients.focus_or_open(ROOT_PAGE)),
      _ => ClickOutcome::Dismissed,
    }
  }
}
