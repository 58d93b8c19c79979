use futures::future::try_join_all;
use std::sync::atomic::Ordering;
use tracing::{error, info};

use super::{OfflineWorker, Phase, WorkerError};
use crate::cache::CacheStorage;
use crate::net::{fetch_with_timeout, Fetch, Request};
use crate::queue::MutationQueue;

impl<S: CacheStorage, F: Fetch, Q: MutationQueue> OfflineWorker<S, F, Q> {
  /// Precache every essential asset into this version's store.
  ///
  /// Assets are fetched concurrently; all must come back ok before anything
  /// is written, so a failed install leaves no partial store behind.
  pub async fn install(&self) -> Result<(), WorkerError> {
    self.set_phase(Phase::Installing);
    info!(cache = %self.cache.cache_name(), assets = self.settings.precache.len(), "Installing");

    if let Err(e) = self.cache.storage().open(self.cache.cache_name()) {
      error!(cache = %self.cache.cache_name(), error = %e, "Failed to open cache");
      self.set_phase(Phase::Redundant);
      return Err(WorkerError::Storage(e));
    }

    let timeout = self.settings.fetch_timeout;
    let fetcher = self.fetcher.as_ref();
    let fetches = self.settings.precache.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = fetch_with_timeout(fetcher, &request, timeout)
        .await
        .map_err(|e| WorkerError::Install {
          asset: url.to_string(),
          reason: e.to_string(),
        })?;

      if !response.ok() {
        return Err(WorkerError::Install {
          asset: url.to_string(),
          reason: format!("status {}", response.status),
        });
      }
      Ok((request.key(), response))
    });

    let stored = match try_join_all(fetches).await {
      Ok(entries) => self
        .cache
        .storage()
        .put_all(self.cache.cache_name(), &entries)
        .map_err(WorkerError::Storage),
      Err(e) => Err(e),
    };

    if let Err(e) = stored {
      error!(cache = %self.cache.cache_name(), error = %e, "Install failed");
      self.set_phase(Phase::Redundant);
      return Err(e);
    }

    self.set_phase(Phase::Installed);
    self.skip_waiting.store(true, Ordering::SeqCst);
    info!(cache = %self.cache.cache_name(), "Installed");
    Ok(())
  }

  /// Delete every store but this version's, then claim open pages.
  ///
  /// Requires a finished install, either by this instance or an earlier one
  /// that left a complete store. Returns the names of the evicted stores. A
  /// store that fails to delete is logged and skipped.
  pub fn activate(&self) -> Result<Vec<String>, WorkerError> {
    let installed = match self.phase() {
      Phase::Installed | Phase::Activated => true,
      Phase::Redundant | Phase::Stopped => false,
      _ => self.precache_complete().map_err(WorkerError::Storage)?,
    };
    if !installed {
      error!(cache = %self.cache.cache_name(), phase = ?self.phase(), "Refusing to activate");
      return Err(WorkerError::NotInstalled(self.cache.cache_name().to_string()));
    }

    self.set_phase(Phase::Activating);
    info!(cache = %self.cache.cache_name(), "Activating");

    let storage = self.cache.storage();
    let names = storage.cache_names().map_err(|e| {
      error!(error = %e, "Failed to list caches");
      WorkerError::Storage(e)
    })?;

    let mut evicted = Vec::new();
    for name in names
      .into_iter()
      .filter(|name| name != self.cache.cache_name())
    {
      match storage.delete_cache(&name) {
        Ok(_) => {
          info!(cache = %name, "Deleted old cache");
          evicted.push(name);
        }
        Err(e) => error!(cache = %name, error = %e, "Failed to delete old cache"),
      }
    }

    storage
      .mark_activated(self.cache.cache_name())
      .map_err(WorkerError::Storage)?;

    let claimed = self.clients.claim();
    self.set_phase(Phase::Activated);
    info!(cache = %self.cache.cache_name(), claimed, "Activated");

    Ok(evicted)
  }
}
