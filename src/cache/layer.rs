//! Cache layer that orchestrates caching policies with network fetching.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::{CacheResult, CacheStorage, CachedResponse};
use crate::net::{FetchError, Request, Response, ResponseKind};

/// Cache layer bound to one named store.
///
/// This layer sits between the worker and the network, applying either a
/// network-first or a cache-first policy to a single request.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  cache_name: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer over the named store.
  pub fn new(storage: Arc<S>, cache_name: impl Into<String>) -> Self {
    Self {
      storage,
      cache_name: cache_name.into(),
    }
  }

  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Look up a stored response, treating storage failures as a miss.
  pub fn lookup(&self, request: &Request) -> Option<CachedResponse> {
    match self.storage.match_entry(&self.cache_name, &request.key()) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(cache = %self.cache_name, url = %request.url, error = %e, "Cache lookup failed");
        None
      }
    }
  }

  /// Store a copy of the response, logging failures.
  fn store(&self, request: &Request, response: &Response) {
    if let Err(e) = self.storage.put(&self.cache_name, &request.key(), response) {
      warn!(cache = %self.cache_name, url = %request.url, error = %e, "Failed to cache response");
    }
  }

  /// Fetch with a network-first strategy.
  ///
  /// 1. Fetch from network - if ok (2xx), cache a copy and return it
  /// 2. Non-ok responses are returned as-is, uncached
  /// 3. On network failure, return the stored copy (offline mode)
  /// 4. Nothing stored: `None`, the caller decides on a fallback
  pub async fn network_first<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Option<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, FetchError>>,
  {
    match fetcher().await {
      Ok(response) => {
        if response.ok() {
          self.store(request, &response);
        }
        Some(CacheResult::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed, falling back to cache");
        self
          .lookup(request)
          .map(|cached| CacheResult::offline(cached.response, cached.cached_at))
      }
    }
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Check cache - if present, return it without touching the network
  /// 2. On a miss, fetch from network
  /// 3. Cache the response only if it is a same-origin 200
  /// 4. Network failures are returned to the caller
  pub async fn cache_first<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Result<CacheResult<Response>, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, FetchError>>,
  {
    if let Some(cached) = self.lookup(request) {
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    let response = fetcher().await?;
    if response.status == 200 && response.kind == ResponseKind::Basic {
      self.store(request, &response);
    }

    Ok(CacheResult::from_network(response))
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      cache_name: self.cache_name.clone(),
    }
  }
}
