//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::net::{RequestKey, Response};

/// A response read back from a cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named stores; each store maps a request
/// identity to the last response stored for it. Individual operations must be
/// serialized by the backend.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it does not exist.
  fn open(&self, cache_name: &str) -> Result<()>;

  /// Names of all stores, oldest first.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a whole store. Returns false if it did not exist.
  fn delete_cache(&self, cache_name: &str) -> Result<bool>;

  /// Record that the version owning the named store has activated.
  fn mark_activated(&self, cache_name: &str) -> Result<()>;

  /// Whether the named store's version has activated. False for a store that
  /// only exists because something wrote to it.
  fn is_activated(&self, cache_name: &str) -> Result<bool>;

  /// Look up the response stored for `key`.
  fn match_entry(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store (or replace) the response for `key`.
  fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several responses at once; either all are written or none.
  fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Remove the response for `key`. Returns false if there was none.
  #[allow(dead_code)]
  fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool>;

  /// Request identities stored in the named store.
  fn keys(&self, cache_name: &str) -> Result<Vec<RequestKey>>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result served straight from the store.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Create a result built locally because neither network nor store could answer.
  pub fn synthetic(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Synthetic,
      cached_at: None,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache hit under a cache-first policy; network not consulted
  Cache,
  /// Network unavailable, serving a stored copy
  Offline,
  /// Network unavailable and nothing stored; locally built fallback
  Synthetic,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Offline => "offline-cache",
      Self::Synthetic => "offline-fallback",
    };
    f.write_str(label)
  }
}
