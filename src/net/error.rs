use std::time::Duration;
use thiserror::Error;

/// A fetch that never produced a response.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("Request to {url} timed out after {after:?}")]
  Timeout { url: String, after: Duration },

  #[error("Network unreachable: {0}")]
  Unreachable(String),
}
