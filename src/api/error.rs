use thiserror::Error;

use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("Access denied: {0}")]
  AccessDenied(String),

  #[error("Session expired. Please login again.")]
  Unauthorized,

  #[error("Resource not found: {0}")]
  NotFound(String),

  #[error("Rate limited - please wait before retrying")]
  RateLimited,

  #[error("Server error: {0}")]
  ServerError(String),

  #[error("Network error: {0}")]
  Network(#[from] FetchError),

  /// Served the synthesized offline reply; nothing cached for this read
  #[error("You are offline")]
  Offline,

  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  #[error("Failed to encode request: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("Worker unavailable: {0}")]
  Worker(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!(
      "{}... (truncated, {} total bytes)",
      &body[..end],
      body.len()
    )
  }

  pub fn from_status(status: u16, body: &str) -> Self {
    let truncated = Self::truncate_body(body);
    match status {
      401 => ApiError::Unauthorized,
      403 => ApiError::AccessDenied(truncated),
      404 => ApiError::NotFound(truncated),
      429 => ApiError::RateLimited,
      500..=599 => ApiError::ServerError(truncated),
      _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_maps_codes() {
    assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized));
    assert!(matches!(ApiError::from_status(404, "x"), ApiError::NotFound(b) if b == "x"));
    assert!(matches!(ApiError::from_status(503, ""), ApiError::ServerError(_)));
    assert!(matches!(ApiError::from_status(418, ""), ApiError::InvalidResponse(_)));
  }

  #[test]
  fn test_long_bodies_are_truncated() {
    let body = "é".repeat(400);
    match ApiError::from_status(500, &body) {
      ApiError::ServerError(msg) => {
        assert!(msg.contains("truncated, 800 total bytes"));
        assert!(msg.len() < body.len());
      }
      other => panic!("unexpected {:?}", other),
    }
  }
}
