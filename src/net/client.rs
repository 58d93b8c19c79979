use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use super::types::{Request, Response, ResponseKind};

/// The request/response pipeline the worker sits in front of.
#[async_trait]
pub trait Fetch: Send + Sync {
  /// Perform the request against the network.
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Run a fetch, giving up after `timeout`.
///
/// A hung connection otherwise stalls the intercepted request forever.
pub async fn fetch_with_timeout<F>(
  fetcher: &F,
  request: &Request,
  timeout: Duration,
) -> Result<Response, FetchError>
where
  F: Fetch + ?Sized,
{
  match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
    Ok(result) => result,
    Err(_) => Err(FetchError::Timeout {
      url: request.url.to_string(),
      after: timeout,
    }),
  }
}

/// Fetcher backed by reqwest.
///
/// Responses from the configured origin are `Basic`, everything else `Cors`.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
  timeout: Duration,
}

impl HttpFetcher {
  pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin,
      timeout,
    })
  }

  fn kind_for(&self, url: &Url) -> ResponseKind {
    if url.origin() == self.origin.origin() {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    }
  }
}

#[async_trait]
impl Fetch for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| {
      if e.is_timeout() {
        FetchError::Timeout {
          url: request.url.to_string(),
          after: self.timeout,
        }
      } else if e.is_connect() {
        FetchError::Unreachable(request.url.to_string())
      } else {
        FetchError::Network(e)
      }
    })?;

    let status = response.status();
    let kind = self.kind_for(response.url());
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
      kind,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::ScriptedFetcher;

  #[test]
  fn test_same_origin_is_basic() {
    let fetcher = HttpFetcher::new(
      Url::parse("http://localhost:3000").unwrap(),
      Duration::from_secs(1),
    )
    .unwrap();

    assert_eq!(
      fetcher.kind_for(&Url::parse("http://localhost:3000/static/js/bundle.js").unwrap()),
      ResponseKind::Basic
    );
    assert_eq!(
      fetcher.kind_for(&Url::parse("https://cdn.example.com/font.woff").unwrap()),
      ResponseKind::Cors
    );
  }

  #[tokio::test]
  async fn test_fetch_with_timeout_gives_up() {
    let fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(200));
    let request = Request::get(Url::parse("http://localhost:3000/api/expenses").unwrap());

    let result = fetch_with_timeout(&fetcher, &request, Duration::from_millis(20)).await;
    assert!(matches!(result, Err(FetchError::Timeout { .. })));
  }

  #[tokio::test]
  async fn test_sub_second_timeout_is_reported_exactly() {
    let fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(200));
    let request = Request::get(Url::parse("http://localhost:3000/api/expenses").unwrap());

    let err = fetch_with_timeout(&fetcher, &request, Duration::from_millis(20))
      .await
      .unwrap_err();

    assert_eq!(
      err.to_string(),
      "Request to http://localhost:3000/api/expenses timed out after 20ms"
    );
  }

  #[test]
  fn test_whole_second_timeout_message() {
    let err = FetchError::Timeout {
      url: "http://localhost:3000/".to_string(),
      after: Duration::from_secs(10),
    };
    assert_eq!(err.to_string(), "Request to http://localhost:3000/ timed out after 10s");
  }
}
