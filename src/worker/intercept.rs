use tracing::{debug, info, trace};

use super::{OfflineWorker, Phase, WorkerError};
use crate::cache::{CacheResult, CacheStorage};
use crate::net::{fetch_with_timeout, Destination, Fetch, Request, Response, ResponseKind};
use crate::queue::MutationQueue;

/// Body of the response served for API reads when offline with nothing cached.
pub(crate) const OFFLINE_API_BODY: &str = r#"{"error":"You are offline","cached":true}"#;

/// The synthesized 503 served for API reads with no network and no cache.
fn offline_api_response() -> Response {
  Response::new(503, OFFLINE_API_BODY)
    .with_header("Content-Type", "application/json")
    .with_kind(ResponseKind::Synthetic)
}

/// How the worker handled an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the host sends the request itself
  Passthrough,
  /// Answered by the worker
  Respond(CacheResult<Response>),
}

impl<S: CacheStorage, F: Fetch, Q: MutationQueue> OfflineWorker<S, F, Q> {
  /// Intercept an outgoing request.
  ///
  /// Only GETs are intercepted, and only once activated. API reads never
  /// fail; page and asset reads fail only when the network is down, nothing
  /// is cached, and the request is not a navigation (or the offline page
  /// itself is missing).
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, WorkerError> {
    let phase = self.phase();
    if phase != Phase::Activated {
      trace!(url = %request.url, ?phase, "Not active, passing through");
      return Ok(FetchOutcome::Passthrough);
    }

    if !request.is_get() {
      trace!(method = %request.method, url = %request.url, "Passing through");
      return Ok(FetchOutcome::Passthrough);
    }

    let result = if self.is_api_request(request) {
      self.network_first(request).await
    } else {
      self.cache_first(request).await?
    };

    debug!(url = %request.url, source = %result.source, status = result.data.status, "Served");
    Ok(FetchOutcome::Respond(result))
  }

  pub fn is_api_request(&self, request: &Request) -> bool {
    request.url.path().contains(&self.settings.api_prefix)
  }

  async fn network_first(&self, request: &Request) -> CacheResult<Response> {
    let timeout = self.settings.fetch_timeout;
    let fetcher = self.fetcher.as_ref();

    self
      .cache
      .network_first(request, || fetch_with_timeout(fetcher, request, timeout))
      .await
      .unwrap_or_else(|| {
        info!(url = %request.url, "Offline with nothing cached");
        CacheResult::synthetic(offline_api_response())
      })
  }

  async fn cache_first(&self, request: &Request) -> Result<CacheResult<Response>, WorkerError> {
    let timeout = self.settings.fetch_timeout;
    let fetcher = self.fetcher.as_ref();

    match self
      .cache
      .cache_first(request, || fetch_with_timeout(fetcher, request, timeout))
      .await
    {
      Ok(result) => Ok(result),
      Err(e) if request.destination == Destination::Document => {
        info!(url = %request.url, error = %e, "Navigation failed, serving offline page");
        let offline_page = Request::get(self.settings.offline_page.clone());
        self
          .cache
          .lookup(&offline_page)
          .map(|cached| CacheResult::offline(cached.response, cached.cached_at))
          .ok_or_else(|| WorkerError::OfflinePageMissing(self.settings.offline_page.to_string()))
      }
      Err(e) => Err(WorkerError::Fetch(e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::worker::tests::{active_harness, harness};
  use reqwest::Method;
  use url::Url;

  const API_URL: &str = "http://localhost:3000/api/expenses";

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  fn respond(outcome: FetchOutcome) -> CacheResult<Response> {
    match outcome {
      FetchOutcome::Respond(result) => result,
      FetchOutcome::Passthrough => panic!("expected a response"),
    }
  }

  #[tokio::test]
  async fn test_api_read_falls_back_to_cached_body() {
    let h = active_harness();
    h.fetcher.respond("GET", API_URL, Response::new(200, r#"[{"id":1}]"#));
    h.fetcher.fail("GET", API_URL);
    let request = Request::get(url(API_URL));

    let fresh = respond(h.worker.handle_fetch(&request).await.unwrap());
    assert_eq!(fresh.source, CacheSource::Network);

    let stale = respond(h.worker.handle_fetch(&request).await.unwrap());
    assert_eq!(stale.source, CacheSource::Offline);
    assert_eq!(stale.data.body, br#"[{"id":1}]"#.to_vec());
    assert_eq!(h.fetcher.call_count(), 2);
  }

  #[tokio::test]
  async fn test_api_read_offline_without_cache_is_exact_503() {
    let h = active_harness();
    h.fetcher.set_offline(true);

    let result = respond(
      h.worker
        .handle_fetch(&Request::get(url(API_URL)))
        .await
        .unwrap(),
    );

    assert_eq!(result.source, CacheSource::Synthetic);
    assert_eq!(result.data.status, 503);
    assert_eq!(result.data.header("content-type"), Some("application/json"));
    let body: serde_json::Value = result.data.json().unwrap();
    assert_eq!(
      body,
      serde_json::json!({ "error": "You are offline", "cached": true })
    );
    assert_eq!(result.data.text(), OFFLINE_API_BODY);
  }

  #[tokio::test]
  async fn test_api_read_refreshes_cache_when_online() {
    let h = active_harness();
    h.fetcher.respond("GET", API_URL, Response::new(200, "[1]"));
    h.fetcher.respond("GET", API_URL, Response::new(200, "[1,2]"));
    let request = Request::get(url(API_URL));

    h.worker.handle_fetch(&request).await.unwrap();
    h.worker.handle_fetch(&request).await.unwrap();

    let cached = h.worker.cache().lookup(&request).unwrap();
    assert_eq!(cached.response.body, b"[1,2]".to_vec());
  }

  #[tokio::test]
  async fn test_cached_asset_is_served_without_network() {
    let h = active_harness();
    let asset = "http://localhost:3000/static/media/logo.svg";
    h.fetcher.respond("GET", asset, Response::new(200, "console.log(1)"));
    let request = Request::get(url(asset)).with_destination(Destination::Image);

    h.worker.handle_fetch(&request).await.unwrap();
    assert_eq!(h.fetcher.call_count(), 1);

    let again = respond(h.worker.handle_fetch(&request).await.unwrap());
    assert_eq!(again.source, CacheSource::Cache);
    assert_eq!(again.data.body, b"console.log(1)".to_vec());
    assert_eq!(h.fetcher.call_count(), 1);
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_offline_page() {
    let h = active_harness();
    let offline = "http://localhost:3000/offline.html";
    h.storage
      .put(
        "expense-tracker-v1",
        &Request::get(url(offline)).key(),
        &Response::new(200, "<h1>Offline</h1>"),
      )
      .unwrap();
    h.fetcher.set_offline(true);

    let result = respond(
      h.worker
        .handle_fetch(&Request::navigate(url("http://localhost:3000/dashboard")))
        .await
        .unwrap(),
    );

    assert_eq!(result.data.body, b"<h1>Offline</h1>".to_vec());
  }

  #[tokio::test]
  async fn test_navigation_offline_without_offline_page_fails() {
    let h = active_harness();
    let offline = Request::get(url("http://localhost:3000/offline.html")).key();
    h.storage.delete("expense-tracker-v1", &offline).unwrap();
    h.fetcher.set_offline(true);

    let result = h
      .worker
      .handle_fetch(&Request::navigate(url("http://localhost:3000/dashboard")))
      .await;

    assert!(matches!(result, Err(WorkerError::OfflinePageMissing(_))));
  }

  #[tokio::test]
  async fn test_subresource_offline_surfaces_failure() {
    let h = active_harness();
    h.fetcher.set_offline(true);

    let request =
      Request::get(url("http://localhost:3000/logo.png")).with_destination(Destination::Image);
    let result = h.worker.handle_fetch(&request).await;

    assert!(matches!(result, Err(WorkerError::Fetch(_))));
  }

  #[tokio::test]
  async fn test_post_is_passed_through_untouched() {
    let h = active_harness();
    let before = h.storage.keys("expense-tracker-v1").unwrap();
    let request = Request::json(Method::POST, url(API_URL), &serde_json::json!({"title": "x"}))
      .unwrap();

    let outcome = h.worker.handle_fetch(&request).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert_eq!(h.fetcher.call_count(), 0);
    assert_eq!(h.storage.keys("expense-tracker-v1").unwrap(), before);
  }

  #[tokio::test]
  async fn test_requests_pass_through_before_activation() {
    let h = harness();
    h.fetcher.respond("GET", API_URL, Response::new(200, "[]"));

    let api = h.worker.handle_fetch(&Request::get(url(API_URL))).await.unwrap();
    let page = h
      .worker
      .handle_fetch(&Request::navigate(url("http://localhost:3000/")))
      .await
      .unwrap();

    assert!(matches!(api, FetchOutcome::Passthrough));
    assert!(matches!(page, FetchOutcome::Passthrough));
    assert_eq!(h.fetcher.call_count(), 0);
    assert!(h.storage.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_installed_but_not_activated_passes_through() {
    let h = harness();
    for path in ["/", "/static/js/bundle.js", "/static/css/main.css", "/manifest.json", "/offline.html"] {
      h.fetcher.respond(
        "GET",
        &format!("http://localhost:3000{}", path),
        Response::new(200, path),
      );
    }
    h.worker.install().await.unwrap();
    let installed = h.fetcher.call_count();

    let outcome = h.worker.handle_fetch(&Request::get(url(API_URL))).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert_eq!(h.fetcher.call_count(), installed);
  }

  #[tokio::test]
  async fn test_redundant_worker_passes_through() {
    let h = harness();
    h.fetcher.set_offline(true);
    assert!(h.worker.install().await.is_err());

    let outcome = h
      .worker
      .handle_fetch(&Request::navigate(url("http://localhost:3000/")))
      .await
      .unwrap();

    assert!(matches!(outcome, FetchOutcome::Passthrough));
  }

  #[test]
  fn test_api_prefix_matches_path_only() {
    let h = harness();
    assert!(h.worker.is_api_request(&Request::get(url(API_URL))));
    assert!(!h
      .worker
      .is_api_request(&Request::get(url("http://localhost:3000/?next=/api/x"))));
  }
}
