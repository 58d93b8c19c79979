//! Network boundary: the request/response model and the fetch pipeline.

mod client;
mod error;
mod types;

pub use client::{fetch_with_timeout, Fetch, HttpFetcher};
pub use error::FetchError;
pub use types::{Destination, Request, RequestKey, Response, ResponseKind};
