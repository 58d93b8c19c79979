mod client;
mod error;
mod session;

pub use client::{ApiClient, Budget, CreateOutcome};
pub use error::ApiError;
pub use session::Session;
