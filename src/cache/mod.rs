//! Response caching for offline support.
//!
//! This module provides:
//! - `CacheStorage`: named stores mapping a request identity to a response
//! - `SqliteStorage`: the durable backend
//! - `CacheLayer`: network-first and cache-first policies over one store

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::SqliteStorage;
pub use traits::{CacheResult, CacheSource, CacheStorage};
