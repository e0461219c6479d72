//! Memocache - an in-process memoizing cache
//!
//! Generic key/value cache with TTL or daily-flush expiry, swept by a
//! background tokio task, and compute-if-absent access for wrapping
//! expensive lookups.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheStats, Entry, ExpiryPolicy, TimeUnit};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
