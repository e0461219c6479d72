//! Cache Module
//!
//! Provides the concurrent store, its timestamped entries and the expiry
//! policies the evictor enforces.

mod entry;
mod policy;
mod stats;
pub(crate) mod store;


// Re-export public types
pub use entry::Entry;
pub use policy::{ExpiryPolicy, TimeUnit};
pub use stats::CacheStats;
pub use store::Cache;
