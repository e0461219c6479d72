//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised while constructing or configuring a cache.
///
/// Producer failures are never wrapped in this type; they reach the caller
/// of `get_or_compute` unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// TTL is zero or does not fit in a duration
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Daily flush time is outside 00:00:00..=23:59:59
    #[error("Invalid time of day: {hour:02}:{minute:02}:{second:02}")]
    InvalidTimeOfDay { hour: u32, minute: u32, second: u32 },

    /// Configuration value rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No tokio runtime is available to host the evictor task
    #[error("No tokio runtime available to run the evictor")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
