//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default interval between TTL sweeps, in milliseconds.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 10_000;

/// Cache runtime parameters.
///
/// The expiry policy is chosen by the constructor; this only tunes how the
/// evictor runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Delay before the first TTL sweep and between subsequent sweeps.
    /// Ignored by the daily flush policy.
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SWEEP_INTERVAL_MS` - TTL sweep frequency in milliseconds (default: 10000)
    pub fn from_env() -> Self {
        Self {
            sweep_interval: Duration::from_millis(
                env::var("CACHE_SWEEP_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
            ),
        }
    }

    /// Overrides the sweep interval.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Rejects settings that would make the evictor spin.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}
