//! Expiry Policy Module
//!
//! The two ways a cache can age out its contents, chosen once at construction.

use std::time::Duration;

use chrono::NaiveTime;

use crate::error::{CacheError, Result};

/// How long entries live, fixed for the lifetime of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Each entry expires once its age reaches the duration; swept periodically.
    Ttl(Duration),
    /// No per-entry expiry; every entry is dropped daily at this local time.
    DailyFlush(NaiveTime),
}

impl ExpiryPolicy {
    /// Relative TTL policy. Zero is rejected.
    pub fn ttl(ttl: Duration) -> Result<Self> {
        let policy = Self::Ttl(ttl);
        policy.validate()?;
        Ok(policy)
    }

    /// Daily flush at `hour:minute:second` local time.
    pub fn daily_at(hour: u32, minute: u32, second: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, second)
            .map(Self::DailyFlush)
            .ok_or(CacheError::InvalidTimeOfDay {
                hour,
                minute,
                second,
            })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::Ttl(ttl) if ttl.is_zero() => Err(CacheError::InvalidTtl(
                "TTL must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Calendar units accepted by `Cache::with_ttl_unit`.
///
/// Covers microseconds through weeks. Months and longer have no fixed
/// length and are not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Micros,
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    fn as_secs(self) -> u64 {
        match self {
            Self::Micros | Self::Millis | Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
            Self::Weeks => 604_800,
        }
    }

    /// Converts `amount` of this unit into a duration, failing on overflow.
    pub fn to_duration(self, amount: u64) -> Result<Duration> {
        match self {
            Self::Micros => Ok(Duration::from_micros(amount)),
            Self::Millis => Ok(Duration::from_millis(amount)),
            unit => amount
                .checked_mul(unit.as_secs())
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    CacheError::InvalidTtl(format!("{} {:?} overflows a duration", amount, unit))
                }),
        }
    }
}
