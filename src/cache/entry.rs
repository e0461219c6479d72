//! Cache Entry Module
//!
//! Defines the immutable value-plus-timestamp stored in each cache slot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Entry ==
/// A stored value together with the wall-clock instant it was inserted.
///
/// Entries are never mutated in place; overwriting a key replaces its entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(value: V) -> Self {
        Self::with_created_at(value, Utc::now())
    }

    pub(crate) fn with_created_at(value: V, created_at: DateTime<Utc>) -> Self {
        Self { value, created_at }
    }

    /// The stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry, returning the stored value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// When the entry was inserted.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // == Age ==
    /// Time elapsed between insertion and `now`.
    ///
    /// Clamped to zero if the wall clock moved backwards.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time elapsed since insertion.
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    // == Is Expired ==
    /// Checks whether the entry has lived at least `ttl` as of `now`.
    ///
    /// Boundary condition: an entry whose age equals the TTL is expired.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) >= ttl
    }
}
