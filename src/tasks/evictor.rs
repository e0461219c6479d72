//! Evictor Task
//!
//! Background task that removes expired entries (TTL policy) or empties the
//! cache once a day (daily flush policy).

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Utc};
use tokio::runtime::Handle;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::store::Shared;
use crate::cache::ExpiryPolicy;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Interval between daily flushes.
pub const FLUSH_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Spawns the evictor for `shared` onto the current tokio runtime.
///
/// The task loops until aborted; the owning `Cache` aborts it on drop.
/// Each sweep runs on the blocking pool so a large map does not stall the
/// runtime. A sweep that panics is logged and skipped, and the schedule
/// continues.
///
/// # Returns
/// The task's JoinHandle, or `CacheError::NoRuntime` outside a runtime.
pub(crate) fn spawn_evictor<K, V>(shared: Arc<Shared<K, V>>) -> Result<JoinHandle<()>>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
    let (first_delay, period) = schedule(&shared.policy, &shared.config, &Local::now());

    Ok(runtime.spawn(async move {
        info!(
            "Starting evictor: first sweep in {:?}, then every {:?}",
            first_delay, period
        );

        let mut ticker = time::interval_at(Instant::now() + first_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let sweeper = Arc::clone(&shared);
            match contain_sweep(move || sweeper.sweep(Utc::now())).await {
                Some(0) => debug!("Eviction sweep: no entries removed"),
                Some(removed) => info!("Eviction sweep: removed {} entries", removed),
                None => {}
            }
        }
    }))
}

/// Delay before the first sweep, and the period after it.
fn schedule<Tz: TimeZone>(
    policy: &ExpiryPolicy,
    config: &CacheConfig,
    now: &DateTime<Tz>,
) -> (Duration, Duration) {
    match *policy {
        ExpiryPolicy::Ttl(_) => (config.sweep_interval, config.sweep_interval),
        ExpiryPolicy::DailyFlush(at) => (next_flush_delay(now, at), FLUSH_PERIOD),
    }
}

/// Time until the next local occurrence of `at`, today or tomorrow.
///
/// Computed on naive local time, so a DST shift moves the first flush by
/// the size of the shift.
fn next_flush_delay<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> Duration {
    let now = now.naive_local();
    let mut next = now.date().and_time(at);
    if next < now {
        next += TimeDelta::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

async fn contain_sweep<F>(sweep: F) -> Option<usize>
where
    F: FnOnce() -> usize + Send + 'static,
{
    match task::spawn_blocking(sweep).await {
        Ok(removed) => Some(removed),
        Err(err) => {
            warn!("Eviction sweep failed, skipping until the next tick: {}", err);
            None
        }
    }
}
