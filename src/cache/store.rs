//! Cache Store Module
//!
//! Concurrent key/value storage with compute-if-absent access. Expiry is
//! enforced only by the background evictor, never on read.

use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::stats::StatsRecorder;
use crate::cache::{CacheStats, Entry, ExpiryPolicy, TimeUnit};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::spawn_evictor;

type Map<K, V> = DashMap<K, Entry<V>>;

// == Shared State ==
/// State reachable from both the cache handle and its evictor task.
pub(crate) struct Shared<K, V> {
    /// Current backing map; `clear` swaps in a fresh one
    map: RwLock<Arc<Map<K, V>>>,
    /// Serializes `remove`, sweeps and the check / insert steps of
    /// `get_or_else` against each other; never held across caller code
    mutation: Mutex<()>,
    pub(crate) policy: ExpiryPolicy,
    pub(crate) config: CacheConfig,
    pub(crate) stats: StatsRecorder,
}

impl<K: Hash + Eq, V> Shared<K, V> {
    pub(crate) fn new(policy: ExpiryPolicy, config: CacheConfig) -> Self {
        Self {
            map: RwLock::new(Arc::new(DashMap::new())),
            mutation: Mutex::new(()),
            policy,
            config,
            stats: StatsRecorder::default(),
        }
    }

    pub(crate) fn current(&self) -> Arc<Map<K, V>> {
        Arc::clone(&self.map.read())
    }

    // == Sweep ==
    /// Removes what the policy says is due as of `now`.
    ///
    /// TTL policy drops entries whose age is at least the TTL; daily flush
    /// drops everything. Returns the number of entries removed.
    pub(crate) fn sweep(&self, now: DateTime<Utc>) -> usize {
        let _guard = self.mutation.lock();
        let map = self.current();
        let mut removed = 0;

        match self.policy {
            ExpiryPolicy::Ttl(ttl) => map.retain(|_, entry| {
                let expired = entry.is_expired_at(ttl, now);
                if expired {
                    removed += 1;
                }
                !expired
            }),
            ExpiryPolicy::DailyFlush(_) => map.retain(|_, _| {
                removed += 1;
                false
            }),
        }

        self.stats.record_sweep(removed);
        removed
    }
}

// == Cache ==
/// Thread-safe cache with a background evictor.
///
/// Share it across threads or tasks behind an `Arc`. Dropping the last
/// handle stops the evictor.
///
/// # Example
/// ```ignore
/// let users: Cache<u64, User> = Cache::with_ttl(2000)?;
/// let user = users.get_or_compute(1, || load_user_from_db(1))?;
/// ```
pub struct Cache<K, V> {
    pub(crate) shared: Arc<Shared<K, V>>,
    evictor: JoinHandle<()>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache whose entries expire `millis` milliseconds after insertion.
    pub fn with_ttl(millis: u64) -> Result<Self> {
        Self::with_ttl_unit(millis, TimeUnit::Millis)
    }

    /// Creates a cache whose entries expire `amount` units after insertion.
    pub fn with_ttl_unit(amount: u64, unit: TimeUnit) -> Result<Self> {
        let ttl = unit.to_duration(amount)?;
        Self::with_config(ExpiryPolicy::ttl(ttl)?, CacheConfig::default())
    }

    /// Creates a cache that is emptied every day at `hour:minute:second` local time.
    pub fn at_daily_time(hour: u32, minute: u32, second: u32) -> Result<Self> {
        Self::with_config(
            ExpiryPolicy::daily_at(hour, minute, second)?,
            CacheConfig::default(),
        )
    }

    /// Creates a cache with an explicit policy and evictor configuration.
    ///
    /// Must be called from within a tokio runtime, which hosts the evictor.
    pub fn with_config(policy: ExpiryPolicy, config: CacheConfig) -> Result<Self> {
        policy.validate()?;
        config.validate()?;

        let shared = Arc::new(Shared::new(policy, config));
        let evictor = spawn_evictor(Arc::clone(&shared))?;
        info!("Cache created with policy {:?}", policy);

        Ok(Self { shared, evictor })
    }

    // == Get ==
    /// Returns the current value for `key`, if any.
    ///
    /// Entries past their TTL are still returned until a sweep removes them.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let map = self.shared.current();
        let value = map.get(key).map(|slot| slot.value().value().clone());
        self.shared.stats.record_lookup(value.is_some());
        value
    }

    /// Returns the full entry for `key`, including its creation time.
    pub fn get_entry<Q>(&self, key: &Q) -> Option<Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let map = self.shared.current();
        let entry = map.get(key).map(|slot| slot.value().clone());
        entry
    }

    // == Get Or Compute ==
    /// Returns the cached value, or runs `producer` and caches what it yields.
    ///
    /// A producer returning `Ok(None)` caches nothing and yields `Ok(None)`.
    /// A producer error is returned as-is and nothing is cached.
    ///
    /// Not at-most-once: concurrent callers missing on the same key may all
    /// run their producers, and the last one to store wins.
    pub fn get_or_compute<F, E>(&self, key: K, producer: F) -> std::result::Result<Option<V>, E>
    where
        F: FnOnce() -> std::result::Result<Option<V>, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(Some(value));
        }

        debug!("Cache miss, invoking producer");
        Ok(producer()?.map(|value| self.put(key, value).into_value()))
    }

    /// Async form of [`get_or_compute`](Self::get_or_compute) with the same contract.
    ///
    /// No lock is held while the producer is awaited.
    pub async fn get_or_compute_async<F, Fut, E>(
        &self,
        key: K,
        producer: F,
    ) -> std::result::Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(Some(value));
        }

        debug!("Cache miss, awaiting producer");
        Ok(producer().await?.map(|value| self.put(key, value).into_value()))
    }

    // == Get Or Else ==
    /// Returns the cached value, or stores and returns what `supplier` yields.
    ///
    /// The existence check and the insert each run under the mutation lock,
    /// serialized against `remove`, sweeps and other `get_or_else` calls.
    /// The supplier runs with no lock held, so it may use this cache itself
    /// and a slow supplier stalls only its caller. Callers racing on the same
    /// missing key may each run their supplier; the first to insert wins and
    /// every caller gets the stored value. A panicking supplier leaves the key
    /// absent.
    pub fn get_or_else<F>(&self, key: K, supplier: F) -> V
    where
        F: FnOnce() -> V,
    {
        let existing = {
            let _guard = self.shared.mutation.lock();
            let map = self.shared.current();
            let existing = map.get(&key).map(|slot| slot.value().value().clone());
            existing
        };
        self.shared.stats.record_lookup(existing.is_some());
        if let Some(value) = existing {
            return value;
        }

        let supplied = supplier();

        let _guard = self.shared.mutation.lock();
        let map = self.shared.current();
        let mut inserted = false;
        let stored = map
            .entry(key)
            .or_insert_with(|| {
                inserted = true;
                Entry::new(supplied)
            })
            .value()
            .value()
            .clone();
        if inserted {
            self.shared.stats.record_insert();
        }
        stored
    }

    // == Put ==
    /// Inserts or overwrites `key`, stamped with the current time.
    pub fn put(&self, key: K, value: V) -> Entry<V> {
        let entry = Entry::new(value);
        self.shared.current().insert(key, entry.clone());
        self.shared.stats.record_insert();
        entry
    }

    // == Remove ==
    /// Removes `key` if present, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let _guard = self.shared.mutation.lock();
        let removed = self.shared.current().remove(key);
        removed.map(|(_, entry)| entry.into_value())
    }

    // == Size ==
    /// Number of entries; a snapshot under concurrent mutation.
    pub fn size(&self) -> usize {
        self.shared.current().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    // == Clear ==
    /// Atomically replaces the contents with an empty map.
    ///
    /// The evictor and policy are unaffected.
    pub fn clear(&self) {
        *self.shared.map.write() = Arc::new(DashMap::new());
        debug!("Cache cleared");
    }

    /// The policy this cache was built with.
    pub fn policy(&self) -> &ExpiryPolicy {
        &self.shared.policy
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.shared.stats.snapshot(self.size())
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        self.evictor.abort();
    }
}

impl<K: Hash + Eq, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("policy", &self.shared.policy)
            .field("size", &self.shared.current().len())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use chrono::TimeDelta;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn ttl_cache(millis: u64) -> Cache<u32, String> {
        Cache::with_ttl(millis).unwrap()
    }

    #[tokio::test]
    async fn test_cache_new() {
        let cache = ttl_cache(1000);
        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.policy(), &ExpiryPolicy::Ttl(Duration::from_secs(1)));
    }

    #[test]
    fn test_cache_requires_runtime() {
        let result = Cache::<u32, String>::with_ttl(1000);
        assert!(matches!(result, Err(CacheError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_construction() {
        assert!(matches!(
            Cache::<u32, String>::with_ttl(0),
            Err(CacheError::InvalidTtl(_))
        ));
        assert!(matches!(
            Cache::<u32, String>::at_daily_time(25, 0, 0),
            Err(CacheError::InvalidTimeOfDay { .. })
        ));
        assert!(matches!(
            Cache::<u32, String>::with_config(
                ExpiryPolicy::Ttl(Duration::ZERO),
                CacheConfig::default()
            ),
            Err(CacheError::InvalidTtl(_))
        ));
        assert!(matches!(
            Cache::<u32, String>::with_config(
                ExpiryPolicy::Ttl(Duration::from_secs(1)),
                CacheConfig::default().with_sweep_interval(Duration::ZERO)
            ),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_with_ttl_unit() {
        let cache: Cache<u32, String> = Cache::with_ttl_unit(5, TimeUnit::Minutes).unwrap();
        assert_eq!(cache.policy(), &ExpiryPolicy::Ttl(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = ttl_cache(60_000);

        let entry = cache.put(1, "Magnus".to_string());
        assert_eq!(entry.value(), "Magnus");
        assert_eq!(cache.get(&1), Some("Magnus".to_string()));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_get_borrowed_key() {
        let cache: Cache<String, u32> = Cache::with_ttl(60_000).unwrap();
        cache.put("answer".to_string(), 42);

        assert_eq!(cache.get("answer"), Some(42));
        assert_eq!(cache.remove("answer"), Some(42));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let cache = ttl_cache(60_000);
        assert_eq!(cache.get(&7), None);
        assert!(cache.get_entry(&7).is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let cache = ttl_cache(60_000);

        let first = cache.put(1, "v1".to_string());
        let second = cache.put(1, "v2".to_string());

        assert_eq!(cache.get(&1), Some("v2".to_string()));
        assert_eq!(cache.size(), 1);
        assert!(second.created_at() >= first.created_at());
        assert_eq!(cache.get_entry(&1), Some(second));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache = ttl_cache(60_000);

        cache.put(1, "value".to_string());
        assert_eq!(cache.remove(&1), Some("value".to_string()));
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);

        // Removing a missing key is a no-op
        assert_eq!(cache.remove(&1), None);
    }

    #[tokio::test]
    async fn test_get_or_compute_miss_then_hit() {
        let cache = ttl_cache(60_000);
        let calls = AtomicUsize::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(Some("Magnus".to_string()))
        };

        assert_eq!(cache.get_or_compute(1, producer).unwrap(), Some("Magnus".to_string()));
        assert_eq!(cache.get_or_compute(1, producer).unwrap(), Some("Magnus".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_none_is_not_cached() {
        let cache = ttl_cache(60_000);

        let result = cache.get_or_compute(1, || Ok::<_, CacheError>(None));
        assert_eq!(result, Ok(None));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_compute_error_propagates() {
        let cache = ttl_cache(60_000);

        let result = cache.get_or_compute(1, || Err::<Option<String>, _>("db down"));
        assert_eq!(result, Err("db down"));
        assert_eq!(cache.get(&1), None);
    }

    #[tokio::test]
    async fn test_get_or_compute_skips_producer_when_present() {
        let cache = ttl_cache(60_000);
        cache.put(1, "cached".to_string());

        let result = cache.get_or_compute(1, || -> std::result::Result<Option<String>, ()> {
            panic!("producer must not run for a present key")
        });
        assert_eq!(result, Ok(Some("cached".to_string())));
    }

    #[tokio::test]
    async fn test_get_or_compute_async() {
        let cache = ttl_cache(60_000);

        let value = cache
            .get_or_compute_async(1, || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, CacheError>(Some("async".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, Some("async".to_string()));

        let again = cache
            .get_or_compute_async(1, || async { Err::<Option<String>, _>("not called") })
            .await;
        assert_eq!(again, Ok(Some("async".to_string())));
    }

    #[tokio::test]
    async fn test_get_or_else() {
        let cache = ttl_cache(60_000);

        assert_eq!(cache.get_or_else(1, || "first".to_string()), "first");
        assert_eq!(cache.get_or_else(1, || "second".to_string()), "first");
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_get_or_else_keeps_value_stored_while_supplying() {
        let cache = ttl_cache(60_000);

        let value = cache.get_or_else(1, || {
            cache.put(1, "first".to_string());
            "second".to_string()
        });

        assert_eq!(value, "first");
        assert_eq!(cache.get(&1), Some("first".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_get_or_else_nested() {
        let cache = Arc::new(Cache::<u32, u32>::with_ttl(60_000).unwrap());
        let (tx, rx) = mpsc::channel();

        let worker = Arc::clone(&cache);
        std::thread::spawn(move || {
            let value = worker.get_or_else(1, || worker.get_or_else(2, || 5) + 1);
            let _ = tx.send(value);
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(3)), Ok(6));
        assert_eq!(cache.get(&1), Some(6));
        assert_eq!(cache.get(&2), Some(5));
    }

    #[tokio::test]
    async fn test_get_or_else_supplier_panic_leaves_key_absent() {
        let cache = ttl_cache(60_000);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.get_or_else(1, || -> String { panic!("supplier failed") })
        }));
        assert!(result.is_err());
        assert_eq!(cache.get(&1), None);

        // Mutation lock is free again
        cache.put(2, "other".to_string());
        assert_eq!(cache.remove(&2), Some("other".to_string()));
        assert_eq!(cache.get_or_else(1, || "recovered".to_string()), "recovered");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_supplier_does_not_block_remove_or_sweep() {
        let cache = Arc::new(ttl_cache(60_000));
        cache.put(9, "other".to_string());
        let (started_tx, started_rx) = mpsc::channel();

        let worker = Arc::clone(&cache);
        let slow = std::thread::spawn(move || {
            worker.get_or_else(1, || {
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(1000));
                "slow".to_string()
            })
        });
        started_rx.recv_timeout(Duration::from_secs(3)).unwrap();

        let start = Instant::now();
        assert_eq!(cache.remove(&9), Some("other".to_string()));
        cache.shared.sweep(Utc::now());
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "remove and sweep waited {:?} on the supplier",
            start.elapsed()
        );

        assert_eq!(slow.join().unwrap(), "slow");
        assert_eq!(cache.get(&1), Some("slow".to_string()));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ttl_cache(60_000);

        // Clearing an empty cache is a no-op
        cache.clear();
        assert_eq!(cache.size(), 0);

        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());
        cache.clear();

        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), None);

        // Still usable after clear
        cache.put(3, "c".to_string());
        assert_eq!(cache.get(&3), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = ttl_cache(2000);
        let now = Utc::now();

        cache
            .shared
            .current()
            .insert(1, Entry::with_created_at("old".to_string(), now - TimeDelta::seconds(3)));
        cache
            .shared
            .current()
            .insert(2, Entry::with_created_at("edge".to_string(), now - TimeDelta::seconds(2)));
        cache.put(3, "fresh".to_string());

        let removed = cache.shared.sweep(Utc::now());
        assert_eq!(removed, 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), Some("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_daily_flush_removes_everything() {
        let cache: Cache<u32, String> = Cache::at_daily_time(3, 0, 0).unwrap();
        cache.put(1, "a".to_string());
        cache.put(2, "b".to_string());

        assert_eq!(cache.shared.sweep(Utc::now()), 2);
        assert!(cache.is_empty());

        cache.put(3, "c".to_string());
        assert_eq!(cache.get(&3), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = ttl_cache(60_000);

        cache.put(1, "value".to_string());
        cache.get(&1); // hit
        cache.get(&2); // miss
        cache.shared.sweep(Utc::now());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writers() {
        let cache = Arc::new(Cache::<u32, u32>::with_ttl(60_000).unwrap());

        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    for i in 0..250u32 {
                        cache.put(t * 1000 + i, i);
                        cache.get_or_else(100_000 + i, || i);
                        if i % 10 == 0 {
                            cache.remove(&(t * 1000 + i));
                        }
                    }
                });
            }
        });

        // 4 * 250 puts minus 4 * 25 removes, plus 250 shared get_or_else keys
        assert_eq!(cache.size(), 4 * 225 + 250);
    }
}
