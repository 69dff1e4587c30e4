//! Time-boxed read-through cache.
//!
//! [`TtlCache`] replaces a value once it is older than the configured TTL. Refreshes are
//! serialized per key, so concurrent misses on the same key trigger a single load while misses on
//! different keys proceed independently. Failed loads are never cached. Stale entries are evicted
//! whenever a new key is inserted.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;

use crate::metrics;

/// Source of the current instant, injectable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed_ms: Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ms: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.elapsed_ms.load(std::sync::atomic::Ordering::SeqCst))
    }
}

struct Entry<V> {
    value: V,
    refreshed_at: Instant,
}

type Slot<V> = Arc<RwLock<Option<Entry<V>>>>;

pub struct TtlCache<K, V, C = SystemClock> {
    name: &'static str,
    ttl: Duration,
    clock: C,
    slots: RwLock<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self::with_clock(name, ttl, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    C: Clock,
{
    /// `name` labels the cache in metrics.
    pub fn with_clock(name: &'static str, ttl: Duration, clock: C) -> Self {
        Self {
            name,
            ttl,
            clock,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, calling `loader` if it is missing or stale.
    pub async fn get_or_refresh<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(key).await;

        if let Some(value) = self.fresh_value(&*slot.read().await) {
            metrics::record_cache_lookup(self.name, true);
            return Ok(value);
        }

        let mut entry = slot.write().await;
        // Another caller may have refreshed while we waited for the write lock
        if let Some(value) = self.fresh_value(&entry) {
            metrics::record_cache_lookup(self.name, true);
            return Ok(value);
        }

        metrics::record_cache_lookup(self.name, false);
        let value = loader().await?;
        *entry = Some(Entry {
            value: value.clone(),
            refreshed_at: self.clock.now(),
        });
        Ok(value)
    }

    /// Drop the value for `key`, forcing the next read to reload.
    pub async fn invalidate(&self, key: &K) {
        self.slots.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn fresh_value(&self, entry: &Option<Entry<V>>) -> Option<V> {
        entry
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    fn is_fresh(&self, entry: &Entry<V>) -> bool {
        self.clock.now().saturating_duration_since(entry.refreshed_at) < self.ttl
    }

    async fn slot(&self, key: K) -> Slot<V> {
        if let Some(slot) = self.slots.read().await.get(&key) {
            return slot.clone();
        }

        let mut slots = self.slots.write().await;
        if !slots.contains_key(&key) {
            // Evict stale entries; slots being refreshed right now are kept
            slots.retain(|_, slot| match slot.try_read() {
                Ok(guard) => match &*guard {
                    Some(entry) => self.is_fresh(entry),
                    None => false,
                },
                Err(_) => true,
            });
        }
        slots.entry(key).or_insert_with(|| Arc::new(RwLock::new(None))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_loader(calls: &Arc<AtomicUsize>, value: &'static str) -> impl Future<Output = Result<String, String>> {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value.to_string())
        }
    }

    #[tokio::test]
    async fn serves_cached_value_within_ttl() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_refresh("teams", || counting_loader(&calls, "a")).await.unwrap();
        clock.advance(Duration::from_secs(59));
        let second = cache.get_or_refresh("teams", || counting_loader(&calls, "b")).await.unwrap();

        assert_eq!(first, "a");
        assert_eq!(second, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_after_ttl() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), clock.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_refresh("teams", || counting_loader(&calls, "a")).await.unwrap();
        clock.advance(Duration::from_secs(60));
        let refreshed = cache.get_or_refresh("teams", || counting_loader(&calls, "b")).await.unwrap();

        assert_eq!(refreshed, "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: TtlCache<&str, String, ManualClock> = TtlCache::with_clock("test", Duration::from_secs(60), ManualClock::new());

        let failed = cache
            .get_or_refresh("teams", || async { Err::<String, _>("backend down".to_string()) })
            .await;
        assert_eq!(failed.unwrap_err(), "backend down");

        let recovered = cache
            .get_or_refresh("teams", || async { Ok::<_, String>("ok".to_string()) })
            .await;
        assert_eq!(recovered.unwrap(), "ok");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), ManualClock::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let a = cache.get_or_refresh("a", || counting_loader(&calls, "value-a")).await.unwrap();
        let b = cache.get_or_refresh("b", || counting_loader(&calls, "value-b")).await.unwrap();

        assert_eq!((a.as_str(), b.as_str()), ("value-a", "value-b"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_load_once() {
        let cache = Arc::new(TtlCache::with_clock("test", Duration::from_secs(60), ManualClock::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_refresh("teams", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>("loaded".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert_eq!(task.unwrap().unwrap(), "loaded");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_evicted_on_insert() {
        let clock = ManualClock::new();
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), clock.clone());

        cache.get_or_refresh("old", || async { Ok::<_, ()>(1) }).await.unwrap();
        clock.advance(Duration::from_secs(120));
        cache.get_or_refresh("new", || async { Ok::<_, ()>(2) }).await.unwrap();

        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let cache = TtlCache::with_clock("test", Duration::from_secs(60), ManualClock::new());

        cache.get_or_refresh("k", || async { Ok::<_, ()>(1) }).await.unwrap();
        cache.invalidate(&"k").await;
        let reloaded = cache.get_or_refresh("k", || async { Ok::<_, ()>(2) }).await.unwrap();

        assert_eq!(reloaded, 2);
    }
}
