//! Ephemeral TTL cache for read-mostly lookups.
//!
//! Entries carry an absolute expiry stamped at insertion; `get` evicts
//! lazily. Nothing sweeps in the background — `clear_expired` must be
//! called by whoever wants memory back for entries nobody reads anymore.
//! The map is mutex-guarded: the daemon runs on a multi-threaded runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default entry lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry<V> {
    value: V,
    expiry: Instant,
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Look up a key, lazily evicting it if its expiry has passed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            None => None,
            Some(entry) if Instant::now() > entry.expiry => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
        }
    }

    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let entry = Entry { value, expiry: Instant::now() + ttl };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Drop every entry whose expiry has passed, leaving live ones intact.
    pub fn clear_expired(&self) {
        let now = Instant::now();
        self.entries.lock().unwrap().retain(|_, entry| now <= entry.expiry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Read-through helper: consult the cache, otherwise run `fetch` and
    /// remember its result. Nothing invalidates on writes elsewhere; stale
    /// reads last at most `ttl`.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(cached) = self.get(key) {
            return Ok(cached);
        }

        let value = fetch().await?;
        self.set_with_ttl(key, value.clone(), ttl.unwrap_or(self.default_ttl));
        Ok(value)
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
