//! Keyed cache service with time-to-live expiry.
//!
//! Concurrent misses for the same key run a single initializer; the other
//! callers block on it and share its result. Failed initializations are not
//! cached.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::error::{FeatureError, Result};

/// Default lifetime of cached identifier sequences and mapping tables.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_ENTRIES: u64 = 10_000;

pub struct TtlCache<K, V> {
    inner: Cache<K, Arc<V>>,
    ttl: Duration,
}

impl<K, V> fmt::Debug for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entry_count", &self.inner.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self { inner, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live entry for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.get(key)
    }

    /// Return the entry for `key`, computing it with `init` on a miss.
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        self.inner.get_with(key, || Arc::new(init()))
    }

    /// Like [`Self::get_or_insert_with`] for fallible initializers.
    pub fn try_get_or_insert_with<F>(&self, key: K, init: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        self.inner
            .try_get_with(key, || init().map(Arc::new))
            .map_err(FeatureError::from)
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }
}
