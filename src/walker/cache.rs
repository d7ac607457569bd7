//! Per-server response cache
//!
//! Shared by every worker of one server so that an object reached from
//! several branches of the graph is fetched once. Values are computed
//! outside the lock; if two workers race on the same key the first insert
//! wins and both get the stored value.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache key: object name plus normalized source filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub object: String,
    pub sources: String,
}

impl CacheKey {
    pub fn new(object: &str, sources: impl Into<String>) -> Self {
        Self {
            object: object.to_string(),
            sources: sources.into(),
        }
    }
}

/// Statistics for the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Raw responses keyed by object and source filter
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, Arc<str>>>,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<str>> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a value unless one is already present; returns the stored value
    pub fn insert(&self, key: CacheKey, value: Arc<str>) -> Arc<str> {
        Arc::clone(self.entries.lock().entry(key).or_insert(value))
    }

    /// Return the cached value, or compute and store it
    ///
    /// The flag is true when the value came from the cache. Errors are
    /// returned to the caller and nothing is stored.
    pub fn get_or_try_insert_with<F, E>(&self, key: CacheKey, fetch: F) -> Result<(Arc<str>, bool), E>
    where
        F: FnOnce() -> Result<Arc<str>, E>,
    {
        if let Some(value) = self.get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((value, true));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let value = fetch()?;
        Ok((self.insert(key, value), false))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fetch_once() {
        let cache = ResponseCache::new();
        let key = CacheKey::new("AS-JPNIC", "");
        let mut calls = 0;

        for round in 0..3 {
            let value: Result<_, ()> = cache.get_or_try_insert_with(key.clone(), || {
                calls += 1;
                Ok(Arc::from("A7\nAS2515\nC\n"))
            });
            let (value, hit) = value.unwrap();
            assert_eq!(&*value, "A7\nAS2515\nC\n");
            assert_eq!(hit, round > 0);
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.stats().hit_count(), 2);
        assert_eq!(cache.stats().miss_count(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = ResponseCache::new();
        let key = CacheKey::new("AS-JPNIC", "JPIRR");

        let err: Result<_, &str> = cache.get_or_try_insert_with(key.clone(), || Err("timeout"));
        assert_eq!(err.unwrap_err(), "timeout");
        assert!(cache.is_empty());

        let ok: Result<_, &str> = cache.get_or_try_insert_with(key, || Ok(Arc::from("C\n")));
        assert_eq!(ok.map(|(_, hit)| hit), Ok(false));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sources_are_part_of_the_key() {
        let cache = ResponseCache::new();
        cache.insert(CacheKey::new("AS-JPNIC", "JPIRR"), Arc::from("one"));
        cache.insert(CacheKey::new("AS-JPNIC", ""), Arc::from("two"));

        assert_eq!(cache.len(), 2);
        assert_eq!(&*cache.get(&CacheKey::new("AS-JPNIC", "JPIRR")).unwrap(), "one");
    }

    #[test]
    fn test_concurrent_inserts_agree() {
        let cache = Arc::new(ResponseCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache.insert(CacheKey::new("AS1", ""), Arc::from(format!("value-{}", i)))
                })
            })
            .collect();

        let values: Vec<Arc<str>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cache.len(), 1);
    }
}
