use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::SearchResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Cache key: trimmed, lowercased query plus the requested result count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    max_results: usize,
}

impl CacheKey {
    pub fn new(query: &str, max_results: usize) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            max_results,
        }
    }
}

struct Entry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    /// Insertion order, oldest first. Drives eviction.
    order: VecDeque<CacheKey>,
}

/// Small bounded cache of recent search results.
///
/// Eviction is first-in first-out once `capacity` is exceeded; reads do not
/// refresh an entry. With a TTL, expired entries are dropped on lookup.
pub struct SearchCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl SearchCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchResult>> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
            None => return None,
        };

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.entries.get(key).map(|e| e.results.clone())
    }

    pub fn insert(&self, key: CacheKey, results: Vec<SearchResult>) {
        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            Entry {
                results,
                inserted_at: Instant::now(),
            },
        );

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(url: &str) -> Vec<SearchResult> {
        vec![SearchResult::new(url, "excerpt")]
    }

    #[test]
    fn key_normalizes_case_and_whitespace() {
        assert_eq!(CacheKey::new("  Rust News ", 4), CacheKey::new("rust news", 4));
        assert_ne!(CacheKey::new("rust news", 4), CacheKey::new("rust news", 5));
    }

    #[test]
    fn evicts_oldest_insertion_first() {
        let cache = SearchCache::new(2, None);
        cache.insert(CacheKey::new("a", 1), results("https://a"));
        cache.insert(CacheKey::new("b", 1), results("https://b"));
        // reading "a" does not protect it
        assert!(cache.get(&CacheKey::new("a", 1)).is_some());
        cache.insert(CacheKey::new("c", 1), results("https://c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::new("a", 1)).is_none());
        assert!(cache.get(&CacheKey::new("b", 1)).is_some());
        assert!(cache.get(&CacheKey::new("c", 1)).is_some());
    }

    #[test]
    fn reinserting_a_key_does_not_grow_the_cache() {
        let cache = SearchCache::new(2, None);
        cache.insert(CacheKey::new("a", 1), results("https://a1"));
        cache.insert(CacheKey::new("a", 1), results("https://a2"));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&CacheKey::new("a", 1)).unwrap()[0].url,
            "https://a2"
        );
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = SearchCache::new(4, Some(Duration::from_millis(1)));
        cache.insert(CacheKey::new("a", 1), results("https://a"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get(&CacheKey::new("a", 1)).is_none());
        assert!(cache.is_empty());
    }
}
