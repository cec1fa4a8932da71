use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Entries never live longer than this, whatever ttl is asked for.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Clone)]
struct CacheEntry {
    text: Arc<str>,
    expires_at: Instant,
}

/// Thread-safe, content-addressable store of generated text keyed by a
/// request fingerprint.
///
/// Entries are never mutated after being written. A concurrent second writer
/// for the same key simply replaces the entry; generated content for one key
/// is treated as idempotent, so there is no per-key locking.
#[derive(Clone)]
pub struct ContentCache {
    cache: Arc<Mutex<LruCache<String, CacheEntry>>>,
}

impl ContentCache {
    /// Create a new ContentCache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Returns the cached text for `key`, or `None` on a miss. Expired entries
    /// count as misses and are evicted.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        match cache.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.text.to_string()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores `text` under `key` for `ttl`. Last write wins.
    pub fn set(&self, key: String, text: &str, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            text: Arc::from(text),
            expires_at: now.checked_add(ttl.min(MAX_ENTRY_TTL)).unwrap_or(now),
        };
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_cache_hit_after_set() {
        let cache = ContentCache::new(10);
        cache.set("k1".to_string(), "Paris is lovely", TTL);
        assert_eq!(cache.get("k1"), Some("Paris is lovely".to_string()));
    }

    #[test]
    fn test_unbounded_ttl_is_capped() {
        let cache = ContentCache::new(10);
        cache.set("k1".to_string(), "forever", Duration::MAX);
        assert_eq!(cache.get("k1"), Some("forever".to_string()));
    }

    #[test]
    fn test_cache_miss() {
        let cache = ContentCache::new(10);
        assert_eq!(cache.get("nonexistent"), None);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_evicted() {
        let cache = ContentCache::new(10);
        cache.set("k1".to_string(), "stale", Duration::from_millis(1));
        thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("k1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_enforcement() {
        let cache = ContentCache::new(2);
        cache.set("a".to_string(), "1", TTL);
        cache.set("b".to_string(), "2", TTL);
        cache.set("c".to_string(), "3", TTL);

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some("2".to_string()));
        assert_eq!(cache.get("c"), Some("3".to_string()));
    }

    #[test]
    fn test_last_write_wins() {
        let cache = ContentCache::new(4);
        cache.set("k".to_string(), "first", TTL);
        cache.set("k".to_string(), "second", TTL);
        assert_eq!(cache.get("k"), Some("second".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let cache = ContentCache::new(16);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    cache.set("shared".to_string(), "same generated text", TTL);
                    cache.get("shared")
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.join().unwrap(),
                Some("same generated text".to_string())
            );
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ContentCache::new(0);
        cache.set("k".to_string(), "v", TTL);
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }
}
