use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Small keyed cache with a fixed time-to-live and explicit invalidation.
/// Used for read-side views (import history, duplicate checks) that may go
/// stale while a job is writing; mutations invalidate the affected keys
/// instead of waiting out the TTL.
pub struct TtlCache<V: Clone> {
    ttl: Option<Duration>,
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that never stores anything. Lets callers keep one code path
    /// when caching is turned off by configuration.
    pub fn disabled() -> Self {
        Self {
            ttl: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let ttl = self.ttl?;
        let mut entries = self.entries.lock().expect("Mutex poisoned");
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        if self.ttl.is_none() {
            return;
        }
        self.entries
            .lock()
            .expect("Mutex poisoned")
            .insert(key.into(), (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().expect("Mutex poisoned").remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("Mutex poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_live_until_the_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("history", vec![1, 2, 3]);
        assert_eq!(cache.get("history"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("history", 1u32);
        assert_eq!(cache.get("history"), None);
    }

    #[test]
    fn invalidation_removes_a_single_key() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1u32);
        cache.insert("b", 2u32);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = TtlCache::disabled();
        cache.insert("a", 1u32);
        assert_eq!(cache.get("a"), None);
    }
}
