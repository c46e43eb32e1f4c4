//! Bounded cache of segment sequences keyed by source text.

use super::Segment;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of documents kept in the cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Cache of computed segment sequences.
///
/// When full, the whole cache is cleared before the next insert. Eviction only
/// costs recomputation, never correctness.
#[derive(Debug)]
pub struct SegmentCache {
    capacity: usize,
    entries: HashMap<String, Arc<[Segment]>>,
}

impl SegmentCache {
    /// Create a cache holding at most `capacity` sequences. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, text: &str) -> Option<Arc<[Segment]>> {
        self.entries.get(text).cloned()
    }

    pub fn insert(&mut self, text: &str, segments: Arc<[Segment]>) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.len() >= self.capacity && !self.entries.contains_key(text) {
            debug!("Segment cache full ({} entries), clearing", self.entries.len());
            self.entries.clear();
        }

        self.entries.insert(text.to_string(), segments);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SegmentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(text: &str) -> Arc<[Segment]> {
        Arc::from(vec![Segment::new(0, text)])
    }

    #[test]
    fn test_get_returns_same_allocation() {
        let mut cache = SegmentCache::new(4);
        let segments = seq("One.");
        cache.insert("One.", Arc::clone(&segments));

        let cached = cache.get("One.").unwrap();
        assert!(Arc::ptr_eq(&cached, &segments));
        assert!(cache.get("Two.").is_none());
    }

    #[test]
    fn test_clears_everything_when_full() {
        let mut cache = SegmentCache::new(2);
        cache.insert("a", seq("a."));
        cache.insert("b", seq("b."));
        assert_eq!(cache.len(), 2);

        cache.insert("c", seq("c."));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_reinserting_existing_key_does_not_evict() {
        let mut cache = SegmentCache::new(2);
        cache.insert("a", seq("a."));
        cache.insert("b", seq("b."));
        cache.insert("b", seq("b."));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = SegmentCache::new(0);
        cache.insert("a", seq("a."));
        assert!(cache.is_empty());
    }
}
