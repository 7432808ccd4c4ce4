//! Rendered frame cache with nested HashMap structure
//!
//! Structure: HashMap<SourceKey, HashMap<(qframe, Size), Entry>>
//! - Outer map: source key -> frames
//! - Inner map: (quantized frame, render size) -> image + byte cost
//!
//! Benefits:
//! - O(1) clear_source() - just remove outer key
//! - O(1) lookup by (source, qframe, size)
//! - Byte budget via CacheManager, LRU eviction via IndexSet
//!
//! Shared between players through `Arc`; a miss is the normal path.

use indexmap::IndexSet;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::cache_man::CacheManager;
use crate::entities::frame::{Image, Size};

/// Stable source identity (the resolved scene path)
pub type SourceKey = Arc<str>;

/// Cache statistics for monitoring performance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Entry in LRU eviction queue
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    source: SourceKey,
    qframe: i32,
    size: Size,
}

#[derive(Debug)]
struct Entry {
    image: Arc<Image>,
    bytes: usize,
}

type FrameMap = HashMap<(i32, Size), Entry>;

/// Frame cache with nested HashMap + LRU eviction under a byte budget.
///
/// Lock order: `cache` before `lru_order`.
#[derive(Debug)]
pub struct FrameCache {
    cache: Mutex<HashMap<SourceKey, FrameMap>>,
    /// LRU eviction queue: front = oldest
    lru_order: Mutex<IndexSet<CacheKey>>,
    cache_manager: CacheManager,
    stats: Arc<CacheStats>,
}

impl FrameCache {
    /// Create a cache with a byte budget
    pub fn new(capacity_bytes: usize) -> Self {
        debug!("FrameCache created: capacity={} KB", capacity_bytes / 1024);
        Self {
            cache: Mutex::new(HashMap::new()),
            lru_order: Mutex::new(IndexSet::new()),
            cache_manager: CacheManager::new(capacity_bytes),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Look up a frame. Updates LRU order on hit (moves to back of queue).
    pub fn get(&self, source: &SourceKey, qframe: i32, size: Size) -> Option<Arc<Image>> {
        let result = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache
                .get(source)
                .and_then(|frames| frames.get(&(qframe, size)))
                .map(|entry| Arc::clone(&entry.image))
        };

        match result {
            Some(image) if image.size() == size => {
                self.stats.record_hit();
                let key = CacheKey {
                    source: Arc::clone(source),
                    qframe,
                    size,
                };
                let mut lru = self.lru_order.lock().unwrap_or_else(|e| e.into_inner());
                lru.shift_remove(&key);
                lru.insert(key);
                trace!("Cache hit: {}:{} @ {}", source, qframe, size);
                Some(image)
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Check if a frame is cached (without updating LRU or stats)
    pub fn contains(&self, source: &SourceKey, qframe: i32, size: Size) -> bool {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(source)
            .map(|frames| frames.contains_key(&(qframe, size)))
            .unwrap_or(false)
    }

    /// Insert a frame, replacing any existing entry for the same key.
    ///
    /// Evicts oldest entries until back under budget. Images whose size
    /// doesn't match `size`, or that alone exceed the budget, are not stored.
    pub fn put(&self, source: &SourceKey, qframe: i32, size: Size, image: Arc<Image>, approx_bytes: usize) {
        if image.size() != size {
            debug!(
                "Cache put rejected: image {} != key size {}",
                image.size(),
                size
            );
            return;
        }
        if approx_bytes > self.cache_manager.limit_bytes() {
            trace!("Cache put skipped: {} bytes over whole budget", approx_bytes);
            return;
        }

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let mut lru = self.lru_order.lock().unwrap_or_else(|e| e.into_inner());
            let key = CacheKey {
                source: Arc::clone(source),
                qframe,
                size,
            };

            let frames = cache.entry(Arc::clone(source)).or_default();
            if let Some(old) = frames.insert((qframe, size), Entry { image, bytes: approx_bytes }) {
                self.cache_manager.free_memory(old.bytes);
                lru.shift_remove(&key);
                trace!("Replaced frame: {}:{} @ {}", source, qframe, size);
            }
            lru.insert(key);
            self.cache_manager.add_memory(approx_bytes);
        }

        while self.cache_manager.check_memory_limit() {
            if !self.evict_oldest() {
                break;
            }
        }
        trace!("Cached frame: {}:{} @ {} ({} bytes)", source, qframe, size, approx_bytes);
    }

    /// Evict oldest frame. Returns false if the cache is empty.
    fn evict_oldest(&self) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut lru = self.lru_order.lock().unwrap_or_else(|e| e.into_inner());

        let Some(key) = lru.shift_remove_index(0) else {
            return false;
        };

        let Some(frames) = cache.get_mut(&key.source) else {
            return true;
        };
        if let Some(evicted) = frames.remove(&(key.qframe, key.size)) {
            self.cache_manager.free_memory(evicted.bytes);
            debug!(
                "LRU evicted: {}:{} @ {} (freed {} KB)",
                key.source,
                key.qframe,
                key.size,
                evicted.bytes / 1024
            );
        }
        if frames.is_empty() {
            cache.remove(&key.source);
        }
        true
    }

    /// Change the byte budget; evicts immediately if now over it.
    pub fn set_capacity_bytes(&self, bytes: usize) {
        self.cache_manager.set_limit_bytes(bytes);
        while self.cache_manager.check_memory_limit() {
            if !self.evict_oldest() {
                break;
            }
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.cache_manager.limit_bytes()
    }

    /// Bytes currently held
    pub fn usage_bytes(&self) -> usize {
        self.cache_manager.mem().0
    }

    /// Clear all cached frames for one source - O(1) on the outer map
    pub fn clear_source(&self, source: &SourceKey) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut lru = self.lru_order.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(frames) = cache.remove(source) {
            let total_freed: usize = frames.values().map(|e| e.bytes).sum();
            self.cache_manager.free_memory(total_freed);
            lru.retain(|k| k.source != *source);
            debug!(
                "Cleared source {}: {} frames, {} KB freed",
                source,
                frames.len(),
                total_freed / 1024
            );
        }
    }

    /// Clear entire cache
    pub fn clear_all(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut lru = self.lru_order.lock().unwrap_or_else(|e| e.into_inner());
        cache.clear();
        lru.clear();
        self.cache_manager.reset_usage();
        debug!("Cleared entire frame cache");
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Total number of cached frames
    pub fn len(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.values().map(|frames| frames.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SourceKey {
        Arc::from(s)
    }

    fn image(size: Size) -> Arc<Image> {
        Arc::new(Image::transparent(size))
    }

    const S: Size = Size::new(8, 8);
    const BYTES: usize = 8 * 8 * 4;

    #[test]
    fn test_cache_basic_operations() {
        let cache = FrameCache::new(BYTES * 10);
        let src = key("a.json");

        cache.put(&src, 0, S, image(S), BYTES);
        assert!(cache.contains(&src, 0, S));
        assert!(cache.get(&src, 0, S).is_some());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage_bytes(), BYTES);
    }

    #[test]
    fn test_size_is_part_of_key() {
        let cache = FrameCache::new(BYTES * 10);
        let src = key("a.json");
        cache.put(&src, 3, S, image(S), BYTES);

        assert!(cache.get(&src, 3, Size::new(16, 16)).is_none());
        // mismatched image is never stored
        cache.put(&src, 4, Size::new(4, 4), image(S), BYTES);
        assert!(!cache.contains(&src, 4, Size::new(4, 4)));
    }

    #[test]
    fn test_replace_keeps_accounting() {
        let cache = FrameCache::new(BYTES * 10);
        let src = key("a.json");
        cache.put(&src, 0, S, image(S), BYTES);
        cache.put(&src, 0, S, image(S), BYTES);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage_bytes(), BYTES);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = FrameCache::new(BYTES * 3);
        let src = key("a.json");
        for f in 0..3 {
            cache.put(&src, f, S, image(S), BYTES);
        }
        // touch 0 so 1 becomes oldest
        assert!(cache.get(&src, 0, S).is_some());
        cache.put(&src, 3, S, image(S), BYTES);

        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&src, 0, S));
        assert!(!cache.contains(&src, 1, S));
        assert!(cache.contains(&src, 3, S));
    }

    #[test]
    fn test_shrink_capacity_evicts() {
        let cache = FrameCache::new(BYTES * 4);
        let src = key("a.json");
        for f in 0..4 {
            cache.put(&src, f, S, image(S), BYTES);
        }
        cache.set_capacity_bytes(BYTES * 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&src, 2, S));
        assert!(cache.contains(&src, 3, S));
        assert!(cache.usage_bytes() <= BYTES * 2);
    }

    #[test]
    fn test_oversized_entry_skipped() {
        let cache = FrameCache::new(BYTES);
        let src = key("a.json");
        cache.put(&src, 0, S, image(S), BYTES * 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_source() {
        let cache = FrameCache::new(BYTES * 20);
        let a = key("a.json");
        let b = key("b.json");
        for f in 0..5 {
            cache.put(&a, f, S, image(S), BYTES);
        }
        cache.put(&b, 0, S, image(S), BYTES);

        cache.clear_source(&a);
        assert!((0..5).all(|f| !cache.contains(&a, f, S)));
        assert!(cache.contains(&b, 0, S));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.usage_bytes(), BYTES);

        cache.put(&a, 0, S, image(S), BYTES);
        cache.clear_all();
        assert!(cache.is_empty());
        assert!(!cache.contains(&b, 0, S));
        assert_eq!(cache.usage_bytes(), 0);
    }

    #[test]
    fn test_cache_statistics() {
        let cache = FrameCache::new(BYTES * 4);
        let src = key("a.json");
        let stats = cache.stats();

        cache.put(&src, 0, S, image(S), BYTES);
        let _ = cache.get(&src, 0, S);
        let _ = cache.get(&src, 99, S);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
