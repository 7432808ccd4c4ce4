//! Frame cache byte budget
//!
//! Tracks memory held by cached images against an adjustable limit. Usage and
//! limit are both atomic so the budget can be read and changed from any
//! thread without taking the cache locks.
//!
//! **Used by**: FrameCache (one manager per cache), AnimationPlayer (budget setting)

use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes in one megabyte
pub const MB: usize = 1024 * 1024;

/// Smallest budget the player accepts
pub const MIN_BUDGET_MB: usize = 16;

#[derive(Debug)]
pub struct CacheManager {
    /// Atomically tracked memory usage (bytes)
    memory_usage: AtomicUsize,
    /// Maximum allowed memory (bytes)
    max_memory_bytes: AtomicUsize,
}

impl CacheManager {
    /// Create a manager with a byte limit
    ///
    /// # Example
    ///
    /// ```rust
    /// # use lotta::core::cache_man::{CacheManager, MB};
    /// let manager = CacheManager::new(256 * MB);
    /// assert_eq!(manager.mem(), (0, 256 * MB));
    /// ```
    pub fn new(limit_bytes: usize) -> Self {
        info!("CacheManager init: limit={} MB", limit_bytes / MB);
        Self {
            memory_usage: AtomicUsize::new(0),
            max_memory_bytes: AtomicUsize::new(limit_bytes),
        }
    }

    /// Check if memory limit exceeded
    pub fn check_memory_limit(&self) -> bool {
        self.memory_usage.load(Ordering::Relaxed) > self.max_memory_bytes.load(Ordering::Relaxed)
    }

    /// Get memory statistics (usage, limit)
    pub fn mem(&self) -> (usize, usize) {
        let usage = self.memory_usage.load(Ordering::Relaxed);
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        (usage, limit)
    }

    pub fn limit_bytes(&self) -> usize {
        self.max_memory_bytes.load(Ordering::Relaxed)
    }

    /// Add memory usage
    pub fn add_memory(&self, bytes: usize) {
        let new_usage = self.memory_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.max_memory_bytes.load(Ordering::Relaxed);
        if new_usage > limit {
            debug!(
                "Cache budget exceeded: {} KB / {} KB",
                new_usage / 1024,
                limit / 1024
            );
        }
    }

    /// Free memory usage (saturating subtraction to prevent underflow)
    pub fn free_memory(&self, bytes: usize) {
        loop {
            let current = self.memory_usage.load(Ordering::Relaxed);
            let new_val = current.saturating_sub(bytes);
            if self
                .memory_usage
                .compare_exchange_weak(current, new_val, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// Update memory limit. The caller evicts if now over budget.
    pub fn set_limit_bytes(&self, bytes: usize) {
        let old = self.max_memory_bytes.swap(bytes, Ordering::Relaxed);
        if old != bytes {
            info!("Cache budget updated: {} MB -> {} MB", old / MB, bytes / MB);
        }
    }

    /// Forget all tracked usage (after the owner dropped every entry)
    pub fn reset_usage(&self) {
        self.memory_usage.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_manager_creation() {
        let manager = CacheManager::new(4 * MB);
        let (usage, limit) = manager.mem();
        assert_eq!(usage, 0);
        assert_eq!(limit, 4 * MB);
        assert!(!manager.check_memory_limit());
    }

    #[test]
    fn test_memory_tracking() {
        let manager = CacheManager::new(MB);

        manager.add_memory(768 * 1024);
        assert!(!manager.check_memory_limit());

        manager.add_memory(512 * 1024);
        assert!(manager.check_memory_limit());

        manager.free_memory(1024 * 1024);
        assert_eq!(manager.mem().0, 256 * 1024);

        // Saturates at zero
        manager.free_memory(10 * MB);
        assert_eq!(manager.mem().0, 0);
    }

    #[test]
    fn test_set_limit() {
        let manager = CacheManager::new(MB);
        manager.add_memory(MB / 2);
        manager.set_limit_bytes(MB / 4);
        assert!(manager.check_memory_limit());
        assert_eq!(manager.mem(), (MB / 2, MB / 4));
    }
}
