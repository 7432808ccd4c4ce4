//! Live instance counts per source
//!
//! Players register their source on load and release it on unload/drop.
//! The count drives the live-cache decision: many players showing the same
//! animation share cached frames even while playing.

use log::trace;
use std::collections::HashMap;
use std::sync::Mutex;

use super::frame_cache::SourceKey;

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    counts: Mutex<HashMap<SourceKey, usize>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one instance; returns the new count
    pub fn increment(&self, key: &SourceKey) -> usize {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let n = counts.entry(key.clone()).or_insert(0);
        *n += 1;
        trace!("Registry: {} -> {}", key, n);
        *n
    }

    /// Release one instance; returns the remaining count (entry removed at 0)
    pub fn decrement(&self, key: &SourceKey) -> usize {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let Some(n) = counts.get_mut(key) else {
            return 0;
        };
        *n = n.saturating_sub(1);
        let left = *n;
        if left == 0 {
            counts.remove(key);
        }
        trace!("Registry: {} -> {}", key, left);
        left
    }

    pub fn count(&self, key: &SourceKey) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_inc_dec() {
        let reg = InstanceRegistry::new();
        let k: SourceKey = Arc::from("a.json");
        assert_eq!(reg.count(&k), 0);
        assert_eq!(reg.increment(&k), 1);
        assert_eq!(reg.increment(&k), 2);
        assert_eq!(reg.decrement(&k), 1);
        assert_eq!(reg.decrement(&k), 0);
        assert_eq!(reg.count(&k), 0);
        // extra release is harmless
        assert_eq!(reg.decrement(&k), 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let reg = Arc::new(InstanceRegistry::new());
        let k: SourceKey = Arc::from("shared.json");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let k = k.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment(&k);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.count(&k), 800);
    }
}
