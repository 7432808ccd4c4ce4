//! Finished-frame slot between the render worker and the presenter
//!
//! Holds only the latest frame. Every publish gets a fresh, strictly
//! increasing id; the presenter remembers the last id it consumed and never
//! acts on an id at or below it. Older unconsumed frames are simply
//! overwritten.

use log::trace;
use std::sync::Mutex;

use crate::entities::frame::Size;

/// A converted RGBA8 frame as published by the worker
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedFrame {
    pub pixels: Vec<u8>,
    pub size: Size,
    /// Frame the worker was asked to render
    pub frame: f32,
    /// Load epoch of the scene that produced it
    pub epoch: u64,
    /// Assigned by `publish`
    pub id: u64,
}

impl FinishedFrame {
    pub fn new(pixels: Vec<u8>, size: Size, frame: f32, epoch: u64) -> Self {
        Self {
            pixels,
            size,
            frame,
            epoch,
            id: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Pending (ready) frame
    frame: Option<FinishedFrame>,
    last_id: u64,
}

#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame under a fresh id, replacing any unconsumed one.
    pub fn publish(&self, mut frame: FinishedFrame) -> u64 {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.last_id += 1;
        frame.id = slot.last_id;
        trace!("Mailbox publish #{} ({}, frame {:.2})", frame.id, frame.size, frame.frame);
        slot.frame = Some(frame);
        slot.last_id
    }

    /// Take the pending frame if its id is newer than `last_seen`.
    pub fn take_newer(&self, last_seen: u64) -> Option<FinishedFrame> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.frame.take_if(|f| f.id > last_seen)
    }

    /// Drop any pending frame (the id counter keeps counting)
    pub fn invalidate(&self) {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).frame = None;
    }

    /// Id of the most recent publish (0 = none yet)
    pub fn latest_id(&self) -> u64 {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).last_id
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).frame.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(fill: u8) -> FinishedFrame {
        FinishedFrame::new(vec![fill; 4], Size::new(1, 1), 0.0, 0)
    }

    #[test]
    fn test_latest_wins() {
        let mb = FrameMailbox::new();
        let a = mb.publish(frame(1));
        let b = mb.publish(frame(2));
        assert!(b > a);

        let f = mb.take_newer(0).unwrap();
        assert_eq!(f.id, b);
        assert_eq!(f.pixels, vec![2; 4]);
        // consumed
        assert!(mb.take_newer(0).is_none());
    }

    #[test]
    fn test_never_returns_seen_id() {
        let mb = FrameMailbox::new();
        let id = mb.publish(frame(0));
        assert!(mb.take_newer(id).is_none());
        assert!(mb.is_ready());
        assert!(mb.take_newer(id + 5).is_none());
        assert_eq!(mb.take_newer(id - 1).map(|f| f.id), Some(id));
    }

    #[test]
    fn test_invalidate() {
        let mb = FrameMailbox::new();
        mb.publish(frame(0));
        mb.invalidate();
        assert!(mb.take_newer(0).is_none());
        assert_eq!(mb.latest_id(), 1);
        assert_eq!(mb.publish(frame(0)), 2);
    }

    #[test]
    fn test_ids_monotonic_under_concurrency() {
        let mb = Arc::new(FrameMailbox::new());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let mb = Arc::clone(&mb);
                thread::spawn(move || (0..250).map(|_| mb.publish(frame(0))).collect::<Vec<_>>())
            })
            .collect();

        let mut last_seen = 0;
        while mb.latest_id() < 1000 {
            if let Some(f) = mb.take_newer(last_seen) {
                assert!(f.id > last_seen);
                last_seen = f.id;
            }
        }

        let mut all: Vec<u64> = producers.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(mb.latest_id(), 1000);
    }
}
