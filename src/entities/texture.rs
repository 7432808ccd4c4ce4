//! Presentation textures
//!
//! The host owns the GPU side; the player only asks a [`TextureSink`] to
//! allocate, upload and release. [`TextureRing`] cycles through N handles so
//! the host can still sample the previous upload while the next one lands.

use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::frame::{Image, Size};

/// Opaque texture id handed out by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Host side of presentation (GPU upload, window surface, ...)
pub trait TextureSink: Send {
    fn allocate(&mut self, size: Size) -> TextureHandle;
    fn upload(&mut self, handle: TextureHandle, image: &Image);
    fn release(&mut self, handle: TextureHandle);
}

/// Round-robin set of presentation textures
#[derive(Debug)]
pub struct TextureRing {
    handles: Vec<TextureHandle>,
    size: Size,
    cursor: usize,
}

impl TextureRing {
    /// Minimum ring length
    pub const MIN_SLOTS: usize = 2;

    /// Empty ring (nothing allocated)
    pub fn empty() -> Self {
        Self {
            handles: Vec::new(),
            size: Size::ZERO,
            cursor: 0,
        }
    }

    /// Allocate `slots` textures (at least 2) of `size`
    pub fn new(sink: &mut dyn TextureSink, size: Size, slots: usize) -> Self {
        let slots = slots.max(Self::MIN_SLOTS);
        let handles = (0..slots).map(|_| sink.allocate(size)).collect();
        trace!("Texture ring: {} slots @ {}", slots, size);
        Self {
            handles,
            size,
            cursor: 0,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handle the host should currently display
    pub fn current(&self) -> Option<TextureHandle> {
        self.handles.get(self.cursor).copied()
    }

    /// Upload into the next slot and make it current.
    ///
    /// Returns false if the ring is empty or the image size doesn't match.
    pub fn present(&mut self, sink: &mut dyn TextureSink, image: &Image) -> bool {
        if self.handles.is_empty() || image.size() != self.size {
            return false;
        }
        self.cursor = (self.cursor + 1) % self.handles.len();
        sink.upload(self.handles[self.cursor], image);
        true
    }

    /// Release all handles back to the sink
    pub fn release(&mut self, sink: &mut dyn TextureSink) {
        for handle in self.handles.drain(..) {
            sink.release(handle);
        }
        self.size = Size::ZERO;
        self.cursor = 0;
    }
}

/// In-memory sink for host-less use and tests.
///
/// Clones share storage, so a caller can keep one clone to inspect what the
/// player uploaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextures {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    slots: HashMap<TextureHandle, Option<Arc<Image>>>,
    last: Option<TextureHandle>,
    uploads: u64,
}

impl MemoryTextures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently uploaded image
    pub fn last_upload(&self) -> Option<Arc<Image>> {
        let state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.last.and_then(|h| state.slots.get(&h).cloned().flatten())
    }

    /// Total uploads so far
    pub fn upload_count(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).uploads
    }

    /// Live (allocated, not released) handles
    pub fn live(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).slots.len()
    }
}

impl TextureSink for MemoryTextures {
    fn allocate(&mut self, _size: Size) -> TextureHandle {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.next_id += 1;
        let handle = TextureHandle(state.next_id);
        state.slots.insert(handle, None);
        handle
    }

    fn upload(&mut self, handle: TextureHandle, image: &Image) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = state.slots.get_mut(&handle) {
            *slot = Some(Arc::new(image.clone()));
            state.last = Some(handle);
            state.uploads += 1;
        }
    }

    fn release(&mut self, handle: TextureHandle) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.slots.remove(&handle);
        if state.last == Some(handle) {
            state.last = None;
        }
    }
}
