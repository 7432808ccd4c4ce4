//! Scripted scene engine for worker and player tests
//!
//! Every draw fills the target with opaque `0xFF00_xxxx` where `xxxx` is the
//! rounded frame, so tests can read back which frame produced an image.
//! Paths whose file name contains "bad" fail to load.

use glam::{Affine2, Vec2};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::entities::frame::RasterTarget;
use crate::entities::scene::{LoadError, SceneEngine, Segment, VectorScene};
use crate::entities::source::{ResolvedSource, SourceResolver};

#[derive(Clone)]
pub struct FakeEngine {
    total_frames: f32,
    duration: f32,
    intrinsic: Vec2,
    loads: Arc<AtomicUsize>,
    draws: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl FakeEngine {
    pub fn new(total_frames: f32, duration: f32) -> Self {
        Self {
            total_frames,
            duration,
            intrinsic: Vec2::new(100.0, 100.0),
            loads: Arc::new(AtomicUsize::new(0)),
            draws: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load attempts so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    /// Scene objects currently alive
    pub fn live_scenes(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SceneEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn create_scene(&self) -> Box<dyn VectorScene> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeScene {
            engine: self.clone(),
            loaded: false,
            frame: 0.0,
        })
    }
}

struct FakeScene {
    engine: FakeEngine,
    loaded: bool,
    frame: f32,
}

impl Drop for FakeScene {
    fn drop(&mut self) {
        self.engine.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl VectorScene for FakeScene {
    fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        self.engine.loads.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.contains("bad") {
            return Err(LoadError::Engine(format!("cannot parse {}", name)));
        }
        self.loaded = true;
        Ok(())
    }

    fn intrinsic_size(&self) -> Vec2 {
        self.engine.intrinsic
    }

    fn total_frames(&self) -> f32 {
        self.engine.total_frames
    }

    fn duration(&self) -> f32 {
        self.engine.duration
    }

    fn set_transform(&mut self, _transform: Affine2) {}

    fn set_segment(&mut self, _segment: Option<Segment>) {}

    fn set_frame(&mut self, frame: f32) {
        self.frame = frame;
    }

    fn draw(&mut self, target: &mut RasterTarget) {
        if !self.loaded {
            return;
        }
        self.engine.draws.fetch_add(1, Ordering::SeqCst);
        let value = 0xFF00_0000 | (self.frame.round() as u32 & 0xFFFF);
        target.pixels_mut().fill(value);
    }
}

/// Frame number encoded in the first pixel of an RGBA buffer
pub fn frame_of(rgba: &[u8]) -> u32 {
    (rgba[1] as u32) << 8 | rgba[2] as u32
}

/// Poll `cond` until true or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Resolves every id to itself, with a fixed marker table.
/// "missing.json" reports NotFound.
#[derive(Default)]
pub struct MapResolver {
    pub markers: HashMap<String, Segment>,
}

impl SourceResolver for MapResolver {
    fn resolve(&self, id: &str) -> Result<ResolvedSource, LoadError> {
        if id == "missing.json" {
            return Err(LoadError::NotFound(id.into()));
        }
        Ok(ResolvedSource {
            path: id.into(),
            markers: self.markers.clone(),
        })
    }
}
