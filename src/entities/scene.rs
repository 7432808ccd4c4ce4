//! Vector engine boundary and per-thread scene instances
//!
//! The rasterizer (tessellation, fills, easing) lives outside this crate.
//! It is consumed through two traits:
//!
//! - [`SceneEngine`]: factory shared between threads (`Send + Sync`)
//! - [`VectorScene`]: one loaded scene object; NOT safe for concurrent mutation
//!
//! [`SceneInstance`] wraps a `VectorScene` with the metadata the player needs
//! (intrinsic size, duration, frame count, active segment, fit transform).
//! The presentation thread and the render worker each own their own instance
//! loaded from the same path; they are never shared.

use glam::{Affine2, Vec2};
use log::{debug, trace};
use std::fmt;
use std::path::{Path, PathBuf};

use super::frame::{RasterTarget, Size};

/// Scene loading errors
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    EmptyPath,
    NotFound(PathBuf),
    Io(String),
    Parse(String),
    Engine(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::EmptyPath => write!(f, "No scene path given"),
            LoadError::NotFound(p) => write!(f, "Scene not found: {}", p.display()),
            LoadError::Io(e) => write!(f, "IO error: {}", e),
            LoadError::Parse(e) => write!(f, "Parse error: {}", e),
            LoadError::Engine(e) => write!(f, "Engine error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Frame range restriction `[begin, end)` in frames.
///
/// Boundary policy: frames below `begin` map to `begin`, frames at or past
/// `end` map to the last whole frame `end - 1` (or `begin` for sub-frame
/// segments).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Segment {
    pub begin: f32,
    pub end: f32,
}

impl Segment {
    /// Build a segment; an empty or inverted range becomes one frame long.
    pub fn new(begin: f32, end: f32) -> Self {
        let begin = begin.max(0.0);
        let end = if end <= begin { begin + 1.0 } else { end };
        Self { begin, end }
    }

    /// Length in frames
    pub fn len(&self) -> f32 {
        self.end - self.begin
    }

    /// Last addressable frame
    pub fn last(&self) -> f32 {
        (self.end - 1.0).max(self.begin)
    }

    pub fn contains(&self, frame: f32) -> bool {
        frame >= self.begin && frame < self.end
    }

    /// Map any frame into the segment
    pub fn clamp(&self, frame: f32) -> f32 {
        if frame.is_nan() || frame < self.begin {
            self.begin
        } else if frame > self.last() {
            self.last()
        } else {
            frame
        }
    }
}

/// One loaded vector scene owned by a single thread.
pub trait VectorScene: Send {
    /// Parse the scene at `path`. On error the object holds no usable scene.
    fn load(&mut self, path: &Path) -> Result<(), LoadError>;

    /// Intrinsic (authored) size; non-positive values mean "unknown"
    fn intrinsic_size(&self) -> Vec2;

    fn total_frames(&self) -> f32;

    /// Duration in seconds
    fn duration(&self) -> f32;

    /// Absolute picture transform (replaces the previous one)
    fn set_transform(&mut self, transform: Affine2);

    fn set_segment(&mut self, segment: Option<Segment>);

    fn set_frame(&mut self, frame: f32);

    /// Synchronously rasterize the current frame into `target`
    fn draw(&mut self, target: &mut RasterTarget);
}

/// Creates scene objects; shared by the player and its worker.
pub trait SceneEngine: Send + Sync {
    fn name(&self) -> &str;

    fn create_scene(&self) -> Box<dyn VectorScene>;
}

/// Uniform scale-to-fit with centering, as an absolute transform.
pub fn fit_transform(intrinsic: Vec2, target: Size) -> Affine2 {
    let pw = intrinsic.x.max(1.0);
    let ph = intrinsic.y.max(1.0);
    let (tw, th) = (target.width as f32, target.height as f32);
    let s = (tw / pw).min(th / ph);
    let translation = Vec2::new((tw - pw * s) * 0.5, (th - ph * s) * 0.5);
    Affine2::from_scale_angle_translation(Vec2::splat(s), 0.0, translation)
}

/// A scene plus the metadata needed to drive it
pub struct SceneInstance {
    scene: Box<dyn VectorScene>,
    path: PathBuf,
    intrinsic: Vec2,
    total_frames: f32,
    duration: f32,
    segment: Option<Segment>,
    fitted_to: Size,
}

impl fmt::Debug for SceneInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneInstance")
            .field("path", &self.path)
            .field("intrinsic", &self.intrinsic)
            .field("total_frames", &self.total_frames)
            .field("duration", &self.duration)
            .field("segment", &self.segment)
            .field("fitted_to", &self.fitted_to)
            .finish()
    }
}

impl SceneInstance {
    /// Create a fresh scene object and load `path` into it.
    ///
    /// `fallback` replaces an unknown intrinsic size.
    pub fn open(engine: &dyn SceneEngine, path: &Path, fallback: Size) -> Result<Self, LoadError> {
        if path.as_os_str().is_empty() {
            return Err(LoadError::EmptyPath);
        }
        let mut scene = engine.create_scene();
        scene.load(path)?;

        let mut intrinsic = scene.intrinsic_size();
        if intrinsic.x <= 0.0 || intrinsic.y <= 0.0 {
            intrinsic = Vec2::new(fallback.width as f32, fallback.height as f32);
        }
        let total_frames = scene.total_frames().max(0.0);
        let duration = scene.duration().max(0.0);

        debug!(
            "Scene opened via {}: {} ({}x{}, {} frames, {:.3}s)",
            engine.name(),
            path.display(),
            intrinsic.x,
            intrinsic.y,
            total_frames,
            duration
        );

        Ok(Self {
            scene,
            path: path.to_path_buf(),
            intrinsic,
            total_frames,
            duration,
            segment: None,
            fitted_to: Size::ZERO,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn intrinsic_size(&self) -> Vec2 {
        self.intrinsic
    }

    /// Intrinsic size rounded up to whole pixels
    pub fn base_size(&self) -> Size {
        Size::new(self.intrinsic.x.ceil() as u32, self.intrinsic.y.ceil() as u32)
    }

    pub fn total_frames(&self) -> f32 {
        self.total_frames
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn segment(&self) -> Option<Segment> {
        self.segment
    }

    /// Active playback range: the segment, or the whole timeline
    pub fn frame_range(&self) -> Segment {
        self.segment
            .unwrap_or(Segment { begin: 0.0, end: self.total_frames.max(1.0) })
    }

    /// Restrict playback to `segment` (None = whole timeline)
    pub fn set_segment(&mut self, segment: Option<Segment>) {
        self.segment = segment;
        self.scene.set_segment(segment);
    }

    /// Reapply the fit-to-box transform for a new target size
    pub fn fit_to(&mut self, size: Size) {
        if size.is_empty() {
            return;
        }
        self.scene.set_transform(fit_transform(self.intrinsic, size));
        self.fitted_to = size;
    }

    /// Size the current transform was computed for
    pub fn fitted_to(&self) -> Size {
        self.fitted_to
    }

    /// Render `frame` into `target`. Returns false when skipped (zero area).
    pub fn render(&mut self, frame: f32, target: &mut RasterTarget) -> bool {
        if target.is_empty() {
            trace!("Render skipped: zero-area target");
            return false;
        }
        if self.fitted_to != target.size() {
            self.fit_to(target.size());
        }
        let frame = self.frame_range().clamp(frame);
        self.scene.set_frame(frame);
        target.clear();
        self.scene.draw(target);
        true
    }
}
