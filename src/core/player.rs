//! Presentation scheduler: one animation on screen
//!
//! **Architecture**: `AnimationPlayer` lives on the presentation thread and is
//! driven by `tick(delta)`. It never blocks on rendering. With threading on,
//! rasterization runs on a [`RenderWorker`] that owns its own copy of the
//! scene; the player keeps a second, independent copy for metadata, static
//! renders and the inline path. The two copies are never shared.
//!
//! # Tick
//!
//! 1. accumulate elapsed time
//! 2. advance the playhead, emit frame-changed / finished
//! 3. dynamic resolution: evaluate, apply a due resize (rate-limited)
//! 4. threaded: post a render when (quantized frame, size) changed, using the
//!    frame cache when allowed; drain the mailbox, dropping stale frames.
//!    Inline: render synchronously when content is stale, under a
//!    [`RenderGuard`]
//! 5. request a redraw only if an image was uploaded or a resize applied
//!
//! # Frame cache
//!
//! Used while paused. During playback only when many players show the same
//! source (live cache, see `live_cache_threshold`) or when forced.
//!
//! **Used by**: host integration (window loop, scene node), `main.rs`

use glam::Affine2;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::PlayerSettings;
use crate::convert::raster_to_rgba;
use crate::core::cache_man::{MB, MIN_BUDGET_MB};
use crate::core::event_bus::EventEmitter;
use crate::core::events::{
    AnimationFinishedEvent, AnimationLoadedEvent, FrameChangedEvent, RedrawRequestedEvent,
};
use crate::core::frame_cache::{FrameCache, SourceKey};
use crate::core::mailbox::FrameMailbox;
use crate::core::playhead::{Advance, Playhead};
use crate::core::registry::InstanceRegistry;
use crate::core::resolution::{ResolutionController, desired_size, effective_scale};
use crate::core::worker::{LoadJob, RenderWorker};
use crate::entities::frame::{Image, RasterTarget, Size};
use crate::entities::scene::{SceneEngine, SceneInstance, Segment};
use crate::entities::source::{FileResolver, SourceResolver};
use crate::entities::texture::{MemoryTextures, TextureRing, TextureSink};

/// Intrinsic size stand-in when neither the scene nor the settings give one
const FALLBACK_SIZE: Size = Size::new(512, 512);

/// What one `tick` did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A new image reached the texture ring
    pub uploaded: bool,
    /// The render size changed
    pub resized: bool,
    /// `RedrawRequestedEvent` was emitted
    pub redraw: bool,
}

/// Scoped re-entrancy guard for synchronous renders.
///
/// Holding one marks the player as rendering; the flag is cleared on drop,
/// whatever path leaves the render.
#[derive(Debug)]
pub struct RenderGuard {
    flag: Arc<AtomicBool>,
}

impl RenderGuard {
    /// `None` if a render is already in progress
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Currently loaded source (main-thread scene copy)
struct LoadedSource {
    key: SourceKey,
    scene: SceneInstance,
    markers: HashMap<String, Segment>,
}

pub struct AnimationPlayer {
    engine: Arc<dyn SceneEngine>,
    resolver: Arc<dyn SourceResolver>,
    cache: Arc<FrameCache>,
    registry: Arc<InstanceRegistry>,
    events: EventEmitter,
    sink: Box<dyn TextureSink>,
    settings: PlayerSettings,

    source: Option<LoadedSource>,
    playhead: Playhead,
    resolution: ResolutionController,
    screen_transform: Affine2,
    render_size: Size,

    /// Main-thread raster target (inline and static renders)
    target: RasterTarget,
    /// Presented image
    image: Option<Arc<Image>>,
    ring: TextureRing,

    worker: Option<RenderWorker>,
    mailbox: Arc<FrameMailbox>,
    /// Epoch of the worker's current load
    epoch: u64,
    last_seen_id: u64,
    /// Last (quantized frame, size) handed to the worker
    last_posted: Option<(i32, Size)>,
    /// A cached/static image was shown after the last post; older worker frames are stale
    shown_ahead: bool,
    /// Last (quantized frame, size) drawn on this thread
    last_drawn: Option<(i32, Size)>,
    rendering: Arc<AtomicBool>,
    elapsed: f64,
}

impl std::fmt::Debug for AnimationPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationPlayer")
            .field("engine", &self.engine.name())
            .field("source", &self.source.as_ref().map(|s| s.key.clone()))
            .field("frame", &self.playhead.frame())
            .field("playing", &self.playhead.is_playing())
            .field("render_size", &self.render_size)
            .field("threaded", &self.worker.is_some())
            .finish()
    }
}

impl AnimationPlayer {
    /// Player with its own cache, registry, file resolver and in-memory textures.
    pub fn new(engine: Arc<dyn SceneEngine>, settings: PlayerSettings) -> Self {
        let settings = settings.sanitized();
        let mut resolution = ResolutionController::new();
        resolution.set_threshold(settings.resolution_threshold);
        resolution.set_min_interval(settings.resize_min_interval);
        resolution.set_max_size(settings.max_render_size);

        let mut playhead = Playhead::new();
        playhead.set_looping(settings.looping);
        playhead.set_speed(settings.speed);

        Self {
            engine,
            resolver: Arc::new(FileResolver::new()),
            cache: Arc::new(FrameCache::new(settings.frame_cache_budget_mb * MB)),
            registry: Arc::new(InstanceRegistry::new()),
            events: EventEmitter::dummy(),
            sink: Box::new(MemoryTextures::new()),
            settings,
            source: None,
            playhead,
            resolution,
            screen_transform: Affine2::IDENTITY,
            render_size: Size::ZERO,
            target: RasterTarget::empty(),
            image: None,
            ring: TextureRing::empty(),
            worker: None,
            mailbox: Arc::new(FrameMailbox::new()),
            epoch: 0,
            last_seen_id: 0,
            last_posted: None,
            shown_ahead: false,
            last_drawn: None,
            rendering: Arc::new(AtomicBool::new(false)),
            elapsed: 0.0,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share a frame cache; its budget follows this player's setting
    pub fn with_cache(mut self, cache: Arc<FrameCache>) -> Self {
        cache.set_capacity_bytes(self.settings.frame_cache_budget_mb * MB);
        self.cache = cache;
        self
    }

    pub fn with_registry(mut self, registry: Arc<InstanceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn TextureSink>) -> Self {
        self.sink = sink;
        self
    }

    // ========== Loading ==========

    /// Load an animation by id. An empty id unloads.
    ///
    /// On failure the previous animation (if any) stays loaded and displayed.
    pub fn load(&mut self, id: &str) -> bool {
        if id.trim().is_empty() {
            self.unload();
            return false;
        }

        let resolved = match self.resolver.resolve(id) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to resolve {}: {}", id, e);
                self.events.emit(AnimationLoadedEvent(false));
                return false;
            }
        };
        let fallback = self.fallback_size();
        let scene = match SceneInstance::open(self.engine.as_ref(), &resolved.path, fallback) {
            Ok(scene) => scene,
            Err(e) => {
                warn!("Failed to load animation {}: {}", resolved.path.display(), e);
                self.events.emit(AnimationLoadedEvent(false));
                return false;
            }
        };

        let key: SourceKey = Arc::from(resolved.path.to_string_lossy().as_ref());
        if let Some(old) = self.source.take() {
            self.registry.decrement(&old.key);
        }
        let instances = self.registry.increment(&key);

        self.playhead.reset(scene.total_frames(), scene.duration());
        self.source = Some(LoadedSource {
            key: key.clone(),
            scene,
            markers: resolved.markers,
        });

        // Fresh presentation state
        self.mailbox.invalidate();
        self.last_seen_id = self.mailbox.latest_id();
        self.last_posted = None;
        self.last_drawn = None;
        self.shown_ahead = false;
        self.image = None;
        self.resolution.reset();
        self.render_size = Size::ZERO;
        let size = self.initial_render_size();
        self.apply_resize(size);

        if self.settings.threaded {
            self.ensure_worker();
        }
        if let Some(worker) = &self.worker {
            self.epoch = worker.post_load(LoadJob::Open(resolved.path.clone()));
            let qf = self.quantized_frame();
            worker.post_render(self.render_size, qf as f32);
            self.last_posted = Some((qf, self.render_size));
        }

        self.playhead.set_playing(self.settings.autoplay);
        if !self.playhead.is_playing() {
            // Static usage: show the first frame right away
            self.render_static();
        }

        info!(
            "Loaded {} ({} frames, {:.2}s, {} live instance(s))",
            key,
            self.playhead.total_frames(),
            self.playhead.duration(),
            instances
        );
        self.events.emit(AnimationLoadedEvent(true));
        true
    }

    /// Drop the animation: stop, clear both scene copies and the presented image.
    pub fn unload(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };
        self.registry.decrement(&source.key);
        self.playhead.stop();
        self.playhead.reset(0.0, 0.0);

        if let Some(worker) = &self.worker {
            self.epoch = worker.post_load(LoadJob::Clear);
        }
        self.mailbox.invalidate();
        self.last_seen_id = self.mailbox.latest_id();
        self.last_posted = None;
        self.last_drawn = None;
        self.shown_ahead = false;

        self.ring.release(self.sink.as_mut());
        self.image = None;
        self.target.allocate(Size::ZERO);
        self.render_size = Size::ZERO;
        self.resolution.reset();
        info!("Unloaded {}", source.key);
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Source key of the loaded animation
    pub fn source_key(&self) -> Option<&str> {
        self.source.as_ref().map(|s| &*s.key)
    }

    // ========== Playback ==========

    pub fn set_playing(&mut self, playing: bool) {
        self.playhead.set_playing(playing);
    }

    pub fn play(&mut self) {
        self.set_playing(true);
    }

    /// Stop, keeping position
    pub fn pause(&mut self) {
        self.set_playing(false);
    }

    /// Stop and rewind to the range start
    pub fn stop(&mut self) {
        self.playhead.set_playing(false);
        let begin = self.playhead.range().begin;
        let adv = self.playhead.seek(begin);
        self.emit_advance(adv);
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.is_playing()
    }

    /// Jump to `frame`, clamped into the playback range
    pub fn seek(&mut self, frame: f32) {
        let adv = self.playhead.seek(frame);
        self.emit_advance(adv);
    }

    pub fn frame(&self) -> f32 {
        self.playhead.frame()
    }

    /// Frame used for rendering and cache keys
    pub fn quantized_frame(&self) -> i32 {
        self.playhead.quantized(self.settings.frame_cache_step)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.settings.looping = looping;
        self.playhead.set_looping(looping);
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.playhead.set_speed(speed);
        self.settings.speed = self.playhead.speed();
    }

    pub fn total_frames(&self) -> f32 {
        self.playhead.total_frames()
    }

    /// Seconds
    pub fn duration(&self) -> f32 {
        self.playhead.duration()
    }

    // ========== Segments ==========

    /// Restrict playback to `[begin, end)` frames
    pub fn set_segment(&mut self, begin: f32, end: f32) {
        let total = self.playhead.total_frames();
        let segment = if total > 0.0 {
            Segment::new(begin.min(total - 1.0), end.min(total))
        } else {
            Segment::new(begin, end)
        };
        self.apply_segment(Some(segment));
    }

    /// Play the whole timeline again
    pub fn clear_segment(&mut self) {
        self.apply_segment(None);
    }

    pub fn segment(&self) -> Option<Segment> {
        self.playhead.segment()
    }

    /// Apply a named marker range. Returns false for unknown names.
    pub fn select_marker(&mut self, name: &str) -> bool {
        let segment = self
            .source
            .as_ref()
            .and_then(|s| s.markers.get(name).copied());
        match segment {
            Some(seg) => {
                debug!("Marker '{}' -> [{}, {})", name, seg.begin, seg.end);
                self.apply_segment(Some(seg));
                true
            }
            None => {
                debug!("Unknown marker '{}'", name);
                false
            }
        }
    }

    /// Marker names of the loaded animation, sorted
    pub fn marker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .source
            .as_ref()
            .map(|s| s.markers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn apply_segment(&mut self, segment: Option<Segment>) {
        if let Some(source) = &mut self.source {
            source.scene.set_segment(segment);
        }
        if let Some(worker) = &self.worker {
            worker.post_segment(segment);
        }
        self.playhead.set_segment(segment);
        let adv = self.playhead.seek(self.playhead.frame());
        self.emit_advance(adv);
        self.last_posted = None;
        self.last_drawn = None;
    }

    // ========== Sizing ==========

    /// Host box size in pixels; zero falls back to the scene's intrinsic size
    pub fn set_box_size(&mut self, width: u32, height: u32) {
        self.settings.box_size = Size::new(width, height);
    }

    /// Local-to-screen transform (drives dynamic resolution)
    pub fn set_screen_transform(&mut self, transform: Affine2) {
        self.screen_transform = transform;
    }

    pub fn set_dynamic_resolution_enabled(&mut self, enabled: bool) {
        if self.settings.dynamic_resolution != enabled {
            self.settings.dynamic_resolution = enabled;
            self.resolution.reset();
        }
    }

    /// Relative hysteresis in [0.01, 1.0]
    pub fn set_resolution_threshold(&mut self, threshold: f32) {
        self.resolution.set_threshold(threshold);
        self.settings.resolution_threshold = self.resolution.threshold();
    }

    pub fn set_max_render_size(&mut self, width: u32, height: u32) {
        self.resolution.set_max_size(Size::new(width, height));
        self.settings.max_render_size = self.resolution.max_size();
    }

    pub fn render_size(&self) -> Size {
        self.render_size
    }

    // ========== Frame cache ==========

    pub fn set_frame_cache_enabled(&mut self, enabled: bool) {
        self.settings.frame_cache_enabled = enabled;
    }

    /// Budget in MB (minimum 16)
    pub fn set_frame_cache_budget_mb(&mut self, mb: usize) {
        self.settings.frame_cache_budget_mb = mb.max(MIN_BUDGET_MB);
        self.cache.set_capacity_bytes(self.settings.frame_cache_budget_mb * MB);
    }

    /// Quantization step in frames (minimum 1)
    pub fn set_frame_cache_step(&mut self, step: u32) {
        self.settings.frame_cache_step = step.max(1);
    }

    /// Live instances of one source needed to cache during playback (minimum 1)
    pub fn set_live_cache_threshold(&mut self, threshold: usize) {
        self.settings.live_cache_threshold = threshold.max(1);
    }

    pub fn set_live_cache_force(&mut self, force: bool) {
        self.settings.live_cache_force = force;
    }

    /// Cache usable during playback right now
    pub fn live_cache_active(&self) -> bool {
        if !self.settings.frame_cache_enabled {
            return false;
        }
        if self.settings.live_cache_force {
            return true;
        }
        self.source
            .as_ref()
            .map(|s| self.registry.count(&s.key) >= self.settings.live_cache_threshold)
            .unwrap_or(false)
    }

    fn cache_allowed(&self) -> bool {
        self.settings.frame_cache_enabled
            && self.source.is_some()
            && (!self.playhead.is_playing() || self.live_cache_active())
    }

    fn cache_lookup(&self, qf: i32, size: Size) -> Option<Arc<Image>> {
        if !self.cache_allowed() {
            return None;
        }
        let source = self.source.as_ref()?;
        self.cache.get(&source.key, qf, size)
    }

    fn cache_store(&self, qf: i32, image: &Arc<Image>) {
        if !self.cache_allowed() {
            return;
        }
        if let Some(source) = &self.source {
            self.cache
                .put(&source.key, qf, image.size(), Arc::clone(image), image.mem());
        }
    }

    pub fn frame_cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    // ========== Threading ==========

    /// Switch between worker-thread and inline rendering
    pub fn set_threaded(&mut self, threaded: bool) {
        self.settings.threaded = threaded;
        if threaded {
            if self.worker.is_none() {
                self.ensure_worker();
                self.resync_worker();
            }
        } else if let Some(worker) = self.worker.take() {
            drop(worker);
            self.mailbox.invalidate();
            self.last_seen_id = self.mailbox.latest_id();
            self.last_posted = None;
            self.last_drawn = None;
        }
    }

    pub fn is_threaded(&self) -> bool {
        self.worker.is_some()
    }

    fn ensure_worker(&mut self) {
        if self.worker.is_some() {
            return;
        }
        match RenderWorker::spawn(
            Arc::clone(&self.engine),
            Arc::clone(&self.mailbox),
            self.settings.post_process,
            self.fallback_size(),
        ) {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                warn!("Render worker unavailable, rendering inline: {}", e);
                self.settings.threaded = false;
            }
        }
    }

    /// Bring a fresh worker up to date with the loaded scene
    fn resync_worker(&mut self) {
        let (Some(worker), Some(source)) = (&self.worker, &self.source) else {
            return;
        };
        self.epoch = worker.post_load(LoadJob::Open(source.scene.path().to_path_buf()));
        worker.post_segment(source.scene.segment());
        self.last_posted = None;
    }

    // ========== Presentation ==========

    /// Currently presented image
    pub fn current_image(&self) -> Option<Arc<Image>> {
        self.image.clone()
    }

    /// Seconds of ticks accumulated so far
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Render the current frame now on this thread (e.g. while idle).
    ///
    /// Returns false when nothing could be drawn or a render is in progress.
    pub fn render_static(&mut self) -> bool {
        let Some(_guard) = RenderGuard::try_acquire(&self.rendering) else {
            trace!("render_static re-entered, skipped");
            return false;
        };
        let qf = self.quantized_frame();
        let drawn = self.render_now(qf);
        if drawn {
            if self.worker.is_some() {
                self.shown_ahead = true;
                self.last_posted = Some((qf, self.render_size));
            }
            self.events.emit(RedrawRequestedEvent);
        }
        drawn
    }

    /// Advance by `delta` seconds and refresh the presented image.
    pub fn tick(&mut self, delta: f32) -> TickReport {
        let mut report = TickReport::default();
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };
        self.elapsed += delta as f64;
        if self.source.is_none() {
            return report;
        }

        let adv = self.playhead.advance(delta);
        self.emit_advance(adv);

        if let Some(size) = self.due_resize() {
            self.apply_resize(size);
            report.resized = true;
        }

        report.uploaded = if self.worker.is_some() {
            self.update_threaded()
        } else {
            self.update_inline()
        };

        if report.uploaded || report.resized {
            report.redraw = true;
            self.events.emit(RedrawRequestedEvent);
        }
        report
    }

    fn emit_advance(&self, adv: Advance) {
        if let Some(frame) = adv.frame_changed {
            self.events.emit(FrameChangedEvent(frame));
        }
        if adv.finished {
            self.events.emit(AnimationFinishedEvent);
        }
    }

    fn fallback_size(&self) -> Size {
        if self.settings.box_size.is_empty() {
            FALLBACK_SIZE
        } else {
            self.settings.box_size
        }
    }

    /// Box size in effect: host setting, else the scene's own size
    fn box_size(&self) -> Size {
        if !self.settings.box_size.is_empty() {
            return self.settings.box_size;
        }
        self.source
            .as_ref()
            .map(|s| s.scene.base_size())
            .unwrap_or(FALLBACK_SIZE)
    }

    fn static_size(&self) -> Size {
        self.box_size().min(self.resolution.max_size())
    }

    fn initial_render_size(&self) -> Size {
        if self.settings.dynamic_resolution {
            let size = desired_size(
                self.box_size(),
                effective_scale(self.screen_transform),
                self.resolution.max_size(),
            );
            if !size.is_empty() {
                return size;
            }
        }
        self.static_size()
    }

    fn due_resize(&mut self) -> Option<Size> {
        if self.settings.dynamic_resolution {
            let scale = effective_scale(self.screen_transform);
            let box_size = self.box_size();
            self.resolution.evaluate(box_size, scale, self.render_size);
            self.resolution.poll(self.elapsed)
        } else {
            let want = self.static_size();
            (want != self.render_size && !want.is_empty()).then_some(want)
        }
    }

    /// Reallocate the main target, refit, and rebuild presentation textures.
    ///
    /// The previous image is rescaled as a placeholder until the new frame lands.
    fn apply_resize(&mut self, size: Size) {
        let size = size.min(self.resolution.max_size());
        if size.is_empty() || size == self.render_size {
            return;
        }
        debug!("Render size {} -> {}", self.render_size, size);

        self.target.allocate(size);
        if let Some(source) = &mut self.source {
            source.scene.fit_to(size);
        }

        let placeholder = match &self.image {
            Some(image) => image.resized(size),
            None => Image::transparent(size),
        };
        self.ring.release(self.sink.as_mut());
        self.ring = TextureRing::new(self.sink.as_mut(), size, self.settings.texture_ring_size);
        self.ring.present(self.sink.as_mut(), &placeholder);
        self.image = Some(Arc::new(placeholder));

        self.render_size = size;
        self.last_posted = None;
        self.last_drawn = None;
    }

    fn present(&mut self, image: Arc<Image>) {
        self.ring.present(self.sink.as_mut(), &image);
        self.image = Some(image);
    }

    fn update_threaded(&mut self) -> bool {
        let mut uploaded = false;
        let size = self.render_size;

        if !size.is_empty() {
            let qf = self.quantized_frame();
            if self.last_posted != Some((qf, size)) {
                self.last_posted = Some((qf, size));
                if let Some(image) = self.cache_lookup(qf, size) {
                    trace!("Frame {} from cache", qf);
                    self.present(image);
                    self.shown_ahead = true;
                    uploaded = true;
                } else if let Some(worker) = &self.worker {
                    worker.post_render(size, qf as f32);
                    self.shown_ahead = false;
                }
            }
        }

        if let Some(frame) = self.mailbox.take_newer(self.last_seen_id) {
            self.last_seen_id = frame.id;
            let fq = frame.frame.round() as i32;
            if frame.epoch != self.epoch {
                trace!("Frame #{} from replaced scene dropped", frame.id);
            } else if frame.size != self.render_size {
                debug!("Stale frame #{} dropped ({} != {})", frame.id, frame.size, self.render_size);
            } else if let Some(image) = Image::from_rgba(frame.pixels, frame.size) {
                let image = Arc::new(image);
                self.cache_store(fq, &image);
                let wanted = self.last_posted.map(|(q, _)| q);
                if self.shown_ahead && wanted != Some(fq) {
                    trace!("Frame #{} behind presented image, not shown", frame.id);
                } else {
                    self.present(image);
                    uploaded = true;
                }
            }
        }
        uploaded
    }

    fn update_inline(&mut self) -> bool {
        let size = self.render_size;
        if size.is_empty() {
            return false;
        }
        let qf = self.quantized_frame();
        if self.last_drawn == Some((qf, size)) {
            return false;
        }
        let Some(_guard) = RenderGuard::try_acquire(&self.rendering) else {
            trace!("Inline render re-entered, skipped");
            return false;
        };
        self.render_now(qf)
    }

    /// Cache, else draw the main scene copy into the main target.
    fn render_now(&mut self, qf: i32) -> bool {
        let size = self.render_size;
        if size.is_empty() {
            return false;
        }
        if let Some(image) = self.cache_lookup(qf, size) {
            self.present(image);
            self.last_drawn = Some((qf, size));
            return true;
        }

        let Some(source) = &mut self.source else {
            return false;
        };
        if self.target.size() != size {
            self.target.allocate(size);
        }
        if !source.scene.render(qf as f32, &mut self.target) {
            return false;
        }
        let rgba = raster_to_rgba(self.target.pixels(), size, self.settings.post_process);
        let Some(image) = Image::from_rgba(rgba, size) else {
            return false;
        };
        let image = Arc::new(image);
        self.cache_store(qf, &image);
        self.present(image);
        self.last_drawn = Some((qf, size));
        trace!("Frame {} drawn inline @ {}", qf, size);
        true
    }
}

impl Drop for AnimationPlayer {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            self.registry.decrement(&source.key);
        }
        // Worker joins in its own Drop
        self.worker = None;
        self.ring.release(self.sink.as_mut());
    }
}
