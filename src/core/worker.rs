//! Background rasterization worker
//!
//! One thread per player. It owns a private scene instance and raster target
//! and talks to the presenter through two locks only:
//!
//! - job lock + condvar: pending `{stop, load, segment, render}`, latest of
//!   each kind wins, a render never displaces a pending load or segment
//! - the [`FrameMailbox`]: converted RGBA frames out
//!
//! Neither lock is held while drawing or converting. Within one wake-up the
//! worker applies load, then segment, then render; stop wins over all of
//! them. No mid-render cancellation: a newer request is picked up after the
//! current draw.
//!
//! Every load gets an epoch number; published frames carry the epoch of the
//! scene that drew them so the presenter can drop frames of a replaced scene.
//!
//! Shutdown (in `Drop`): stop flag under the job lock, notify, join, then
//! free the thread's scene and buffers (the thread hands them back on exit).

use log::{debug, trace, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::convert::{PostProcess, argb_to_rgba};
use crate::core::mailbox::{FinishedFrame, FrameMailbox};
use crate::entities::frame::{RasterTarget, Size};
use crate::entities::scene::{SceneEngine, SceneInstance, Segment};

/// Thread name counter
static WORKER_SEQ: AtomicUsize = AtomicUsize::new(0);

/// What to do with the worker's scene
#[derive(Debug, Clone, PartialEq)]
pub enum LoadJob {
    /// Drop the scene; renders become no-ops
    Clear,
    /// Replace the scene with a fresh one loaded from this path
    Open(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub size: Size,
    pub frame: f32,
}

#[derive(Debug, Default)]
struct PendingJobs {
    stop: bool,
    /// Job and its epoch
    load: Option<(LoadJob, u64)>,
    /// Outer `Some` = a segment change is pending
    segment: Option<Option<Segment>>,
    render: Option<RenderJob>,
}

impl PendingJobs {
    fn has_work(&self) -> bool {
        self.stop || self.load.is_some() || self.segment.is_some() || self.render.is_some()
    }
}

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    /// No scene
    Idle = 0,
    /// Scene loaded, waiting
    Loaded = 1,
    Rendering = 2,
    /// Terminal
    Stopped = 3,
}

impl WorkerPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerPhase::Loaded,
            2 => WorkerPhase::Rendering,
            3 => WorkerPhase::Stopped,
            _ => WorkerPhase::Idle,
        }
    }
}

struct Shared {
    jobs: Mutex<PendingJobs>,
    wake: Condvar,
    phase: AtomicU8,
    /// Last epoch handed out by `post_load`
    epoch: AtomicU64,
}

impl Shared {
    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

/// Thread-private resources, returned to the owner on exit
struct WorkerState {
    engine: Arc<dyn SceneEngine>,
    scene: Option<SceneInstance>,
    target: RasterTarget,
    mailbox: Arc<FrameMailbox>,
    post: PostProcess,
    fallback: Size,
    epoch: u64,
}

impl WorkerState {
    fn apply_load(&mut self, job: LoadJob, epoch: u64, shared: &Shared) {
        self.scene = None;
        self.epoch = epoch;
        match job {
            LoadJob::Clear => {
                debug!("Worker: scene cleared");
            }
            LoadJob::Open(path) => match SceneInstance::open(self.engine.as_ref(), &path, self.fallback) {
                Ok(scene) => {
                    debug!("Worker: loaded {}", path.display());
                    self.scene = Some(scene);
                }
                Err(e) => warn!("Worker: failed to load {}: {}", path.display(), e),
            },
        }
        // New scene needs a fresh fit
        self.target.allocate(Size::ZERO);
        shared.set_phase(self.idle_phase());
    }

    fn apply_segment(&mut self, segment: Option<Segment>) {
        match &mut self.scene {
            Some(scene) => scene.set_segment(segment),
            None => trace!("Worker: segment ignored, no scene"),
        }
    }

    fn apply_render(&mut self, job: RenderJob, shared: &Shared) {
        if job.size.is_empty() {
            trace!("Worker: zero-area render skipped");
            return;
        }
        let Some(scene) = &mut self.scene else {
            trace!("Worker: render skipped, no scene");
            return;
        };
        shared.set_phase(WorkerPhase::Rendering);

        if self.target.size() != job.size {
            self.target.allocate(job.size);
        }
        if scene.render(job.frame, &mut self.target) {
            let mut rgba = vec![0u8; job.size.rgba_bytes()];
            argb_to_rgba(self.target.pixels(), &mut rgba);
            self.post.apply(&mut rgba, job.size);
            let id = self
                .mailbox
                .publish(FinishedFrame::new(rgba, job.size, job.frame, self.epoch));
            trace!("Worker: frame {:.2} @ {} -> #{}", job.frame, job.size, id);
        }

        shared.set_phase(self.idle_phase());
    }

    fn idle_phase(&self) -> WorkerPhase {
        if self.scene.is_some() {
            WorkerPhase::Loaded
        } else {
            WorkerPhase::Idle
        }
    }
}

/// Handle to the rasterization thread. Dropping it stops and joins the thread.
pub struct RenderWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<WorkerState>>,
    name: String,
}

impl std::fmt::Debug for RenderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorker")
            .field("name", &self.name)
            .field("phase", &self.phase())
            .finish()
    }
}

impl RenderWorker {
    /// Spawn the worker thread.
    ///
    /// `fallback` replaces an unknown intrinsic scene size.
    pub fn spawn(
        engine: Arc<dyn SceneEngine>,
        mailbox: Arc<FrameMailbox>,
        post: PostProcess,
        fallback: Size,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            jobs: Mutex::new(PendingJobs::default()),
            wake: Condvar::new(),
            phase: AtomicU8::new(WorkerPhase::Idle as u8),
            epoch: AtomicU64::new(0),
        });
        let mut state = WorkerState {
            engine,
            scene: None,
            target: RasterTarget::empty(),
            mailbox,
            post,
            fallback,
            epoch: 0,
        };

        let name = format!("lotta-render-{}", WORKER_SEQ.fetch_add(1, Ordering::Relaxed));
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let shared = thread_shared;
            trace!("{} started", thread::current().name().unwrap_or("worker"));
            loop {
                let jobs = {
                    let mut jobs = shared.jobs.lock().unwrap_or_else(|e| e.into_inner());
                    while !jobs.has_work() {
                        jobs = shared.wake.wait(jobs).unwrap_or_else(|e| e.into_inner());
                    }
                    if jobs.stop {
                        break;
                    }
                    std::mem::take(&mut *jobs)
                };

                if let Some((load, epoch)) = jobs.load {
                    state.apply_load(load, epoch, &shared);
                }
                if let Some(segment) = jobs.segment {
                    state.apply_segment(segment);
                }
                if let Some(render) = jobs.render {
                    state.apply_render(render, &shared);
                }
            }
            shared.set_phase(WorkerPhase::Stopped);
            trace!("{} stopped", thread::current().name().unwrap_or("worker"));
            state
        })?;

        debug!("Render worker spawned: {}", name);
        Ok(Self {
            shared,
            handle: Some(handle),
            name,
        })
    }

    fn post(&self, f: impl FnOnce(&mut PendingJobs)) {
        let mut jobs = self.shared.jobs.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut jobs);
        self.shared.wake.notify_one();
    }

    /// Replace any pending load. Returns the epoch frames of this load will carry.
    pub fn post_load(&self, job: LoadJob) -> u64 {
        let mut epoch = 0;
        self.post(|jobs| {
            epoch = self.shared.epoch.fetch_add(1, Ordering::Relaxed) + 1;
            jobs.load = Some((job, epoch));
        });
        epoch
    }

    /// Replace any pending segment change (`None` = whole timeline)
    pub fn post_segment(&self, segment: Option<Segment>) {
        self.post(|jobs| jobs.segment = Some(segment));
    }

    /// Replace any pending render
    pub fn post_render(&self, size: Size, frame: f32) {
        self.post(|jobs| jobs.render = Some(RenderJob { size, frame }));
    }

    pub fn phase(&self) -> WorkerPhase {
        WorkerPhase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.post(|jobs| jobs.stop = true);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(state) => drop(state),
                Err(_) => warn!("{} panicked", self.name),
            }
        }
        trace!("{} joined", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_engine::{FakeEngine, frame_of, wait_until};
    use std::time::Duration;

    const SIZE: Size = Size::new(16, 16);

    fn spawn(engine: &FakeEngine) -> (RenderWorker, Arc<FrameMailbox>) {
        let mailbox = Arc::new(FrameMailbox::new());
        let worker = RenderWorker::spawn(
            Arc::new(engine.clone()),
            Arc::clone(&mailbox),
            PostProcess::default(),
            Size::new(64, 64),
        )
        .unwrap();
        (worker, mailbox)
    }

    #[test]
    fn test_pending_jobs_latest_wins() {
        let mut jobs = PendingJobs::default();
        assert!(!jobs.has_work());
        jobs.render = Some(RenderJob { size: SIZE, frame: 1.0 });
        jobs.load = Some((LoadJob::Clear, 1));
        jobs.render = Some(RenderJob { size: SIZE, frame: 2.0 });
        assert!(jobs.has_work());
        let taken = std::mem::take(&mut jobs);
        assert_eq!(taken.render.map(|r| r.frame), Some(2.0));
        assert_eq!(taken.load, Some((LoadJob::Clear, 1)));
        assert!(!jobs.has_work());
    }

    #[test]
    fn test_load_and_render_publishes() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, mailbox) = spawn(&engine);

        let epoch = worker.post_load(LoadJob::Open("anim.json".into()));
        worker.post_render(SIZE, 7.0);
        assert!(wait_until(Duration::from_secs(5), || mailbox.is_ready()));

        let frame = mailbox.take_newer(0).unwrap();
        assert_eq!(frame.epoch, epoch);
        assert_eq!(frame.size, SIZE);
        assert_eq!(frame.pixels.len(), SIZE.rgba_bytes());
        assert_eq!(frame_of(&frame.pixels), 7);
        assert_eq!(worker.phase(), WorkerPhase::Loaded);
    }

    #[test]
    fn test_segment_applies_after_load_in_same_wake() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, mailbox) = spawn(&engine);

        worker.post_load(LoadJob::Open("anim.json".into()));
        worker.post_segment(Some(Segment::new(10.0, 40.0)));
        worker.post_render(SIZE, 5.0);
        assert!(wait_until(Duration::from_secs(5), || mailbox.is_ready()));
        assert_eq!(frame_of(&mailbox.take_newer(0).unwrap().pixels), 10);

        worker.post_render(SIZE, 40.0);
        assert!(wait_until(Duration::from_secs(5), || mailbox.is_ready()));
        assert_eq!(frame_of(&mailbox.take_newer(1).unwrap().pixels), 39);
    }

    #[test]
    fn test_survives_failed_load() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, mailbox) = spawn(&engine);

        worker.post_load(LoadJob::Open("bad.json".into()));
        worker.post_render(SIZE, 3.0);
        assert!(wait_until(Duration::from_secs(5), || engine.loads() == 1));
        // give the render a chance to (not) happen
        std::thread::sleep(Duration::from_millis(30));
        assert!(!mailbox.is_ready());
        assert_eq!(worker.phase(), WorkerPhase::Idle);

        worker.post_load(LoadJob::Open("good.json".into()));
        worker.post_render(SIZE, 3.0);
        assert!(wait_until(Duration::from_secs(5), || mailbox.is_ready()));
        assert_eq!(frame_of(&mailbox.take_newer(0).unwrap().pixels), 3);
    }

    #[test]
    fn test_zero_area_render_is_noop() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, mailbox) = spawn(&engine);
        worker.post_load(LoadJob::Open("anim.json".into()));
        worker.post_render(Size::new(0, 16), 1.0);
        assert!(wait_until(Duration::from_secs(5), || worker.phase() == WorkerPhase::Loaded));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(mailbox.latest_id(), 0);
    }

    #[test]
    fn test_drop_joins_then_frees_scene() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, mailbox) = spawn(&engine);
        worker.post_load(LoadJob::Open("anim.json".into()));
        worker.post_render(SIZE, 0.0);
        assert!(wait_until(Duration::from_secs(5), || mailbox.is_ready()));
        assert_eq!(engine.live_scenes(), 1);

        drop(worker);
        assert_eq!(engine.live_scenes(), 0);
    }

    #[test]
    fn test_clear_drops_scene() {
        let engine = FakeEngine::new(100.0, 2.0);
        let (worker, _mailbox) = spawn(&engine);
        worker.post_load(LoadJob::Open("anim.json".into()));
        assert!(wait_until(Duration::from_secs(5), || worker.phase() == WorkerPhase::Loaded));
        worker.post_load(LoadJob::Clear);
        assert!(wait_until(Duration::from_secs(5), || worker.phase() == WorkerPhase::Idle));
        assert_eq!(engine.live_scenes(), 0);
    }
}
