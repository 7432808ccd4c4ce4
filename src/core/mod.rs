//! Core runtime modules - cache, events, worker, scheduler
//!
//! These modules form the playback engine, independent of any host UI.

pub mod cache_man;
pub mod event_bus;
pub mod events;
pub mod frame_cache;
pub mod mailbox;
pub mod player;
pub mod playhead;
pub mod registry;
pub mod resolution;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_engine;

// Re-exports for convenience
pub use cache_man::CacheManager;
pub use event_bus::{EventBus, EventEmitter};
pub use frame_cache::{CacheStats, FrameCache, SourceKey};
pub use mailbox::{FinishedFrame, FrameMailbox};
pub use player::{AnimationPlayer, RenderGuard, TickReport};
pub use playhead::Playhead;
pub use registry::InstanceRegistry;
pub use resolution::{ResizeDecision, ResolutionController};
pub use worker::{LoadJob, RenderWorker, WorkerPhase};
