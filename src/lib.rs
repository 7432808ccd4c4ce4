//! LOTTA - vector animation runtime
//!
//! Re-exports all modules for use by binary targets and hosts.

// Core runtime (cache, events, worker, scheduler)
pub mod core;

pub mod cli;
pub mod config;
pub mod convert;
pub mod entities;

// Re-export commonly used types from core
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::frame_cache::FrameCache;
pub use core::player::{AnimationPlayer, TickReport};

// Re-export entities
pub use entities::{Image, SceneEngine, Size, SolidEngine, VectorScene};
