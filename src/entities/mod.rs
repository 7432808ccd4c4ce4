//! Entities - data types shared by the player core
//!
//! - `frame`: sizes, raster targets, presentation images
//! - `scene`: vector engine boundary (traits) and per-thread scene instances
//! - `source`: animation id -> scene file + named segments
//! - `texture`: presentation texture sink and ring
//! - `solid`: reference headless engine

pub mod frame;
pub mod scene;
pub mod solid;
pub mod source;
pub mod texture;

pub use frame::{Image, RasterTarget, Size};
pub use scene::{LoadError, SceneEngine, SceneInstance, Segment, VectorScene, fit_transform};
pub use solid::SolidEngine;
pub use source::{FileResolver, LottieHeader, ResolvedSource, SourceResolver};
pub use texture::{MemoryTextures, TextureHandle, TextureRing, TextureSink};
