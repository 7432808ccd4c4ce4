//! Player notifications.

// === Playback ===

/// Non-looping playback reached the end of its range (once per run)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimationFinishedEvent;

/// Integer frame changed (carries the new frame)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameChangedEvent(pub i32);

// === Loading ===

/// Load finished; false on failure (previous state kept)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimationLoadedEvent(pub bool);

// === Presentation ===

/// A new image was uploaded or the render size changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedrawRequestedEvent;
