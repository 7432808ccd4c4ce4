//! Playback position and time advance
//!
//! Frames advance at `total_frames / duration` per second scaled by `speed`.
//! The playback range is the active segment or the whole timeline
//! `[0, total_frames)`. At the end of the range a looping playhead wraps;
//! otherwise it parks on the last frame, stops and reports `finished` once.

use log::{debug, trace};

use crate::entities::scene::Segment;

/// What happened during one `advance()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Advance {
    /// New integer frame, when it changed
    pub frame_changed: Option<i32>,
    /// Non-looping playback hit the end of the range
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct Playhead {
    frame: f32,
    playing: bool,
    looping: bool,
    speed: f32,
    total_frames: f32,
    duration: f32,
    segment: Option<Segment>,
    /// Integer frame last reported
    last_int: i32,
    finished: bool,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            frame: 0.0,
            playing: false,
            looping: true,
            speed: 1.0,
            total_frames: 0.0,
            duration: 0.0,
            segment: None,
            last_int: 0,
            finished: false,
        }
    }
}

impl Playhead {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a new timeline: rewinds, clears segment, keeps play/loop/speed.
    pub fn reset(&mut self, total_frames: f32, duration: f32) {
        self.total_frames = total_frames.max(0.0);
        self.duration = duration.max(0.0);
        self.segment = None;
        self.frame = 0.0;
        self.last_int = 0;
        self.finished = false;
    }

    pub fn frame(&self) -> f32 {
        self.frame
    }

    /// Integer part of the current frame
    pub fn frame_index(&self) -> i32 {
        self.frame.floor() as i32
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn speed(&self) -> f32 {
        self.speed
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

    /// Active playback range
    pub fn range(&self) -> Segment {
        self.segment.unwrap_or(Segment {
            begin: 0.0,
            end: self.total_frames.max(1.0),
        })
    }

    /// Frames per second of timeline at speed 1
    pub fn frame_rate(&self) -> f32 {
        if self.duration > 0.0 {
            self.total_frames / self.duration
        } else {
            0.0
        }
    }

    /// Start or stop. Starting a finished non-looping run rewinds first.
    pub fn set_playing(&mut self, playing: bool) {
        if playing && !self.playing && self.finished {
            self.frame = self.range().begin;
        }
        if playing {
            self.finished = false;
        }
        self.playing = playing;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Negative and non-finite speeds become 0
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
    }

    /// Restrict the range; the current frame is pulled inside it.
    pub fn set_segment(&mut self, segment: Option<Segment>) {
        self.segment = segment;
        self.frame = self.range().clamp(self.frame);
        self.finished = false;
    }

    /// Stop and rewind to the range start
    pub fn stop(&mut self) {
        self.playing = false;
        self.finished = false;
        self.frame = self.range().begin;
    }

    /// Jump to `frame` (clamped into the range)
    pub fn seek(&mut self, frame: f32) -> Advance {
        self.frame = self.range().clamp(frame);
        self.finished = false;
        Advance {
            frame_changed: self.take_frame_change(),
            finished: false,
        }
    }

    /// Advance by `delta` seconds of wall time
    pub fn advance(&mut self, delta: f32) -> Advance {
        let mut out = Advance::default();
        if !self.playing || self.total_frames <= 0.0 || self.duration <= 0.0 || delta <= 0.0 {
            return out;
        }

        let range = self.range();
        let mut frame = self.frame + delta * self.speed * self.frame_rate();
        if frame < range.begin {
            frame = range.begin;
        }
        if frame >= range.end {
            if self.looping {
                frame = range.begin + (frame - range.begin) % range.len();
                trace!("Playhead wrapped to {:.2}", frame);
            } else {
                frame = range.last();
                self.playing = false;
                if !self.finished {
                    self.finished = true;
                    out.finished = true;
                    debug!("Playback finished at {}", frame);
                }
            }
        }
        self.frame = frame;
        out.frame_changed = self.take_frame_change();
        out
    }

    /// `round(frame)` snapped down to a multiple of `step`
    pub fn quantized(&self, step: u32) -> i32 {
        let step = step.max(1) as i32;
        let f = self.frame.round() as i32;
        f.div_euclid(step) * step
    }

    fn take_frame_change(&mut self) -> Option<i32> {
        let current = self.frame_index();
        if current != self.last_int {
            self.last_int = current;
            Some(current)
        } else {
            None
        }
    }
}
