//! Dynamic render resolution
//!
//! Picks the internal raster size from the on-screen size of the box:
//! `ceil(box * scale)`, rounded up to a 16 px grid, clamped to a maximum.
//! Two brakes keep it from thrashing during zoom or drag:
//!
//! - hysteresis: a new size only becomes pending when it differs from the
//!   current one by more than `threshold` (relative, either axis)
//! - rate limit: a pending size is handed out at most once per `min_interval`
//!   seconds; until then it stays pending and is retried on the next poll

use glam::Affine2;
use log::{debug, trace};

use crate::entities::frame::Size;

/// Size quantum in pixels
pub const GRID: u32 = 16;
pub const DEFAULT_THRESHOLD: f32 = 0.15;
/// Seconds between applied resizes
pub const DEFAULT_MIN_INTERVAL: f64 = 0.10;
pub const DEFAULT_MAX_SIZE: Size = Size::new(4096, 4096);

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    /// Desired size equals the current one
    Unchanged,
    /// Desired size has zero area (box or scale collapsed); nothing to do
    Ignored,
    /// Changed, but within the hysteresis band
    BelowThreshold,
    /// Resize to this size is now pending
    Pending(Size),
}

/// Uniform on-screen scale of a local-to-screen transform
pub fn effective_scale(transform: Affine2) -> f32 {
    let sx = transform.matrix2.x_axis.length();
    let sy = transform.matrix2.y_axis.length();
    sx.max(sy)
}

fn round_up_to_grid(v: u32) -> u32 {
    v.saturating_add(GRID - 1) & !(GRID - 1)
}

/// `ceil(box * scale)` per axis, grid-aligned and clamped to `max`
pub fn desired_size(box_size: Size, scale: f32, max: Size) -> Size {
    if !scale.is_finite() || scale <= 0.0 {
        return Size::ZERO;
    }
    let axis = |v: u32| round_up_to_grid((v as f32 * scale).ceil().min(u32::MAX as f32) as u32);
    Size::new(axis(box_size.width), axis(box_size.height)).min(max)
}

#[derive(Debug, Clone)]
pub struct ResolutionController {
    threshold: f32,
    min_interval: f64,
    max_size: Size,
    pending: Option<Size>,
    /// Time of the last applied resize
    last_applied: Option<f64>,
}

impl Default for ResolutionController {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_size: DEFAULT_MAX_SIZE,
            pending: None,
            last_applied: None,
        }
    }
}

impl ResolutionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Relative hysteresis, clamped to [0.01, 1.0]
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = if threshold.is_nan() {
            DEFAULT_THRESHOLD
        } else {
            threshold.clamp(0.01, 1.0)
        };
    }

    pub fn min_interval(&self) -> f64 {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, seconds: f64) {
        self.min_interval = seconds.max(0.0);
    }

    pub fn max_size(&self) -> Size {
        self.max_size
    }

    /// Upper bound for render sizes (at least one grid cell per axis)
    pub fn set_max_size(&mut self, max: Size) {
        self.max_size = Size::new(max.width.max(GRID), max.height.max(GRID));
    }

    pub fn pending(&self) -> Option<Size> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop any pending resize and forget the rate-limit history
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_applied = None;
    }

    /// Compare the desired size against `current` and update the pending state.
    pub fn evaluate(&mut self, box_size: Size, scale: f32, current: Size) -> ResizeDecision {
        let desired = desired_size(box_size, scale, self.max_size);
        if desired.is_empty() {
            return ResizeDecision::Ignored;
        }
        if desired == current {
            self.pending = None;
            return ResizeDecision::Unchanged;
        }

        let rel = |d: u32, c: u32| (d as f32 - c as f32).abs() / (c.max(1) as f32);
        let dx = rel(desired.width, current.width);
        let dy = rel(desired.height, current.height);
        // A target above the maximum is always shrunk, whatever the delta
        let over_max = current.width > self.max_size.width || current.height > self.max_size.height;
        if over_max || dx > self.threshold || dy > self.threshold {
            if self.pending != Some(desired) {
                debug!(
                    "Resize pending: {} -> {} (dx={:.3}, dy={:.3})",
                    current, desired, dx, dy
                );
            }
            self.pending = Some(desired);
            ResizeDecision::Pending(desired)
        } else {
            trace!("Resize below threshold: {} -> {}", current, desired);
            self.pending = None;
            ResizeDecision::BelowThreshold
        }
    }

    /// Hand out the pending size if the rate limit allows, marking it applied.
    pub fn poll(&mut self, now: f64) -> Option<Size> {
        let size = self.pending?;
        if let Some(last) = self.last_applied
            && now - last < self.min_interval
        {
            trace!("Resize deferred: {:.3}s since last", now - last);
            return None;
        }
        self.pending = None;
        self.last_applied = Some(now);
        Some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    const BOX: Size = Size::new(512, 512);

    #[test]
    fn test_desired_on_grid() {
        let d = desired_size(BOX, 1.0, DEFAULT_MAX_SIZE);
        assert_eq!(d, Size::new(512, 512));
        assert_eq!(d.width % GRID, 0);

        let d = desired_size(Size::new(500, 301), 1.0, DEFAULT_MAX_SIZE);
        assert_eq!(d, Size::new(512, 304));

        // max is applied after rounding
        assert_eq!(desired_size(BOX, 4.0, Size::new(1000, 1000)), Size::new(1000, 1000));
        assert_eq!(desired_size(BOX, 0.0, DEFAULT_MAX_SIZE), Size::ZERO);
        assert_eq!(desired_size(BOX, f32::NAN, DEFAULT_MAX_SIZE), Size::ZERO);
    }

    #[test]
    fn test_scale_one_is_unchanged() {
        let mut rc = ResolutionController::new();
        assert_eq!(rc.evaluate(BOX, 1.0, BOX), ResizeDecision::Unchanged);
        assert!(!rc.is_pending());
    }

    #[test]
    fn test_large_shrink_is_pending() {
        let mut rc = ResolutionController::new();
        // 512 * 0.3 = 153.6 -> 154 -> 160; delta = 352/512
        assert_eq!(rc.evaluate(BOX, 0.3, BOX), ResizeDecision::Pending(Size::new(160, 160)));
        assert!(rc.is_pending());
    }

    #[test]
    fn test_small_change_below_threshold() {
        let mut rc = ResolutionController::new();
        // 512 * 1.1 = 563.2 -> 576; delta = 64/512 = 0.125
        assert_eq!(rc.evaluate(BOX, 1.1, BOX), ResizeDecision::BelowThreshold);
        assert!(!rc.is_pending());

        // tighter threshold lets it through
        rc.set_threshold(0.1);
        assert_eq!(rc.evaluate(BOX, 1.1, BOX), ResizeDecision::Pending(Size::new(576, 576)));
    }

    #[test]
    fn test_first_size_always_pending() {
        let mut rc = ResolutionController::new();
        assert_eq!(rc.evaluate(BOX, 1.0, Size::ZERO), ResizeDecision::Pending(BOX));
        assert_eq!(rc.evaluate(Size::ZERO, 1.0, BOX), ResizeDecision::Ignored);
    }

    #[test]
    fn test_rate_limit() {
        let mut rc = ResolutionController::new();

        rc.evaluate(BOX, 0.5, BOX);
        assert_eq!(rc.poll(1.0), Some(Size::new(256, 256)));

        // second trigger 50 ms later stays pending
        rc.evaluate(BOX, 2.0, Size::new(256, 256));
        assert_eq!(rc.poll(1.05), None);
        assert!(rc.is_pending());
        assert_eq!(rc.poll(1.099), None);
        assert_eq!(rc.poll(1.10), Some(Size::new(1024, 1024)));
        assert!(!rc.is_pending());
        assert_eq!(rc.poll(5.0), None);
    }

    #[test]
    fn test_lowered_max_forces_resize() {
        let mut rc = ResolutionController::new();
        rc.set_max_size(Size::new(480, 480));
        // 512 -> 480 is only 6%, below the default threshold
        assert_eq!(rc.evaluate(BOX, 1.0, BOX), ResizeDecision::Pending(Size::new(480, 480)));
        assert_eq!(rc.poll(0.0), Some(Size::new(480, 480)));
    }

    #[test]
    fn test_threshold_clamped() {
        let mut rc = ResolutionController::new();
        rc.set_threshold(5.0);
        assert_eq!(rc.threshold(), 1.0);
        rc.set_threshold(0.0);
        assert_eq!(rc.threshold(), 0.01);
    }

    #[test]
    fn test_effective_scale() {
        let m = Affine2::from_scale_angle_translation(Vec2::new(2.0, 0.5), 0.0, Vec2::new(10.0, 10.0));
        assert!((effective_scale(m) - 2.0).abs() < 1e-6);

        let rot = Affine2::from_scale_angle_translation(Vec2::splat(3.0), 0.7, Vec2::ZERO);
        assert!((effective_scale(rot) - 3.0).abs() < 1e-5);
        assert_eq!(effective_scale(Affine2::IDENTITY), 1.0);
    }
}
