//! Reference engine for headless runs and tests
//!
//! Reads only the Lottie header (size, frame rate, in/out points) and paints
//! a deterministic progress swatch over the fitted picture rect: an opaque
//! bar up to the playhead, a half-transparent track after it. Real vector
//! content comes from an external engine plugged in through `SceneEngine`.

use glam::{Affine2, Vec2};
use std::path::Path;

use super::frame::RasterTarget;
use super::scene::{LoadError, SceneEngine, Segment, VectorScene};
use super::source::LottieHeader;

/// Bar color (opaque)
const BAR: (u8, u8, u8) = (0xE0, 0x60, 0x30);
/// Track color, drawn at `TRACK_ALPHA`
const TRACK: (u8, u8, u8) = (0x40, 0x80, 0xC0);
const TRACK_ALPHA: u8 = 0x80;

/// Pack premultiplied ARGB8888
pub fn premultiplied_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    let pm = |c: u8| (c as u32 * a as u32 + 127) / 255;
    (a as u32) << 24 | pm(r) << 16 | pm(g) << 8 | pm(b)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SolidEngine;

impl SceneEngine for SolidEngine {
    fn name(&self) -> &str {
        "solid"
    }

    fn create_scene(&self) -> Box<dyn VectorScene> {
        Box::new(SolidScene::default())
    }
}

#[derive(Debug, Default)]
pub struct SolidScene {
    header: Option<LottieHeader>,
    transform: Affine2,
    segment: Option<Segment>,
    frame: f32,
}

impl SolidScene {
    fn progress(&self) -> f32 {
        let total = self.header.as_ref().map(|h| h.total_frames()).unwrap_or(0.0);
        if total <= 1.0 {
            return 1.0;
        }
        (self.frame / (total - 1.0)).clamp(0.0, 1.0)
    }
}

impl VectorScene for SolidScene {
    fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        self.header = None;
        let header = LottieHeader::read(path)?;
        if header.w <= 0.0 || header.h <= 0.0 {
            return Err(LoadError::Parse(format!("{}: missing w/h", path.display())));
        }
        self.header = Some(header);
        self.frame = 0.0;
        Ok(())
    }

    fn intrinsic_size(&self) -> Vec2 {
        self.header.as_ref().map(|h| Vec2::new(h.w, h.h)).unwrap_or(Vec2::ZERO)
    }

    fn total_frames(&self) -> f32 {
        self.header.as_ref().map(|h| h.total_frames()).unwrap_or(0.0)
    }

    fn duration(&self) -> f32 {
        self.header.as_ref().map(|h| h.duration()).unwrap_or(0.0)
    }

    fn set_transform(&mut self, transform: Affine2) {
        self.transform = transform;
    }

    fn set_segment(&mut self, segment: Option<Segment>) {
        self.segment = segment;
    }

    fn set_frame(&mut self, frame: f32) {
        self.frame = match self.segment {
            Some(seg) => seg.clamp(frame),
            None => frame.max(0.0),
        };
    }

    fn draw(&mut self, target: &mut RasterTarget) {
        let Some(header) = &self.header else {
            return;
        };
        let (w, h) = (target.width() as f32, target.height() as f32);
        let tl = self.transform.transform_point2(Vec2::ZERO);
        let br = self.transform.transform_point2(Vec2::new(header.w, header.h));

        let x0 = tl.x.round().clamp(0.0, w) as usize;
        let x1 = br.x.round().clamp(0.0, w) as usize;
        let y0 = tl.y.round().clamp(0.0, h) as usize;
        let y1 = br.y.round().clamp(0.0, h) as usize;
        let split = x0 + ((x1 - x0) as f32 * self.progress()).round() as usize;

        let bar = premultiplied_argb(0xFF, BAR.0, BAR.1, BAR.2);
        let track = premultiplied_argb(TRACK_ALPHA, TRACK.0, TRACK.1, TRACK.2);
        let stride = target.stride();
        let pixels = target.pixels_mut();
        for y in y0..y1 {
            let row = &mut pixels[y * stride..(y + 1) * stride];
            for (x, px) in row.iter_mut().enumerate().take(x1).skip(x0) {
                *px = if x < split { bar } else { track };
            }
        }
    }
}
