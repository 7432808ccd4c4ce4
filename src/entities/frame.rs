//! Pixel containers shared by the render pipeline
//!
//! - `Size`: integer raster dimensions (render size, box size, cache key part)
//! - `RasterTarget`: engine-native packed ARGB8888 buffer a scene draws into
//! - `Image`: straight-alpha RGBA8 bytes ready for presentation / caching
//!
//! **Ownership**: a `RasterTarget` is owned by exactly one thread (main or
//! worker). Images cross threads only as owned values or behind `Arc`.

use std::fmt;

/// Raster dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size { width: 0, height: 0 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either axis is zero (nothing can be drawn)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel count
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Per-axis minimum (used to clamp against max render size)
    pub fn min(self, other: Size) -> Size {
        Size::new(self.width.min(other.width), self.height.min(other.height))
    }

    /// Bytes needed for an RGBA8 image of this size
    pub fn rgba_bytes(&self) -> usize {
        self.area() * 4
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Packed 32-bit render buffer handed to the vector engine
/// (`0xAARRGGBB`, premultiplied alpha).
///
/// Dimensions always match the last `allocate()` call. Stride equals width.
#[derive(Debug, Clone)]
pub struct RasterTarget {
    pixels: Vec<u32>,
    size: Size,
}

impl RasterTarget {
    /// Empty target (zero area, renders are no-ops)
    pub fn empty() -> Self {
        Self {
            pixels: Vec::new(),
            size: Size::ZERO,
        }
    }

    /// Allocate a cleared target of given size
    pub fn new(size: Size) -> Self {
        let mut target = Self::empty();
        target.allocate(size);
        target
    }

    /// Reallocate to `size` and clear to transparent black.
    pub fn allocate(&mut self, size: Size) {
        self.size = size;
        self.pixels.clear();
        self.pixels.resize(size.area(), 0);
    }

    /// Clear to transparent black without reallocating
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Row stride in pixels
    pub fn stride(&self) -> usize {
        self.size.width as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}

/// Straight-alpha RGBA8 image
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pixels: Vec<u8>,
    size: Size,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("size", &self.size)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Image {
    /// Fully transparent image
    pub fn transparent(size: Size) -> Self {
        Self {
            pixels: vec![0u8; size.rgba_bytes()],
            size,
        }
    }

    /// Wrap an RGBA8 buffer. Returns `None` if length doesn't match `size`.
    pub fn from_rgba(pixels: Vec<u8>, size: Size) -> Option<Self> {
        (pixels.len() == size.rgba_bytes()).then_some(Self { pixels, size })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory footprint in bytes (cache accounting)
    pub fn mem(&self) -> usize {
        self.pixels.len()
    }

    /// Bilinear rescale, used as a placeholder while a resized frame renders
    pub fn resized(&self, size: Size) -> Image {
        if size == self.size {
            return self.clone();
        }
        if self.size.is_empty() || size.is_empty() {
            return Image::transparent(size);
        }
        match image::RgbaImage::from_raw(self.size.width, self.size.height, self.pixels.clone()) {
            Some(src) => {
                let scaled = image::imageops::resize(
                    &src,
                    size.width,
                    size.height,
                    image::imageops::FilterType::Triangle,
                );
                Image {
                    pixels: scaled.into_raw(),
                    size,
                }
            }
            None => Image::transparent(size),
        }
    }

    /// Convert to `image::RgbaImage` for encoding
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.size.width, self.size.height, self.pixels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_target_allocate() {
        let mut target = RasterTarget::new(Size::new(4, 3));
        assert_eq!(target.pixels().len(), 12);
        assert_eq!(target.stride(), 4);

        target.pixels_mut()[0] = 0xFFFF_0000;
        target.allocate(Size::new(2, 2));
        assert_eq!(target.size(), Size::new(2, 2));
        assert!(target.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_image_from_rgba_checks_len() {
        assert!(Image::from_rgba(vec![0; 16], Size::new(2, 2)).is_some());
        assert!(Image::from_rgba(vec![0; 15], Size::new(2, 2)).is_none());
    }

    #[test]
    fn test_image_resized_keeps_size() {
        let img = Image::from_rgba(vec![200; 64], Size::new(4, 4)).unwrap();
        let scaled = img.resized(Size::new(8, 2));
        assert_eq!(scaled.size(), Size::new(8, 2));
        assert_eq!(scaled.pixels().len(), 64);
    }
}
