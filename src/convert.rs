//! Pixel format conversion for rendered frames
//!
//! The vector engine rasterizes into packed `0xAARRGGBB` words with
//! premultiplied alpha. Presentation wants byte-interleaved straight-alpha
//! RGBA8. Runs on every rendered frame, so the channel reorder has a
//! vectorized path:
//!
//! - x86_64: SSSE3 `pshufb`, 4 pixels (16 bytes) per lane, runtime-detected
//! - aarch64: NEON `tbl`, 4 pixels per lane
//! - elsewhere: portable 4-pixel lanes
//!
//! All paths finish the `count % 4` remainder with the scalar loop and produce
//! byte-identical output to [`argb_to_rgba_scalar`].
//!
//! Two post passes fight filtering artifacts on transparent edges:
//! [`unpremultiply`] and [`fix_alpha_border`].

use crate::entities::frame::Size;

/// Byte shuffle from little-endian ARGB words to RGBA bytes (4 pixels)
#[cfg(any(target_arch = "x86_64", all(target_arch = "aarch64", target_endian = "little")))]
const ARGB_TO_RGBA_SHUFFLE: [u8; 16] = [2, 1, 0, 3, 6, 5, 4, 7, 10, 9, 8, 11, 14, 13, 12, 15];

#[inline(always)]
fn argb_pixel(p: u32) -> [u8; 4] {
    [(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8]
}

/// Reference conversion, one pixel at a time.
pub fn argb_to_rgba_scalar(src: &[u32], dst: &mut [u8]) {
    for (p, out) in src.iter().zip(dst.chunks_exact_mut(4)) {
        out.copy_from_slice(&argb_pixel(*p));
    }
}

/// Portable 4-pixel lane conversion (autovectorizes on most targets)
pub fn argb_to_rgba_lanes(src: &[u32], dst: &mut [u8]) {
    let lanes = src.chunks_exact(4);
    let tail = lanes.remainder();
    let lane_count = src.len() / 4;

    for (lane, out) in lanes.zip(dst.chunks_exact_mut(16)) {
        let packed: [[u8; 4]; 4] = std::array::from_fn(|i| argb_pixel(lane[i]));
        out.copy_from_slice(bytemuck::cast_slice(&packed));
    }

    argb_to_rgba_scalar(tail, &mut dst[lane_count * 16..]);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "ssse3")]
unsafe fn argb_to_rgba_ssse3(src: &[u32], dst: &mut [u8]) {
    use std::arch::x86_64::{__m128i, _mm_loadu_si128, _mm_shuffle_epi8, _mm_storeu_si128};

    let lane_count = src.len() / 4;
    debug_assert!(dst.len() >= lane_count * 16);

    // SAFETY: each lane reads 16 bytes from src[i*4..i*4+4] and writes 16
    // bytes to dst[i*16..i*16+16]; both are in bounds by construction.
    unsafe {
        let mask = _mm_loadu_si128(ARGB_TO_RGBA_SHUFFLE.as_ptr() as *const __m128i);
        for i in 0..lane_count {
            let px = _mm_loadu_si128(src.as_ptr().add(i * 4) as *const __m128i);
            let out = _mm_shuffle_epi8(px, mask);
            _mm_storeu_si128(dst.as_mut_ptr().add(i * 16) as *mut __m128i, out);
        }
    }

    argb_to_rgba_scalar(&src[lane_count * 4..], &mut dst[lane_count * 16..]);
}

#[cfg(all(target_arch = "aarch64", target_endian = "little"))]
#[target_feature(enable = "neon")]
unsafe fn argb_to_rgba_neon(src: &[u32], dst: &mut [u8]) {
    use std::arch::aarch64::{vld1q_u8, vqtbl1q_u8, vst1q_u8};

    let lane_count = src.len() / 4;
    debug_assert!(dst.len() >= lane_count * 16);

    // SAFETY: same bounds reasoning as the SSSE3 path.
    unsafe {
        let table = vld1q_u8(ARGB_TO_RGBA_SHUFFLE.as_ptr());
        for i in 0..lane_count {
            let px = vld1q_u8(src.as_ptr().add(i * 4) as *const u8);
            vst1q_u8(dst.as_mut_ptr().add(i * 16), vqtbl1q_u8(px, table));
        }
    }

    argb_to_rgba_scalar(&src[lane_count * 4..], &mut dst[lane_count * 16..]);
}

/// Convert packed ARGB8888 to RGBA8 bytes using the fastest available path.
///
/// `dst` must hold exactly `src.len() * 4` bytes. A mismatch is a caller bug:
/// asserted in debug builds, truncated to the shorter side in release.
pub fn argb_to_rgba(src: &[u32], dst: &mut [u8]) {
    debug_assert_eq!(dst.len(), src.len() * 4, "argb_to_rgba: buffer size mismatch");
    let count = src.len().min(dst.len() / 4);
    let (src, dst) = (&src[..count], &mut dst[..count * 4]);

    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("ssse3") {
            // SAFETY: ssse3 availability checked at runtime
            unsafe { argb_to_rgba_ssse3(src, dst) };
            return;
        }
    }

    #[cfg(all(target_arch = "aarch64", target_endian = "little"))]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            // SAFETY: neon availability checked at runtime
            unsafe { argb_to_rgba_neon(src, dst) };
            return;
        }
    }

    argb_to_rgba_lanes(src, dst);
}

/// Premultiplied → straight alpha, in place.
///
/// Integer math with rounding so results are bit-reproducible across targets.
pub fn unpremultiply(rgba: &mut [u8], size: Size) {
    if size.is_empty() {
        return;
    }
    let bytes = size.rgba_bytes().min(rgba.len());
    for px in rgba[..bytes].chunks_exact_mut(4) {
        let a = px[3] as u32;
        match a {
            0 => {
                px[0] = 0;
                px[1] = 0;
                px[2] = 0;
            }
            255 => {}
            _ => {
                for c in &mut px[..3] {
                    *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}

/// Neighbour scan order for [`fix_alpha_border`] (row-major, centre skipped)
const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Bleed edge colors into fully transparent pixels.
///
/// Single pass over interior pixels. A pixel with alpha exactly 0 takes the
/// RGB of its first neighbour with alpha > 0. Neighbour RGB comes from a
/// snapshot taken before the pass, so no pixel sees another's new color.
/// Alpha is never touched.
pub fn fix_alpha_border(rgba: &mut [u8], size: Size) {
    let (w, h) = (size.width as usize, size.height as usize);
    if w <= 2 || h <= 2 || rgba.len() < w * h * 4 {
        return;
    }

    let snapshot: Vec<u8> = rgba[..w * h * 4]
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = (y * w + x) * 4;
            if rgba[idx + 3] != 0 {
                continue;
            }
            for (dx, dy) in NEIGHBOURS {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                let n = ny * w + nx;
                if rgba[n * 4 + 3] > 0 {
                    rgba[idx..idx + 3].copy_from_slice(&snapshot[n * 3..n * 3 + 3]);
                    break;
                }
            }
        }
    }
}

/// Post-conversion artifact mitigation switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostProcess {
    pub unpremultiply: bool,
    pub fix_alpha_border: bool,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            unpremultiply: true,
            fix_alpha_border: true,
        }
    }
}

impl PostProcess {
    /// Unpremultiply first, then border bleed (bleed copies straight colors)
    pub fn apply(&self, rgba: &mut [u8], size: Size) {
        if self.unpremultiply {
            unpremultiply(rgba, size);
        }
        if self.fix_alpha_border {
            fix_alpha_border(rgba, size);
        }
    }
}

/// Convert a whole raster into a fresh RGBA buffer and post-process it
pub fn raster_to_rgba(src: &[u32], size: Size, post: PostProcess) -> Vec<u8> {
    let mut out = vec![0u8; size.rgba_bytes()];
    if src.len() != size.area() {
        debug_assert!(false, "raster_to_rgba: {} pixels for {}", src.len(), size);
        return out;
    }
    argb_to_rgba(src, &mut out);
    post.apply(&mut out, size);
    out
}
