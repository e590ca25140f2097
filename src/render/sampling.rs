//! Sub-pixel sample positions
//!
//! Samples follow a Halton (2, 3) sequence indexed by the global sample
//! number (accumulation pass times samples per pixel plus the sample within
//! the pass). Each pixel applies its own toroidal shift, derived from a hash
//! of its coordinates, so neighbouring pixels do not share a pattern. The
//! position depends only on (pixel, sample number), never on which worker
//! renders the tile or in what order.

use crate::core::types::{UVec2, Vec2};

/// Generate a Halton number for the given index and base
///
/// # Arguments
/// * `index` - Sequence index (0 yields 0)
/// * `base` - Prime number base (typically 2, 3, 5, 7, etc.)
///
/// # Returns
/// A value in the range [0, 1)
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0;
    let mut f = 1.0 / base as f32;

    while index > 0 {
        result += f * (index % base) as f32;
        index /= base;
        f /= base as f32;
    }

    result
}

/// Integer hash with good avalanche (PCG output permutation).
fn hash(mut v: u32) -> u32 {
    v = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((v >> ((v >> 28) + 4)) ^ v).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Per-pixel shift in [0, 1)².
fn pixel_shift(pixel: UVec2) -> Vec2 {
    let h = hash(pixel.x ^ hash(pixel.y));
    Vec2::new(
        (h & 0xffff) as f32 / 65536.0,
        (h >> 16) as f32 / 65536.0,
    )
}

/// Global sample number of sample `sample` in accumulation pass `accum_id`.
pub fn sample_index(accum_id: u32, samples_per_pixel: u32, sample: u32) -> u32 {
    accum_id.wrapping_mul(samples_per_pixel).wrapping_add(sample)
}

/// Sub-pixel offset in [0, 1)² of one sample of one pixel.
pub fn pixel_jitter(pixel: UVec2, index: u32) -> Vec2 {
    // index + 1 skips the (0, 0) start of the sequence
    let index = index.wrapping_add(1);
    let point = Vec2::new(halton(index, 2), halton(index, 3));
    (point + pixel_shift(pixel)).fract()
}
