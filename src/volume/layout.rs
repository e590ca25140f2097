//! "Naive64" voxel addressing.
//!
//! The grid is cut into 4x4x4 bricks. Inside a brick voxels are stored in
//! Morton order; bricks are stored in x-major linear order. A voxel's offset
//! is the sum of three independent per-axis terms, so the permutation is
//! precomputed once per allocation as three lookup tables and the eight
//! corners of a trilinear cell can be fetched as a gather from one base
//! offset. All offsets are 64-bit.

use crate::core::types::UVec3;
use crate::core::{Error, Result};
use crate::math::morton::spread_bits;

/// Brick edge length in voxels (log2).
pub const BRICK_BITS: u32 = 2;
/// Brick edge length in voxels.
pub const BRICK_SIZE: u32 = 1 << BRICK_BITS;
/// Voxels per brick.
pub const BRICK_VOXELS: u64 = (BRICK_SIZE * BRICK_SIZE * BRICK_SIZE) as u64;

const BRICK_MASK: u32 = BRICK_SIZE - 1;

/// Immutable addressing permutation for one grid size.
#[derive(Clone, Debug)]
pub struct Naive64Layout {
    dims: UVec3,
    bricks: UVec3,
    offset_x: Vec<u64>,
    offset_y: Vec<u64>,
    offset_z: Vec<u64>,
    len: u64,
}

impl Naive64Layout {
    /// Compute the permutation for a grid. Fails if any axis is empty or the
    /// padded voxel count does not fit in 64-bit (and host) index space.
    pub fn new(dims: UVec3) -> Result<Self> {
        if dims.cmpeq(UVec3::ZERO).any() {
            return Err(Error::InvalidDimensions(format!("{} has an empty axis", dims)));
        }

        let bricks = (dims + UVec3::splat(BRICK_MASK)) >> BRICK_BITS;
        let len = (bricks.x as u64)
            .checked_mul(bricks.y as u64)
            .and_then(|n| n.checked_mul(bricks.z as u64))
            .and_then(|n| n.checked_mul(BRICK_VOXELS))
            .ok_or_else(|| Error::InvalidDimensions(format!("{} exceeds 64-bit addressing", dims)))?;
        if usize::try_from(len).is_err() {
            return Err(Error::InvalidDimensions(format!("{} exceeds host address space", dims)));
        }

        let stride_y = bricks.x as u64 * BRICK_VOXELS;
        let stride_z = stride_y * bricks.y as u64;

        let axis = |extent: u32, stride: u64, shift: u32| -> Vec<u64> {
            (0..extent)
                .map(|i| (i >> BRICK_BITS) as u64 * stride + (spread_bits(i & BRICK_MASK) << shift))
                .collect()
        };

        Ok(Self {
            dims,
            bricks,
            offset_x: axis(dims.x, BRICK_VOXELS, 0),
            offset_y: axis(dims.y, stride_y, 1),
            offset_z: axis(dims.z, stride_z, 2),
            len,
        })
    }

    /// Logical grid size.
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Number of bricks per axis.
    pub fn bricks(&self) -> UVec3 {
        self.bricks
    }

    /// Storage length in voxels, including brick padding.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Physical offset of a voxel. Coordinates must be inside the grid.
    #[inline]
    pub fn offset(&self, x: u32, y: u32, z: u32) -> u64 {
        self.offset_x[x as usize] + self.offset_y[y as usize] + self.offset_z[z as usize]
    }

    /// Offsets of the eight corners of the cell whose lower corner is `base`.
    ///
    /// Corner `i` uses bit 0 for +x, bit 1 for +y, bit 2 for +z. Upper
    /// corners are clamped to the last voxel on each axis.
    #[inline]
    pub fn corner_offsets(&self, base: UVec3) -> [u64; 8] {
        let upper = (base + UVec3::ONE).min(self.dims - UVec3::ONE);
        let xs = [self.offset_x[base.x as usize], self.offset_x[upper.x as usize]];
        let ys = [self.offset_y[base.y as usize], self.offset_y[upper.y as usize]];
        let zs = [self.offset_z[base.z as usize], self.offset_z[upper.z as usize]];

        std::array::from_fn(|i| xs[i & 1] + ys[(i >> 1) & 1] + zs[(i >> 2) & 1])
    }
}
