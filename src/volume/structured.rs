//! Structured voxel grid stored under the naive64 layout.

use crate::core::types::{IVec3, UVec3, Vec3};
use crate::core::{Error, Result};

use super::layout::Naive64Layout;
use super::voxel::VoxelType;

/// A dense grid of voxels of type `T`.
#[derive(Clone, Debug)]
pub struct StructuredVolume<T: VoxelType> {
    layout: Naive64Layout,
    voxels: Vec<T>,
}

impl<T: VoxelType> StructuredVolume<T> {
    /// Allocate a zero-filled grid. The addressing permutation is computed here
    /// and never changes for the lifetime of this grid.
    pub fn new(dims: UVec3) -> Result<Self> {
        let layout = Naive64Layout::new(dims)?;
        // Naive64Layout guarantees the length fits in usize.
        let voxels = vec![T::zeroed(); layout.len() as usize];
        Ok(Self { layout, voxels })
    }

    pub fn dims(&self) -> UVec3 {
        self.layout.dims()
    }

    pub fn layout(&self) -> &Naive64Layout {
        &self.layout
    }

    fn in_grid(&self, p: IVec3) -> Option<UVec3> {
        let dims = self.dims().as_ivec3();
        (p.cmpge(IVec3::ZERO).all() && p.cmplt(dims).all()).then(|| p.as_uvec3())
    }

    /// Voxel at integer coordinates, or None outside the grid.
    pub fn get(&self, p: IVec3) -> Option<T> {
        let p = self.in_grid(p)?;
        Some(self.voxels[self.layout.offset(p.x, p.y, p.z) as usize])
    }

    /// Overwrite one voxel. Returns false outside the grid.
    pub fn set(&mut self, p: IVec3, value: T) -> bool {
        match self.in_grid(p) {
            Some(p) => {
                let offset = self.layout.offset(p.x, p.y, p.z) as usize;
                self.voxels[offset] = value;
                true
            }
            None => false,
        }
    }

    /// Overwrite the axis-aligned box `[origin, origin + extent)` from a dense,
    /// x-fastest source buffer.
    ///
    /// The box is validated before anything is written; on error the grid is
    /// untouched.
    pub fn set_region(&mut self, origin: IVec3, extent: IVec3, source: &[T]) -> Result<()> {
        let dims = self.dims().as_ivec3();
        if origin.cmplt(IVec3::ZERO).any() {
            return Err(Error::InvalidRegion(format!("origin {} is negative", origin)));
        }
        if extent.cmplt(IVec3::ZERO).any() {
            return Err(Error::InvalidRegion(format!("extent {} is negative", extent)));
        }
        let end = origin.as_i64vec3() + extent.as_i64vec3();
        if end.cmpgt(dims.as_i64vec3()).any() {
            return Err(Error::InvalidRegion(format!(
                "origin {} + extent {} exceeds grid {}",
                origin, extent, dims
            )));
        }
        let count = extent.x as usize * extent.y as usize * extent.z as usize;
        if source.len() != count {
            return Err(Error::InvalidRegion(format!(
                "source holds {} voxels, region needs {}",
                source.len(),
                count
            )));
        }

        let origin = origin.as_uvec3();
        let extent = extent.as_uvec3();
        let mut src = source.iter();
        for z in origin.z..origin.z + extent.z {
            for y in origin.y..origin.y + extent.y {
                for x in origin.x..origin.x + extent.x {
                    // Length was checked above.
                    if let Some(value) = src.next() {
                        self.voxels[self.layout.offset(x, y, z) as usize] = *value;
                    }
                }
            }
        }
        Ok(())
    }

    /// The eight corner values of the cell at `base`, in corner order.
    #[inline]
    pub fn gather(&self, base: UVec3) -> [f32; 8] {
        let offsets = self.layout.corner_offsets(base);
        offsets.map(|o| self.voxels[o as usize].to_f32())
    }

    /// Trilinear sample at a continuous grid position (voxel centres sit on
    /// integer coordinates).
    ///
    /// Positions outside `[0, dims - 1]` on any axis contribute nothing and
    /// return None.
    pub fn sample(&self, pos: Vec3) -> Option<f32> {
        let max = (self.dims() - UVec3::ONE).as_vec3();
        if !(pos.cmpge(Vec3::ZERO).all() && pos.cmple(max).all()) {
            return None;
        }

        let base = pos.floor().min(max);
        let frac = pos - base;
        let c = self.gather(base.as_uvec3());

        let lerp = |a: f32, b: f32, t: f32| a * (1.0 - t) + b * t;
        let c00 = lerp(c[0], c[1], frac.x);
        let c10 = lerp(c[2], c[3], frac.x);
        let c01 = lerp(c[4], c[5], frac.x);
        let c11 = lerp(c[6], c[7], frac.x);
        let c0 = lerp(c00, c10, frac.y);
        let c1 = lerp(c01, c11, frac.y);
        Some(lerp(c0, c1, frac.z))
    }

    /// Gradients are not provided by this layout.
    pub fn gradient(&self, _pos: Vec3) -> Result<Vec3> {
        Err(Error::NotImplemented("gradient sampling on naive64 volumes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dims: UVec3) -> Vec<f32> {
        (0..dims.x * dims.y * dims.z).map(|i| i as f32).collect()
    }

    #[test]
    fn test_full_region_roundtrip_at_voxel_centres() {
        let dims = UVec3::new(5, 6, 7);
        let mut volume = StructuredVolume::<f32>::new(dims).unwrap();
        let source = ramp(dims);
        volume.set_region(IVec3::ZERO, dims.as_ivec3(), &source).unwrap();

        let mut i = 0;
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let p = UVec3::new(x, y, z);
                    assert_eq!(volume.sample(p.as_vec3()), Some(source[i]));
                    assert_eq!(volume.get(p.as_ivec3()), Some(source[i]));
                    i += 1;
                }
            }
        }
    }

    #[test]
    fn test_partial_region_only_touches_box() {
        let mut volume = StructuredVolume::<u8>::new(UVec3::splat(6)).unwrap();
        volume
            .set_region(IVec3::new(1, 2, 3), IVec3::new(2, 2, 2), &[9; 8])
            .unwrap();

        for z in 0..6 {
            for y in 0..6 {
                for x in 0..6 {
                    let inside = (1..3).contains(&x) && (2..4).contains(&y) && (3..5).contains(&z);
                    let expected = if inside { 9 } else { 0 };
                    assert_eq!(volume.get(IVec3::new(x, y, z)), Some(expected));
                }
            }
        }
    }

    #[test]
    fn test_out_of_bounds_region_is_rejected_without_writing() {
        let dims = UVec3::splat(4);
        let mut volume = StructuredVolume::<f32>::new(dims).unwrap();
        volume.set_region(IVec3::ZERO, dims.as_ivec3(), &ramp(dims)).unwrap();
        let before = volume.clone();

        let err = volume.set_region(IVec3::new(2, 0, 0), IVec3::new(3, 1, 1), &[1.0; 3]);
        assert!(matches!(err, Err(Error::InvalidRegion(_))));
        let err = volume.set_region(IVec3::new(-1, 0, 0), IVec3::ONE, &[1.0]);
        assert!(matches!(err, Err(Error::InvalidRegion(_))));
        let err = volume.set_region(IVec3::ZERO, IVec3::new(2, 2, 2), &[1.0; 7]);
        assert!(matches!(err, Err(Error::InvalidRegion(_))));

        assert_eq!(volume.voxels, before.voxels);
    }

    #[test]
    fn test_uniform_cell_centre_returns_value() {
        let mut volume = StructuredVolume::<f32>::new(UVec3::splat(4)).unwrap();
        volume.set_region(IVec3::ONE, IVec3::splat(2), &[0.3; 8]).unwrap();
        assert_eq!(volume.sample(Vec3::splat(1.5)), Some(0.3));
    }

    #[test]
    fn test_trilinear_weights() {
        let mut volume = StructuredVolume::<f32>::new(UVec3::splat(2)).unwrap();
        // Value equals x coordinate.
        volume.set_region(IVec3::ZERO, IVec3::splat(2), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        let v = volume.sample(Vec3::new(0.25, 0.5, 0.75)).unwrap();
        assert!((v - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_outside_grid_contributes_nothing() {
        let volume = StructuredVolume::<f32>::new(UVec3::splat(4)).unwrap();
        assert_eq!(volume.sample(Vec3::new(-0.01, 1.0, 1.0)), None);
        assert_eq!(volume.sample(Vec3::new(1.0, 3.01, 1.0)), None);
        assert!(volume.sample(Vec3::splat(3.0)).is_some());
    }

    #[test]
    fn test_gradient_not_implemented() {
        let volume = StructuredVolume::<f32>::new(UVec3::splat(2)).unwrap();
        assert!(matches!(volume.gradient(Vec3::ZERO), Err(Error::NotImplemented(_))));
    }
}
