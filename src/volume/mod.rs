//! Structured volumes: naive64 voxel layout, region writes and trilinear
//! sampling.

pub mod voxel;
pub mod layout;
pub mod structured;
pub mod object;

use std::sync::{Arc, RwLock};

use crate::core::types::{unpoison, IVec3, UVec3, Vec3};
use crate::core::{Error, Result};
use crate::math::Aabb;
use crate::scene::TransferFunction;

pub use layout::Naive64Layout;
pub use object::{StructuredVolumeObject, VolumeObject};
pub use structured::StructuredVolume;
pub use voxel::{VoxelKind, VoxelType};

/// Voxel storage with the voxel type erased.
///
/// Shared between the volume object (which receives region writes) and every
/// snapshot handed to renders.
pub trait VolumeData: Send + Sync {
    fn dimensions(&self) -> UVec3;

    fn voxel_kind(&self) -> VoxelKind;

    /// Region write from raw voxel bytes of type `kind`.
    fn set_region_bytes(&self, origin: IVec3, extent: IVec3, kind: VoxelKind, bytes: &[u8]) -> Result<()>;

    /// Trilinear sample at a grid position; None outside the grid.
    fn sample(&self, grid_pos: Vec3) -> Option<f32>;

    /// Sample many grid positions under one lock. Outside positions yield 0.
    fn sample_many(&self, grid_positions: &[Vec3], results: &mut [f32]);

    fn gradient(&self, grid_pos: Vec3) -> Result<Vec3>;
}

/// Lock-protected grid of a concrete voxel type.
pub struct SharedVolume<T: VoxelType> {
    grid: RwLock<StructuredVolume<T>>,
}

impl<T: VoxelType> SharedVolume<T> {
    pub fn new(dims: UVec3) -> Result<Self> {
        Ok(Self { grid: RwLock::new(StructuredVolume::new(dims)?) })
    }
}

impl<T: VoxelType> VolumeData for SharedVolume<T> {
    fn dimensions(&self) -> UVec3 {
        unpoison(self.grid.read()).dims()
    }

    fn voxel_kind(&self) -> VoxelKind {
        T::KIND
    }

    fn set_region_bytes(&self, origin: IVec3, extent: IVec3, kind: VoxelKind, bytes: &[u8]) -> Result<()> {
        if kind != T::KIND {
            return Err(Error::InvalidRegion(format!(
                "source voxels are {}, volume stores {}",
                kind.name(),
                T::KIND.name()
            )));
        }

        match bytemuck::try_cast_slice::<u8, T>(bytes) {
            Ok(source) => unpoison(self.grid.write()).set_region(origin, extent, source),
            Err(bytemuck::PodCastError::TargetAlignmentGreaterAndInputNotAligned) => {
                let source: Vec<T> = bytes
                    .chunks_exact(kind.size())
                    .map(bytemuck::pod_read_unaligned::<T>)
                    .collect();
                if source.len() * kind.size() != bytes.len() {
                    return Err(Error::InvalidRegion("source length is not a whole number of voxels".into()));
                }
                unpoison(self.grid.write()).set_region(origin, extent, &source)
            }
            Err(e) => Err(Error::InvalidRegion(format!("source buffer: {:?}", e))),
        }
    }

    fn sample(&self, grid_pos: Vec3) -> Option<f32> {
        unpoison(self.grid.read()).sample(grid_pos)
    }

    fn sample_many(&self, grid_positions: &[Vec3], results: &mut [f32]) {
        let grid = unpoison(self.grid.read());
        for (pos, out) in grid_positions.iter().zip(results.iter_mut()) {
            *out = grid.sample(*pos).unwrap_or(0.0);
        }
    }

    fn gradient(&self, grid_pos: Vec3) -> Result<Vec3> {
        unpoison(self.grid.read()).gradient(grid_pos)
    }
}

/// Allocate zeroed storage of the given voxel type.
pub fn allocate(kind: VoxelKind, dims: UVec3) -> Result<Arc<dyn VolumeData>> {
    Ok(match kind {
        VoxelKind::U8 => Arc::new(SharedVolume::<u8>::new(dims)?),
        VoxelKind::U16 => Arc::new(SharedVolume::<u16>::new(dims)?),
        VoxelKind::F32 => Arc::new(SharedVolume::<f32>::new(dims)?),
        VoxelKind::F64 => Arc::new(SharedVolume::<f64>::new(dims)?),
    })
}

/// Committed, render-usable view of a volume.
#[derive(Clone)]
pub struct VolumeSnapshot {
    pub data: Arc<dyn VolumeData>,
    /// World position of voxel (0, 0, 0).
    pub grid_origin: Vec3,
    /// World distance between neighbouring voxel centres.
    pub grid_spacing: Vec3,
    pub transfer_function: Option<Arc<TransferFunction>>,
}

impl VolumeSnapshot {
    pub fn world_to_grid(&self, world: Vec3) -> Vec3 {
        (world - self.grid_origin) / self.grid_spacing
    }

    /// World-space bounds spanned by the voxel centres.
    pub fn bounds(&self) -> Aabb {
        let extent = (self.data.dimensions() - UVec3::ONE).as_vec3() * self.grid_spacing;
        Aabb::new(self.grid_origin, self.grid_origin + extent)
    }

    /// Sample at a world position; None outside the grid.
    pub fn sample_world(&self, world: Vec3) -> Option<f32> {
        self.data.sample(self.world_to_grid(world))
    }

    /// Sample a batch of world positions into `results` (0 outside the grid).
    pub fn compute_samples(&self, world_coords: &[Vec3], results: &mut [f32]) -> Result<()> {
        if world_coords.len() != results.len() {
            return Err(Error::Usage(format!(
                "{} sample positions but room for {} results",
                world_coords.len(),
                results.len()
            )));
        }
        let grid: Vec<Vec3> = world_coords.iter().map(|p| self.world_to_grid(*p)).collect();
        self.data.sample_many(&grid, results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_region_write_checks_kind() {
        let data = allocate(VoxelKind::F32, UVec3::splat(2)).unwrap();
        let bytes = [0u8; 8];
        let err = data.set_region_bytes(IVec3::ZERO, IVec3::splat(2), VoxelKind::U8, &bytes);
        assert!(matches!(err, Err(Error::InvalidRegion(_))));
    }

    #[test]
    fn test_unaligned_bytes_are_accepted() {
        let data = allocate(VoxelKind::F32, UVec3::new(2, 1, 1)).unwrap();
        let values = [1.5f32, 2.5];
        let mut storage = vec![0u8; 9];
        storage[1..].copy_from_slice(bytemuck::cast_slice(&values));

        data.set_region_bytes(IVec3::ZERO, IVec3::new(2, 1, 1), VoxelKind::F32, &storage[1..])
            .unwrap();
        assert_eq!(data.sample(Vec3::new(1.0, 0.0, 0.0)), Some(2.5));
    }

    #[test]
    fn test_world_mapping_and_batch_sampling() {
        let data = allocate(VoxelKind::U8, UVec3::splat(3)).unwrap();
        data.set_region_bytes(IVec3::ZERO, IVec3::splat(3), VoxelKind::U8, &[10u8; 27])
            .unwrap();
        let snapshot = VolumeSnapshot {
            data,
            grid_origin: Vec3::splat(-1.0),
            grid_spacing: Vec3::splat(0.5),
            transfer_function: None,
        };

        assert_eq!(snapshot.bounds(), Aabb::new(Vec3::splat(-1.0), Vec3::ZERO));

        let coords = [Vec3::splat(-0.5), Vec3::splat(5.0)];
        let mut results = [f32::NAN; 2];
        snapshot.compute_samples(&coords, &mut results).unwrap();
        assert_eq!(results, [10.0, 0.0]);

        let mut short = [0.0; 1];
        assert!(matches!(snapshot.compute_samples(&coords, &mut short), Err(Error::Usage(_))));
    }
}
