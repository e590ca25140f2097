//! Handle-level structured volume object.

use std::sync::Arc;

use crate::core::types::{IVec3, UVec3, Vec3};
use crate::core::{Error, Result};
use crate::object::{CommitContext, ParamSet, Snapshot};

use super::voxel::VoxelKind;
use super::{allocate, VolumeData, VolumeSnapshot};

/// Behavior of a volume type: commit plus region writes, which arrive
/// outside the parameter path.
pub trait VolumeObject: Send + Sync {
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot>;

    /// Write raw voxels into the box `[origin, origin + extent)`.
    fn set_region_bytes(
        &mut self,
        params: &ParamSet,
        origin: IVec3,
        extent: IVec3,
        kind: VoxelKind,
        bytes: &[u8],
    ) -> Result<()>;
}

/// Volume stored under the naive64 layout.
///
/// Parameters: `dimensions` (vec3i), `voxelType` ("uchar", "ushort",
/// "float", "double"), `gridOrigin`, `gridSpacing`, `transferFunction`.
#[derive(Default)]
pub struct StructuredVolumeObject {
    data: Option<Arc<dyn VolumeData>>,
}

impl StructuredVolumeObject {
    /// Storage matching the current parameters, reallocated (zero-filled)
    /// when dimensions or voxel type changed.
    fn storage(&mut self, params: &ParamSet) -> Result<Arc<dyn VolumeData>> {
        let dims = params.get_vec3i("dimensions", IVec3::ZERO);
        if dims.cmple(IVec3::ZERO).any() {
            return Err(Error::InvalidDimensions(format!(
                "volume 'dimensions' must be positive, got {}",
                dims
            )));
        }
        let dims: UVec3 = dims.as_uvec3();

        let type_name = params.get_string("voxelType", VoxelKind::F32.name());
        let kind = VoxelKind::from_name(&type_name).ok_or_else(|| {
            Error::Usage(format!("unsupported voxelType '{}'", type_name))
        })?;

        if let Some(data) = &self.data {
            if data.dimensions() == dims && data.voxel_kind() == kind {
                return Ok(data.clone());
            }
            log::debug!("Reallocating volume {} {} -> {} {}", data.voxel_kind().name(), data.dimensions(), kind.name(), dims);
        }

        let data = allocate(kind, dims)?;
        self.data = Some(data.clone());
        Ok(data)
    }
}

impl VolumeObject for StructuredVolumeObject {
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let data = self.storage(params)?;

        let grid_spacing = params.get_vec3f("gridSpacing", Vec3::ONE);
        if grid_spacing.cmple(Vec3::ZERO).any() {
            return Err(Error::Usage(format!("gridSpacing must be positive, got {}", grid_spacing)));
        }

        let transfer_function = params
            .get_object("transferFunction")
            .map(|handle| ctx.transfer_function(handle))
            .transpose()?;

        Ok(Snapshot::Volume(Arc::new(VolumeSnapshot {
            data,
            grid_origin: params.get_vec3f("gridOrigin", Vec3::ZERO),
            grid_spacing,
            transfer_function,
        })))
    }

    fn set_region_bytes(
        &mut self,
        params: &ParamSet,
        origin: IVec3,
        extent: IVec3,
        kind: VoxelKind,
        bytes: &[u8],
    ) -> Result<()> {
        self.storage(params)?.set_region_bytes(origin, extent, kind, bytes)
    }
}
