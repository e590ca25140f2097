//! Voxel scalar types.

use bytemuck::Pod;

/// Runtime tag of a volume's voxel type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoxelKind {
    U8,
    U16,
    F32,
    F64,
}

impl VoxelKind {
    /// Parse a `voxelType` parameter value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uchar" | "u8" => Some(VoxelKind::U8),
            "ushort" | "u16" => Some(VoxelKind::U16),
            "float" | "f32" => Some(VoxelKind::F32),
            "double" | "f64" => Some(VoxelKind::F64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VoxelKind::U8 => "uchar",
            VoxelKind::U16 => "ushort",
            VoxelKind::F32 => "float",
            VoxelKind::F64 => "double",
        }
    }

    /// Size of one voxel in bytes.
    pub fn size(self) -> usize {
        match self {
            VoxelKind::U8 => 1,
            VoxelKind::U16 => 2,
            VoxelKind::F32 => 4,
            VoxelKind::F64 => 8,
        }
    }
}

/// A scalar that can be stored in a structured volume.
pub trait VoxelType: Pod + PartialEq + Send + Sync + 'static {
    const KIND: VoxelKind;

    fn to_f32(self) -> f32;
}

impl VoxelType for u8 {
    const KIND: VoxelKind = VoxelKind::U8;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl VoxelType for u16 {
    const KIND: VoxelKind = VoxelKind::U16;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl VoxelType for f32 {
    const KIND: VoxelKind = VoxelKind::F32;

    fn to_f32(self) -> f32 {
        self
    }
}

impl VoxelType for f64 {
    const KIND: VoxelKind = VoxelKind::F64;

    fn to_f32(self) -> f32 {
        self as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for kind in [VoxelKind::U8, VoxelKind::U16, VoxelKind::F32, VoxelKind::F64] {
            assert_eq!(VoxelKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(VoxelKind::from_name("half"), None);
    }

    #[test]
    fn test_sizes_match_types() {
        assert_eq!(VoxelKind::U16.size(), std::mem::size_of::<u16>());
        assert_eq!(<f64 as VoxelType>::KIND.size(), std::mem::size_of::<f64>());
    }
}
