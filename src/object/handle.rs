//! Opaque object handles.
//!
//! Callers never hold typed references into the runtime. Every object is
//! addressed by a [`Handle`]; the typed wrappers below only exist so the API
//! can say which kind it expects. The kind is re-checked against the stored
//! type tag on every use.

use std::fmt;
use std::num::NonZeroU64;

/// Kind of object behind a handle (the runtime type tag).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Geometry,
    Camera,
    Renderer,
    Material,
    Light,
    Texture,
    TransferFunction,
    Volume,
    PixelOp,
    FrameBuffer,
    World,
    Future,
}

impl ObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Geometry => "geometry",
            ObjectKind::Camera => "camera",
            ObjectKind::Renderer => "renderer",
            ObjectKind::Material => "material",
            ObjectKind::Light => "light",
            ObjectKind::Texture => "texture",
            ObjectKind::TransferFunction => "transfer function",
            ObjectKind::Volume => "volume",
            ObjectKind::PixelOp => "pixel op",
            ObjectKind::FrameBuffer => "frame buffer",
            ObjectKind::World => "world",
            ObjectKind::Future => "future",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque, pointer-sized identifier of a runtime object. Never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);

impl Handle {
    pub(crate) fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    /// Raw value, for logging and FFI-style round trips.
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(#{})", self.0)
    }
}

/// Typed handle wrappers, one per object kind.
pub trait TypedHandle: Copy + Into<Handle> {
    const KIND: ObjectKind;

    fn from_handle(handle: Handle) -> Self;
}

macro_rules! typed_handles {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            #[doc = concat!("Handle to a ", stringify!($kind), " object.")]
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name(Handle);

            impl $name {
                pub fn handle(self) -> Handle {
                    self.0
                }
            }

            impl From<$name> for Handle {
                fn from(typed: $name) -> Handle {
                    typed.0
                }
            }

            impl TypedHandle for $name {
                const KIND: ObjectKind = ObjectKind::$kind;

                fn from_handle(handle: Handle) -> Self {
                    Self(handle)
                }
            }
        )*
    };
}

typed_handles! {
    GeometryHandle => Geometry,
    CameraHandle => Camera,
    RendererHandle => Renderer,
    MaterialHandle => Material,
    LightHandle => Light,
    TextureHandle => Texture,
    TransferFunctionHandle => TransferFunction,
    VolumeHandle => Volume,
    PixelOpHandle => PixelOp,
    FrameBufferHandle => FrameBuffer,
    WorldHandle => World,
    FutureHandle => Future,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_roundtrip() {
        let raw = Handle::from_raw(NonZeroU64::new(7).unwrap());
        let typed = VolumeHandle::from_handle(raw);
        assert_eq!(Handle::from(typed), raw);
        assert_eq!(VolumeHandle::KIND, ObjectKind::Volume);
        assert_eq!(raw.raw(), 7);
    }

    #[test]
    fn test_option_handle_is_pointer_sized() {
        assert_eq!(std::mem::size_of::<Option<Handle>>(), std::mem::size_of::<u64>());
    }
}
