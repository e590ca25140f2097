//! Built-in scene object types.
//!
//! Each type is a parameter-driven [`ManagedObject`](crate::object::ManagedObject)
//! that publishes an immutable snapshot on commit. Only a minimal set is
//! provided; more can be registered by name on a device.

pub mod camera;
pub mod geometry;
pub mod material;
pub mod light;
pub mod transfer_function;
pub mod world;

pub use camera::{Camera, OrthographicCamera, PerspectiveCamera};
pub use geometry::{Shape, Sphere, SurfaceHit};
pub use light::{Light, LightKind};
pub use material::{CheckerTexture, Material, Texture};
pub use transfer_function::{PiecewiseLinearTransferFunction, TransferFunction};
pub use world::{World, WorldState};
