//! raykit - dispatch and execution core of a CPU ray-tracing runtime

pub mod core;
pub mod math;
pub mod object;
pub mod volume;
pub mod scene;
pub mod fb;
pub mod render;
pub mod engine;
pub mod device;

pub use crate::core::{Error, Result, RuntimeConfig};
pub use device::Device;
