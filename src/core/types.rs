//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3, Vec4,
    IVec2, IVec3, UVec2, UVec3,
};

/// Standard Result type for the runtime
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;

/// Recover the guard from a poisoned lock.
///
/// A panicking tile worker must not wedge every later render, so lock poisoning
/// is treated as recoverable throughout the runtime.
pub(crate) fn unpoison<G>(result: std::sync::LockResult<G>) -> G {
    result.unwrap_or_else(std::sync::PoisonError::into_inner)
}
