//! Cameras: primary ray generation

use std::sync::Arc;

use crate::core::types::{Vec2, Vec3};
use crate::core::{Error, Result};
use crate::math::Ray;
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

/// Generates primary rays.
pub trait Camera: Send + Sync {
    /// Ray through a normalized screen position; (0, 0) is the lower-left
    /// corner of the image and (1, 1) the upper-right.
    fn generate_ray(&self, screen: Vec2) -> Ray;
}

/// Orthonormal camera frame derived from `pos`, `dir` and `up`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Frame {
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
}

impl Frame {
    fn from_params(params: &ParamSet) -> Result<Self> {
        let position = params.get_vec3f("pos", Vec3::ZERO);
        let forward = params.get_vec3f("dir", Vec3::NEG_Z).normalize_or_zero();
        let up_hint = params.get_vec3f("up", Vec3::Y);

        let right = forward.cross(up_hint).normalize_or_zero();
        if right == Vec3::ZERO {
            return Err(Error::Usage("camera 'dir' and 'up' must be non-zero and not parallel".into()));
        }
        let up = right.cross(forward);

        Ok(Self { position, forward, right, up })
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
        }
    }
}

/// Pinhole camera.
///
/// Parameters: `pos`, `dir`, `up`, `fovy` (degrees, default 60), `aspect`
/// (width / height, default 1).
#[derive(Clone, Debug)]
pub struct PerspectiveCamera {
    frame: Frame,
    /// Half extent of the image plane at unit distance
    half_extent: Vec2,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self { frame: Frame::default(), half_extent: Vec2::splat(30f32.to_radians().tan()) }
    }
}

impl Camera for PerspectiveCamera {
    fn generate_ray(&self, screen: Vec2) -> Ray {
        let ndc = screen * 2.0 - Vec2::ONE;
        let direction = self.frame.forward
            + self.frame.right * (ndc.x * self.half_extent.x)
            + self.frame.up * (ndc.y * self.half_extent.y);
        Ray::new(self.frame.position, direction.normalize())
    }
}

impl ManagedObject for PerspectiveCamera {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let fovy = params.get_f32("fovy", 60.0);
        if !(fovy > 0.0 && fovy < 180.0) {
            return Err(Error::Usage(format!("camera 'fovy' must be in (0, 180), got {}", fovy)));
        }
        let aspect = params.get_f32("aspect", 1.0);

        let half_height = (fovy.to_radians() * 0.5).tan();
        self.frame = Frame::from_params(params)?;
        self.half_extent = Vec2::new(half_height * aspect, half_height);

        Ok(Snapshot::Camera(Arc::new(self.clone())))
    }
}

/// Parallel-projection camera.
///
/// Parameters: `pos`, `dir`, `up`, `height` (world units, default 1),
/// `aspect`.
#[derive(Clone, Debug)]
pub struct OrthographicCamera {
    frame: Frame,
    extent: Vec2,
}

impl Default for OrthographicCamera {
    fn default() -> Self {
        Self { frame: Frame::default(), extent: Vec2::ONE }
    }
}

impl Camera for OrthographicCamera {
    fn generate_ray(&self, screen: Vec2) -> Ray {
        let offset = (screen - Vec2::splat(0.5)) * self.extent;
        let origin = self.frame.position + self.frame.right * offset.x + self.frame.up * offset.y;
        Ray::new(origin, self.frame.forward)
    }
}

impl ManagedObject for OrthographicCamera {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let height = params.get_f32("height", 1.0);
        let aspect = params.get_f32("aspect", 1.0);
        self.frame = Frame::from_params(params)?;
        self.extent = Vec2::new(height * aspect, height);

        Ok(Snapshot::Camera(Arc::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{HandleTable, ParamValue};

    fn commit(camera: &mut dyn ManagedObject, params: &ParamSet) -> Result<Snapshot> {
        let table = HandleTable::new();
        camera.commit(params, &CommitContext::new(&table, None))
    }

    #[test]
    fn test_perspective_centre_ray_follows_dir() {
        let mut camera = PerspectiveCamera::default();
        let mut params = ParamSet::new();
        params.set("pos", ParamValue::Vec3f(Vec3::new(0.0, 0.0, 5.0)));
        commit(&mut camera, &params).unwrap();

        let ray = camera.generate_ray(Vec2::splat(0.5));
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 5.0));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-6);

        // Upper-right corner points up and to the right.
        let corner = camera.generate_ray(Vec2::ONE);
        assert!(corner.direction.x > 0.0 && corner.direction.y > 0.0);
    }

    #[test]
    fn test_orthographic_rays_are_parallel() {
        let mut camera = OrthographicCamera::default();
        let mut params = ParamSet::new();
        params.set("height", ParamValue::Float(2.0));
        commit(&mut camera, &params).unwrap();

        let a = camera.generate_ray(Vec2::ZERO);
        let b = camera.generate_ray(Vec2::ONE);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.origin, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(b.origin, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_degenerate_frame_rejected() {
        let mut camera = PerspectiveCamera::default();
        let mut params = ParamSet::new();
        params.set("dir", ParamValue::Vec3f(Vec3::Y));
        assert!(matches!(commit(&mut camera, &params), Err(Error::Usage(_))));
    }
}
