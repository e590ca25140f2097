//! Geometry primitives

use std::sync::Arc;

use crate::core::types::Vec3;
use crate::core::{Error, Result};
use crate::math::{Aabb, Ray};
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

use super::material::Material;

/// Closest intersection of a ray with one primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub t: f32,
    /// Unit surface normal facing outwards
    pub normal: Vec3,
}

/// Committed geometry handed to the intersection engine.
pub trait Shape: Send + Sync {
    fn bounds(&self) -> Aabb;

    /// Closest hit within the ray's `[t_near, t_far]` interval.
    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit>;

    fn material(&self) -> Option<&Arc<Material>>;
}

/// Sphere primitive.
///
/// Parameters: `center` (default origin), `radius` (default 1), `material`.
#[derive(Clone)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material: Option<Arc<Material>>,
}

impl Default for Sphere {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 1.0,
            material: None,
        }
    }
}

impl Shape for Sphere {
    fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, Vec3::splat(self.radius))
    }

    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        let oc = ray.origin - self.center;
        let b = oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;
        let a = ray.direction.length_squared();
        let discriminant = b * b - a * c;
        if discriminant < 0.0 {
            return None;
        }

        let root = discriminant.sqrt();
        let t = [(-b - root) / a, (-b + root) / a]
            .into_iter()
            .find(|t| *t >= ray.t_near && *t <= ray.t_far)?;
        let normal = (ray.at(t) - self.center) / self.radius;
        Some(SurfaceHit { t, normal })
    }

    fn material(&self) -> Option<&Arc<Material>> {
        self.material.as_ref()
    }
}

impl ManagedObject for Sphere {
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let radius = params.get_f32("radius", 1.0);
        if radius <= 0.0 {
            return Err(Error::Usage(format!("sphere 'radius' must be positive, got {}", radius)));
        }

        self.center = params.get_vec3f("center", Vec3::ZERO);
        self.radius = radius;
        self.material = params
            .get_object("material")
            .map(|handle| ctx.material(handle))
            .transpose()?;

        Ok(Snapshot::Geometry(Arc::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_hit_from_outside() {
        let sphere = Sphere::default();
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let hit = sphere.intersect(&ray).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_sphere_hit_from_inside_uses_far_root() {
        let sphere = Sphere::default();
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hit = sphere.intersect(&ray).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_miss_and_range() {
        let sphere = Sphere::default();
        assert!(sphere.intersect(&Ray::new(Vec3::new(0.0, 2.0, 5.0), Vec3::NEG_Z)).is_none());
        let short = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z).with_range(0.0, 3.0);
        assert!(sphere.intersect(&short).is_none());
    }
}
