//! Light sources

use std::sync::Arc;

use crate::core::types::Vec3;
use crate::core::Result;
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    /// Uniform light from every direction
    Ambient,
    /// Parallel light travelling along `direction`
    Directional,
}

/// A light source.
///
/// Parameters: `color` (default white), `intensity` (default 1) and, for
/// directional lights, `direction` (default straight down).
#[derive(Clone, Debug)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub direction: Vec3,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            direction: Vec3::NEG_Y,
        }
    }

    /// Irradiance arriving at a surface with the given normal.
    pub fn illuminate(&self, normal: Vec3) -> Vec3 {
        let radiance = self.color * self.intensity;
        match self.kind {
            LightKind::Ambient => radiance,
            LightKind::Directional => radiance * normal.dot(-self.direction).max(0.0),
        }
    }
}

impl ManagedObject for Light {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        self.color = params.get_vec3f("color", Vec3::ONE);
        self.intensity = params.get_f32("intensity", 1.0);
        let direction = params.get_vec3f("direction", Vec3::NEG_Y).normalize_or_zero();
        self.direction = if direction == Vec3::ZERO { Vec3::NEG_Y } else { direction };
        Ok(Snapshot::Light(Arc::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_cosine_falloff() {
        let light = Light::new(LightKind::Directional);
        assert_eq!(light.illuminate(Vec3::Y), Vec3::ONE);
        assert_eq!(light.illuminate(Vec3::NEG_Y), Vec3::ZERO);
        assert!((light.illuminate(Vec3::new(1.0, 1.0, 0.0).normalize()).x - 0.70710677).abs() < 1e-6);
    }

    #[test]
    fn test_ambient_ignores_normal() {
        let mut light = Light::new(LightKind::Ambient);
        light.intensity = 0.25;
        assert_eq!(light.illuminate(Vec3::NEG_Y), Vec3::splat(0.25));
    }
}
