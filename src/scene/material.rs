//! Materials and textures

use std::sync::Arc;

use crate::core::types::Vec3;
use crate::core::Result;
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

/// A colour lookup over world-space positions.
pub trait Texture: Send + Sync {
    fn eval(&self, position: Vec3) -> Vec3;
}

/// Two-colour 3D checkerboard.
///
/// Parameters: `color0` (default white), `color1` (default black), `scale`
/// (cells per world unit, default 1).
#[derive(Clone, Debug)]
pub struct CheckerTexture {
    pub color0: Vec3,
    pub color1: Vec3,
    pub scale: f32,
}

impl Default for CheckerTexture {
    fn default() -> Self {
        Self {
            color0: Vec3::ONE,
            color1: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl Texture for CheckerTexture {
    fn eval(&self, position: Vec3) -> Vec3 {
        let cell = (position * self.scale).floor().as_ivec3();
        if (cell.x + cell.y + cell.z).rem_euclid(2) == 0 {
            self.color0
        } else {
            self.color1
        }
    }
}

impl ManagedObject for CheckerTexture {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        self.color0 = params.get_vec3f("color0", Vec3::ONE);
        self.color1 = params.get_vec3f("color1", Vec3::ZERO);
        self.scale = params.get_f32("scale", 1.0);
        Ok(Snapshot::Texture(Arc::new(self.clone())))
    }
}

/// Diffuse material.
///
/// Parameters: `Kd` (diffuse colour, default 0.8 grey), `map_Kd` (texture
/// multiplied into `Kd`).
#[derive(Clone)]
pub struct Material {
    pub diffuse: Vec3,
    pub diffuse_map: Option<Arc<dyn Texture>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.8),
            diffuse_map: None,
        }
    }
}

impl Material {
    /// Diffuse reflectance at a surface point.
    pub fn albedo(&self, position: Vec3) -> Vec3 {
        match &self.diffuse_map {
            Some(texture) => self.diffuse * texture.eval(position),
            None => self.diffuse,
        }
    }
}

impl ManagedObject for Material {
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot> {
        self.diffuse = params.get_vec3f("Kd", Vec3::splat(0.8));
        self.diffuse_map = params
            .get_object("map_Kd")
            .map(|handle| ctx.texture(handle))
            .transpose()?;
        Ok(Snapshot::Material(Arc::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_alternates() {
        let checker = CheckerTexture::default();
        assert_eq!(checker.eval(Vec3::splat(0.5)), Vec3::ONE);
        assert_eq!(checker.eval(Vec3::new(1.5, 0.5, 0.5)), Vec3::ZERO);
        assert_eq!(checker.eval(Vec3::new(-0.5, 0.5, 0.5)), Vec3::ZERO);
    }

    #[test]
    fn test_albedo_modulated_by_map() {
        let material = Material {
            diffuse: Vec3::splat(0.5),
            diffuse_map: Some(Arc::new(CheckerTexture::default())),
        };
        assert_eq!(material.albedo(Vec3::splat(0.5)), Vec3::splat(0.5));
        assert_eq!(material.albedo(Vec3::new(1.5, 0.5, 0.5)), Vec3::ZERO);
        assert_eq!(Material::default().albedo(Vec3::ZERO), Vec3::splat(0.8));
    }
}
