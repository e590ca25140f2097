//! Type-name → constructor registry.
//!
//! Every object kind is created by name. The registry is filled with the
//! built-in types when a device is constructed; hosts can register more.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Error, Result};
use crate::fb::pixel_op::{FrameCounterOp, TonemapOp};
use crate::render::renderer::{ConstantRenderer, RaycastRenderer};
use crate::scene::{
    CheckerTexture, Light, LightKind, Material, OrthographicCamera, PerspectiveCamera,
    PiecewiseLinearTransferFunction, Sphere,
};
use crate::volume::StructuredVolumeObject;

use super::entity::ObjectBody;
use super::handle::ObjectKind;

/// Constructor of a fresh, uncommitted object body.
pub type Factory = Arc<dyn Fn() -> ObjectBody + Send + Sync>;

/// Separator between renderer and material names in scoped material keys.
pub const MATERIAL_SCOPE_SEPARATOR: &str = "::";

/// Registered constructors keyed by kind and type name.
#[derive(Clone, Default)]
pub struct ObjectRegistry {
    factories: HashMap<(ObjectKind, String), Factory>,
}

impl ObjectRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in object types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register (or replace) a constructor.
    pub fn register(
        &mut self,
        kind: ObjectKind,
        name: &str,
        factory: impl Fn() -> ObjectBody + Send + Sync + 'static,
    ) {
        if self.factories.insert((kind, name.to_string()), Arc::new(factory)).is_some() {
            log::debug!("Replaced {} constructor '{}'", kind, name);
        }
    }

    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Construct a fresh body for `name`, or fail with `UnknownType`.
    pub fn create(&self, kind: ObjectKind, name: &str) -> Result<ObjectBody> {
        self.factories
            .get(&(kind, name.to_string()))
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownType { kind, name: name.to_string() })
    }

    /// Construct a material, preferring a renderer-scoped registration
    /// (`"<renderer>::<material>"`) over the bare material name.
    pub fn create_material(&self, renderer_type: &str, material_type: &str) -> Result<ObjectBody> {
        let scoped = format!("{}{}{}", renderer_type, MATERIAL_SCOPE_SEPARATOR, material_type);
        if self.contains(ObjectKind::Material, &scoped) {
            return self.create(ObjectKind::Material, &scoped);
        }
        self.create(ObjectKind::Material, material_type)
    }

    fn register_builtins(&mut self) {
        self.register(ObjectKind::Geometry, "sphere", || ObjectBody::Object(Box::new(Sphere::default())));

        self.register(ObjectKind::Camera, "perspective", || {
            ObjectBody::Object(Box::new(PerspectiveCamera::default()))
        });
        self.register(ObjectKind::Camera, "orthographic", || {
            ObjectBody::Object(Box::new(OrthographicCamera::default()))
        });

        self.register(ObjectKind::Renderer, "constant", || {
            ObjectBody::Object(Box::new(ConstantRenderer::default()))
        });
        self.register(ObjectKind::Renderer, "raycast", || {
            ObjectBody::Object(Box::new(RaycastRenderer::default()))
        });

        self.register(ObjectKind::Material, "default", || ObjectBody::Object(Box::new(Material::default())));

        self.register(ObjectKind::Light, "ambient", || {
            ObjectBody::Object(Box::new(Light::new(LightKind::Ambient)))
        });
        self.register(ObjectKind::Light, "directional", || {
            ObjectBody::Object(Box::new(Light::new(LightKind::Directional)))
        });

        self.register(ObjectKind::Texture, "checker", || {
            ObjectBody::Object(Box::new(CheckerTexture::default()))
        });

        self.register(ObjectKind::TransferFunction, "piecewise_linear", || {
            ObjectBody::Object(Box::new(PiecewiseLinearTransferFunction::default()))
        });

        for name in ["naive64", "structured"] {
            self.register(ObjectKind::Volume, name, || {
                ObjectBody::Volume(Box::new(StructuredVolumeObject::default()))
            });
        }

        self.register(ObjectKind::PixelOp, "tonemap", || ObjectBody::Object(Box::new(TonemapOp::default())));
        self.register(ObjectKind::PixelOp, "frame_counter", || {
            ObjectBody::Object(Box::new(FrameCounterOp))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type() {
        let registry = ObjectRegistry::with_builtins();
        let err = registry.create(ObjectKind::Geometry, "teapot").err().unwrap();
        assert!(matches!(
            err,
            Error::UnknownType { kind: ObjectKind::Geometry, ref name } if name == "teapot"
        ));
    }

    #[test]
    fn test_builtins_registered_per_kind() {
        let registry = ObjectRegistry::with_builtins();
        assert!(registry.contains(ObjectKind::Volume, "naive64"));
        assert!(registry.contains(ObjectKind::Renderer, "constant"));
        // Names are scoped by kind.
        assert!(!registry.contains(ObjectKind::Geometry, "constant"));
    }

    #[test]
    fn test_builtin_material_and_lights_construct() {
        let registry = ObjectRegistry::with_builtins();
        for (kind, name) in [
            (ObjectKind::Material, "default"),
            (ObjectKind::Light, "ambient"),
            (ObjectKind::Light, "directional"),
        ] {
            assert!(matches!(registry.create(kind, name), Ok(ObjectBody::Object(_))), "{} {}", kind, name);
        }
    }

    #[test]
    fn test_scoped_material_preferred() {
        let mut registry = ObjectRegistry::with_builtins();
        assert!(registry.create_material("raycast", "default").is_ok());
        assert!(registry.create_material("raycast", "glass").is_err());

        registry.register(ObjectKind::Material, "raycast::glass", || {
            ObjectBody::Object(Box::new(Material::default()))
        });
        assert!(registry.create_material("raycast", "glass").is_ok());
        assert!(registry.create_material("constant", "glass").is_err());
    }
}
