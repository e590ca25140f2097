//! Renderers: per-sample shading over a committed world

use std::sync::Arc;

use crate::core::types::{UVec2, Vec2, Vec3, Vec4};
use crate::core::{Error, Result};
use crate::engine::Hit;
use crate::fb::Tile;
use crate::math::Ray;
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};
use crate::scene::{Camera, Light, LightKind, WorldState};
use crate::volume::VolumeSnapshot;

use super::sampling::{pixel_jitter, sample_index};

/// Accumulated opacity at which ray marching stops.
const OPAQUE: f32 = 0.99;
/// Offset of shadow ray origins along the surface normal.
const SHADOW_EPSILON: f32 = 1e-3;

/// Everything a frame render reads, captured at submission.
#[derive(Clone)]
pub struct FrameContext {
    pub camera: Arc<dyn Camera>,
    pub world: Arc<WorldState>,
    pub size: UVec2,
    /// Accumulation pass being rendered
    pub accum_id: u32,
}

/// Result of shading one primary ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSample {
    pub color: Vec4,
    pub depth: f32,
    pub normal: Vec3,
}

impl RenderSample {
    pub fn background(color: Vec4) -> Self {
        Self { color, depth: f32::INFINITY, normal: Vec3::ZERO }
    }
}

/// Outcome of a pick query.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PickResult {
    pub hit: bool,
    /// World-space hit position; meaningless when `hit` is false.
    pub position: Vec3,
}

pub trait Renderer: Send + Sync {
    fn samples_per_pixel(&self) -> u32 {
        1
    }

    fn render_sample(&self, frame: &FrameContext, ray: &Ray) -> RenderSample;

    /// First surface under a normalized screen position.
    fn pick(&self, camera: &dyn Camera, world: &WorldState, screen: Vec2) -> PickResult {
        let ray = camera.generate_ray(screen);
        match world.scene.intersect(&ray) {
            Some(hit) => PickResult { hit: true, position: hit.position },
            None => PickResult::default(),
        }
    }
}

/// Render every pixel of a tile into its sample buffers.
pub fn render_tile(renderer: &dyn Renderer, frame: &FrameContext, tile: &mut Tile) {
    let spp = renderer.samples_per_pixel().max(1);
    let size = frame.size.as_vec2();
    let rect = tile.rect;

    for (i, pixel) in rect.pixels().enumerate() {
        let mut color = Vec4::ZERO;
        let mut depth = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for s in 0..spp {
            let p = pixel.as_vec2() + pixel_jitter(pixel, sample_index(frame.accum_id, spp, s));
            // Row 0 is the top of the image.
            let screen = Vec2::new(p.x / size.x, 1.0 - p.y / size.y);
            let sample = renderer.render_sample(frame, &frame.camera.generate_ray(screen));

            color += sample.color;
            if sample.depth < depth {
                depth = sample.depth;
                normal = sample.normal;
            }
        }

        tile.color[i] = color / spp as f32;
        tile.depth[i] = depth;
        tile.normal[i] = normal;
    }
}

/// Fills every pixel with one colour. Parameter: `color` (default opaque black).
#[derive(Clone, Debug)]
pub struct ConstantRenderer {
    pub color: Vec4,
}

impl Default for ConstantRenderer {
    fn default() -> Self {
        Self { color: Vec4::W }
    }
}

impl Renderer for ConstantRenderer {
    fn render_sample(&self, _frame: &FrameContext, _ray: &Ray) -> RenderSample {
        RenderSample::background(self.color)
    }
}

impl ManagedObject for ConstantRenderer {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        self.color = params.get_vec4f("color", Vec4::W);
        Ok(Snapshot::Renderer(Arc::new(self.clone())))
    }
}

/// Primary-ray renderer: diffuse surfaces with hard shadows, volumes
/// composited front to back.
///
/// Parameters: `bgColor`, `spp` (samples per pixel, default 1),
/// `volumeStep` (world units, 0 = half the finest grid spacing), `lights`.
#[derive(Clone)]
pub struct RaycastRenderer {
    pub background: Vec4,
    pub spp: u32,
    pub volume_step: f32,
    pub lights: Vec<Arc<Light>>,
}

impl Default for RaycastRenderer {
    fn default() -> Self {
        Self {
            background: Vec4::ZERO,
            spp: 1,
            volume_step: 0.0,
            lights: Vec::new(),
        }
    }
}

impl RaycastRenderer {
    fn shade(&self, world: &WorldState, hit: &Hit, ray: &Ray) -> Vec3 {
        let albedo = world
            .geometries
            .get(hit.primitive)
            .and_then(|shape| shape.material())
            .map_or(Vec3::splat(0.8), |material| material.albedo(hit.position));

        if self.lights.is_empty() {
            // Headlight
            return albedo * hit.normal.dot(-ray.direction).max(0.0);
        }

        let irradiance = self
            .lights
            .iter()
            .filter(|light| match light.kind {
                LightKind::Ambient => true,
                LightKind::Directional => {
                    let origin = hit.position + hit.normal * SHADOW_EPSILON;
                    !world.scene.occluded(&Ray::new(origin, -light.direction))
                }
            })
            .map(|light| light.illuminate(hit.normal))
            .sum::<Vec3>();
        albedo * irradiance
    }

    /// Front-to-back compositing of one volume into premultiplied `acc`.
    fn integrate(&self, volume: &VolumeSnapshot, ray: &Ray, t_max: f32, acc: &mut Vec4) {
        let Some((t0, t1)) = ray.with_range(ray.t_near, t_max).intersects_aabb(&volume.bounds()) else {
            return;
        };
        let spacing = volume.grid_spacing.min_element();
        let step = if self.volume_step > 0.0 { self.volume_step } else { spacing * 0.5 };

        let mut t = t0 + step * 0.5;
        while t <= t1 && acc.w < OPAQUE {
            if let Some(value) = volume.sample_world(ray.at(t)) {
                let rgba = match &volume.transfer_function {
                    Some(tf) => tf.map(value),
                    None => Vec4::new(value, value, value, value.clamp(0.0, 1.0)),
                };
                // Opacity is defined per grid cell; correct for the step length.
                let alpha = 1.0 - (1.0 - rgba.w.clamp(0.0, 1.0)).powf(step / spacing);
                let weight = (1.0 - acc.w) * alpha;
                *acc += (rgba.truncate() * weight).extend(weight);
            }
            t += step;
        }
    }
}

impl Renderer for RaycastRenderer {
    fn samples_per_pixel(&self) -> u32 {
        self.spp
    }

    fn render_sample(&self, frame: &FrameContext, ray: &Ray) -> RenderSample {
        let world = &frame.world;
        let hit = world.scene.intersect(ray);

        let surface = match &hit {
            Some(hit) => RenderSample {
                color: self.shade(world, hit, ray).extend(1.0),
                depth: hit.t,
                normal: hit.normal,
            },
            None => RenderSample::background(self.background),
        };

        let t_max = hit.map_or(ray.t_far, |h| h.t);
        let mut volume = Vec4::ZERO;
        for v in &world.volumes {
            if volume.w >= OPAQUE {
                break;
            }
            self.integrate(v, ray, t_max, &mut volume);
        }

        RenderSample {
            color: volume + surface.color * (1.0 - volume.w),
            ..surface
        }
    }
}

impl ManagedObject for RaycastRenderer {
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let spp = params.get_i32("spp", 1);
        if spp < 1 {
            return Err(Error::Usage(format!("renderer 'spp' must be at least 1, got {}", spp)));
        }

        self.background = params.get_vec4f("bgColor", Vec4::ZERO);
        self.spp = spp as u32;
        self.volume_step = params.get_f32("volumeStep", 0.0);
        self.lights = params
            .get_object_array("lights")
            .map(|handles| handles.iter().map(|&h| ctx.light(h)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Snapshot::Renderer(Arc::new(self.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{IntersectionEngine, NativeEngine};
    use crate::fb::TileRect;
    use crate::math::Aabb;
    use crate::scene::{OrthographicCamera, Sphere};
    use crate::volume::{allocate, VoxelKind};
    use crate::core::types::{IVec3, UVec3};

    fn ortho_camera() -> Arc<dyn Camera> {
        let mut camera = OrthographicCamera::default();
        let mut params = ParamSet::new();
        params.set("pos", crate::object::ParamValue::Vec3f(Vec3::new(0.0, 0.0, 5.0)));
        params.set("height", crate::object::ParamValue::Float(4.0));
        let table = crate::object::HandleTable::new();
        camera.commit(&params, &CommitContext::new(&table, None)).unwrap();
        Arc::new(camera)
    }

    fn world(volumes: Vec<Arc<VolumeSnapshot>>) -> Arc<WorldState> {
        let shapes: Vec<Arc<dyn crate::scene::Shape>> = vec![Arc::new(Sphere::default())];
        let scene = NativeEngine::new("").unwrap().build_scene(shapes.clone()).unwrap();
        Arc::new(WorldState { scene, geometries: shapes, volumes, bounds: Aabb::EMPTY })
    }

    fn frame(world: Arc<WorldState>) -> FrameContext {
        FrameContext { camera: ortho_camera(), world, size: UVec2::splat(8), accum_id: 0 }
    }

    #[test]
    fn test_constant_fills_tile() {
        let renderer = ConstantRenderer { color: Vec4::new(0.2, 0.4, 0.6, 1.0) };
        let rect = TileRect { origin: UVec2::ZERO, size: UVec2::splat(4) };
        let mut tile = Tile::new(rect, 0);
        render_tile(&renderer, &frame(world(Vec::new())), &mut tile);
        assert!(tile.color.iter().all(|c| *c == renderer.color));
        assert!(tile.depth.iter().all(|d| d.is_infinite()));
    }

    #[test]
    fn test_raycast_hits_sphere_in_centre_only() {
        let renderer = RaycastRenderer { background: Vec4::new(0.0, 0.0, 1.0, 1.0), ..Default::default() };
        let frame = frame(world(Vec::new()));

        let centre = renderer.render_sample(&frame, &Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z));
        assert!((centre.depth - 4.0).abs() < 1e-5);
        assert!((centre.color - Vec4::new(0.8, 0.8, 0.8, 1.0)).length() < 1e-5);

        let corner = renderer.render_sample(&frame, &Ray::new(Vec3::new(1.9, 1.9, 5.0), Vec3::NEG_Z));
        assert_eq!(corner.color, renderer.background);
    }

    #[test]
    fn test_directional_light_shadowed_side_is_dark() {
        let mut light = Light::new(LightKind::Directional);
        light.direction = Vec3::NEG_Z;
        let renderer = RaycastRenderer { lights: vec![Arc::new(light)], ..Default::default() };
        let frame = frame(world(Vec::new()));

        let lit = renderer.render_sample(&frame, &Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z));
        assert!(lit.color.x > 0.7);
        let back = renderer.render_sample(&frame, &Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z));
        assert_eq!(back.color.truncate(), Vec3::ZERO);
    }

    #[test]
    fn test_opaque_volume_hides_surface() {
        let data = allocate(VoxelKind::F32, UVec3::splat(2)).unwrap();
        data.set_region_bytes(IVec3::ZERO, IVec3::splat(2), VoxelKind::F32, bytemuck::cast_slice(&[1.0f32; 8]))
            .unwrap();
        let volume = Arc::new(VolumeSnapshot {
            data,
            grid_origin: Vec3::new(-1.0, -1.0, 2.0),
            grid_spacing: Vec3::splat(2.0),
            transfer_function: None,
        });
        let renderer = RaycastRenderer::default();
        let frame = frame(world(vec![volume]));

        let sample = renderer.render_sample(&frame, &Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z));
        assert!(sample.color.w > OPAQUE);
        assert!((sample.color.x - sample.color.w).abs() < 1e-3);
    }

    #[test]
    fn test_pick() {
        let renderer = ConstantRenderer::default();
        let camera = ortho_camera();
        let world = world(Vec::new());

        let centre = renderer.pick(camera.as_ref(), &world, Vec2::splat(0.5));
        assert!(centre.hit);
        assert!((centre.position - Vec3::Z).length() < 1e-5);
        assert!(!renderer.pick(camera.as_ref(), &world, Vec2::ZERO).hit);
    }
}
