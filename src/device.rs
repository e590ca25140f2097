//! Device: the handle-based API over the object model, volumes, frame
//! buffers and render tasks.
//!
//! Every operation takes opaque handles. Handles are resolved through the
//! device's handle table and checked against their stored type tag, so a
//! stale handle fails with `InvalidHandle` and a handle of the wrong kind
//! fails with `TypeMismatch`.

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::core::config::RuntimeConfig;
use crate::core::types::{unpoison, IVec2, IVec3, UVec2, Vec2, Vec3, Vec4};
use crate::core::{Error, Result};
use crate::engine::{self, EngineBuilder, IntersectionEngine};
use crate::fb::{Channel, ChannelMask, ColorFormat, CompletionEvent, LocalFrameBuffer, MappedChannel};
use crate::object::{
    CameraHandle, CommitContext, Entity, FrameBufferHandle, FutureHandle, GeometryHandle, Handle,
    HandleTable, LightHandle, MaterialHandle, ObjectBody, ObjectKind, ObjectRegistry, ParamValue,
    PixelOpHandle, RendererHandle, TextureHandle, TransferFunctionHandle, TypedHandle, VolumeHandle,
    WorldHandle,
};
use crate::render::load_balancer::{self, LocalTiledLoadBalancer, TiledLoadBalancer};
use crate::render::{FrameContext, PickResult, RenderTask, TaskState};
use crate::scene::World;
use crate::volume::VoxelType;

/// Entry point of the runtime.
pub struct Device {
    config: RuntimeConfig,
    registry: RwLock<ObjectRegistry>,
    table: HandleTable,
    engine_builder: EngineBuilder,
    engine: RwLock<Option<Arc<dyn IntersectionEngine>>>,
}

impl Device {
    /// Create a device with the built-in object types and engines.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_engine_builder(config, engine::default_builder())
    }

    /// Create a device that constructs its intersection engine with `builder`.
    ///
    /// The engine is process-wide: the builder only runs if no engine exists
    /// yet when the device is first committed.
    pub fn with_engine_builder(config: RuntimeConfig, builder: EngineBuilder) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: RwLock::new(ObjectRegistry::with_builtins()),
            table: HandleTable::new(),
            engine_builder: builder,
            engine: RwLock::new(None),
        })
    }

    /// Load the configuration from a JSON file and create a device from it.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(RuntimeConfig::load_sync(path)?)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Activate the device: acquire the process-wide intersection engine and
    /// install a fresh tiled load balancer.
    ///
    /// Engine construction failures are fatal and surface as `EngineFatal`.
    pub fn commit(&self) -> Result<()> {
        let engine = engine::acquire(&self.config.engine, &self.engine_builder)?;
        *unpoison(self.engine.write()) = Some(engine);

        let balancer = LocalTiledLoadBalancer::from_config(&self.config)?;
        log::info!(
            "Device committed: {} tile workers, {}px tiles",
            balancer.num_threads(),
            balancer.tile_size()
        );
        load_balancer::install(Arc::new(balancer));
        Ok(())
    }

    /// Register (or replace) a constructor for `name` under `kind`.
    pub fn register_type(
        &self,
        kind: ObjectKind,
        name: &str,
        factory: impl Fn() -> ObjectBody + Send + Sync + 'static,
    ) {
        unpoison(self.registry.write()).register(kind, name, factory);
    }

    fn context(&self) -> CommitContext<'_> {
        let engine = unpoison(self.engine.read()).clone().or_else(engine::current);
        CommitContext::new(&self.table, engine)
    }

    fn entity<H: TypedHandle>(&self, handle: H) -> Result<Arc<Entity>> {
        self.table.get_kind(handle.into(), H::KIND)
    }

    fn create<H: TypedHandle>(&self, type_name: &str) -> Result<H> {
        let body = unpoison(self.registry.read()).create(H::KIND, type_name)?;
        Ok(H::from_handle(self.table.insert(H::KIND, type_name, body)))
    }

    // Object creation

    pub fn new_geometry(&self, type_name: &str) -> Result<GeometryHandle> {
        self.create(type_name)
    }

    pub fn new_camera(&self, type_name: &str) -> Result<CameraHandle> {
        self.create(type_name)
    }

    pub fn new_renderer(&self, type_name: &str) -> Result<RendererHandle> {
        self.create(type_name)
    }

    pub fn new_light(&self, type_name: &str) -> Result<LightHandle> {
        self.create(type_name)
    }

    pub fn new_texture(&self, type_name: &str) -> Result<TextureHandle> {
        self.create(type_name)
    }

    pub fn new_transfer_function(&self, type_name: &str) -> Result<TransferFunctionHandle> {
        self.create(type_name)
    }

    pub fn new_volume(&self, type_name: &str) -> Result<VolumeHandle> {
        self.create(type_name)
    }

    pub fn new_pixel_op(&self, type_name: &str) -> Result<PixelOpHandle> {
        self.create(type_name)
    }

    pub fn new_world(&self) -> WorldHandle {
        WorldHandle::from_handle(self.table.insert(ObjectKind::World, "world", ObjectBody::World(World::new())))
    }

    /// Material for a renderer type, preferring a renderer-scoped registration.
    pub fn new_material(&self, renderer_type: &str, material_type: &str) -> Result<MaterialHandle> {
        let body = unpoison(self.registry.read()).create_material(renderer_type, material_type)?;
        Ok(MaterialHandle::from_handle(self.table.insert(ObjectKind::Material, material_type, body)))
    }

    /// Material for the type of an existing renderer.
    pub fn new_material_for(&self, renderer: RendererHandle, material_type: &str) -> Result<MaterialHandle> {
        let renderer_type = self.entity(renderer)?.type_name().to_string();
        self.new_material(&renderer_type, material_type)
    }

    /// Allocate a frame buffer with only the requested channels.
    pub fn frame_buffer_create(&self, size: UVec2, format: ColorFormat, channels: ChannelMask) -> Result<FrameBufferHandle> {
        let fb = Arc::new(LocalFrameBuffer::new(size, format, channels)?);
        let handle = self.table.insert(ObjectKind::FrameBuffer, "local", ObjectBody::FrameBuffer(fb));
        Ok(FrameBufferHandle::from_handle(handle))
    }

    // Parameters

    /// Store a parameter. Unknown names are kept and ignored by commit.
    ///
    /// Object references retain the new referent(s) and release whatever the
    /// parameter referenced before.
    pub fn set_param(&self, object: impl Into<Handle>, name: &str, value: ParamValue) -> Result<()> {
        let entity = self.table.get(object.into())?;

        let referents = value.handles();
        for (i, &referent) in referents.iter().enumerate() {
            if let Err(e) = self.table.retain(referent) {
                self.release_all(&referents[..i]);
                return Err(e);
            }
        }

        if let Some(replaced) = entity.with_params_mut(|params| params.set(name, value)) {
            self.release_all(&replaced.handles());
        }
        Ok(())
    }

    /// Drop a parameter, releasing its referent if it held one. Removing a
    /// missing parameter is a no-op.
    pub fn remove_param(&self, object: impl Into<Handle>, name: &str) -> Result<()> {
        let entity = self.table.get(object.into())?;
        if let Some(removed) = entity.with_params_mut(|params| params.remove(name)) {
            self.release_all(&removed.handles());
        }
        Ok(())
    }

    fn release_all(&self, handles: &[Handle]) {
        for &handle in handles {
            if let Err(e) = self.table.release(handle) {
                log::warn!("Releasing referent {:?} failed: {}", handle, e);
            }
        }
    }

    pub fn set_string(&self, object: impl Into<Handle>, name: &str, value: &str) -> Result<()> {
        self.set_param(object, name, ParamValue::String(value.to_string()))
    }

    pub fn set_bool(&self, object: impl Into<Handle>, name: &str, value: bool) -> Result<()> {
        self.set_param(object, name, ParamValue::Bool(value))
    }

    pub fn set_int(&self, object: impl Into<Handle>, name: &str, value: i32) -> Result<()> {
        self.set_param(object, name, ParamValue::Int(value))
    }

    pub fn set_float(&self, object: impl Into<Handle>, name: &str, value: f32) -> Result<()> {
        self.set_param(object, name, ParamValue::Float(value))
    }

    pub fn set_vec2f(&self, object: impl Into<Handle>, name: &str, value: Vec2) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec2f(value))
    }

    pub fn set_vec3f(&self, object: impl Into<Handle>, name: &str, value: Vec3) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec3f(value))
    }

    pub fn set_vec4f(&self, object: impl Into<Handle>, name: &str, value: Vec4) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec4f(value))
    }

    pub fn set_vec2i(&self, object: impl Into<Handle>, name: &str, value: IVec2) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec2i(value))
    }

    pub fn set_vec3i(&self, object: impl Into<Handle>, name: &str, value: IVec3) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec3i(value))
    }

    /// Opaque host pointer, stored as an address and never dereferenced.
    pub fn set_void_ptr(&self, object: impl Into<Handle>, name: &str, address: usize) -> Result<()> {
        self.set_param(object, name, ParamValue::VoidPtr(address))
    }

    pub fn set_float_array(&self, object: impl Into<Handle>, name: &str, values: &[f32]) -> Result<()> {
        self.set_param(object, name, ParamValue::FloatArray(values.into()))
    }

    pub fn set_vec3f_array(&self, object: impl Into<Handle>, name: &str, values: &[Vec3]) -> Result<()> {
        self.set_param(object, name, ParamValue::Vec3fArray(values.into()))
    }

    pub fn set_object(&self, object: impl Into<Handle>, name: &str, referent: impl Into<Handle>) -> Result<()> {
        self.set_param(object, name, ParamValue::Object(referent.into()))
    }

    pub fn set_object_array(&self, object: impl Into<Handle>, name: &str, referents: &[Handle]) -> Result<()> {
        self.set_param(object, name, ParamValue::ObjectArray(referents.into()))
    }

    /// Assign a material to a geometry.
    pub fn set_material(&self, geometry: GeometryHandle, material: MaterialHandle) -> Result<()> {
        self.entity(geometry)?;
        self.entity(material)?;
        self.set_object(geometry, "material", material)
    }

    /// Set the lights a renderer shades with.
    pub fn set_lights(&self, renderer: RendererHandle, lights: &[LightHandle]) -> Result<()> {
        self.entity(renderer)?;
        for &light in lights {
            self.entity(light)?;
        }
        let handles: Vec<Handle> = lights.iter().map(|&l| l.into()).collect();
        self.set_object_array(renderer, "lights", &handles)
    }

    /// Publish an object's current parameters. May be called any number of times.
    pub fn commit_object(&self, object: impl Into<Handle>) -> Result<()> {
        let entity = self.table.get(object.into())?;
        entity.commit(&self.context())
    }

    // Lifetimes

    /// Drop one reference. `None` is a no-op.
    pub fn release<H: Into<Handle>>(&self, object: Option<H>) -> Result<()> {
        match object {
            Some(object) => self.table.release(object.into()).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Add one reference.
    pub fn retain(&self, object: impl Into<Handle>) -> Result<()> {
        self.table.retain(object.into())
    }

    pub fn ref_count(&self, object: impl Into<Handle>) -> Result<usize> {
        Ok(self.table.get(object.into())?.ref_count())
    }

    /// Run `observer` once when the object is destroyed.
    pub fn on_destroy(&self, object: impl Into<Handle>, observer: impl FnOnce(Handle) + Send + 'static) -> Result<()> {
        self.table.get(object.into())?.on_destroy(observer);
        Ok(())
    }

    /// Live objects on this device.
    pub fn live_objects(&self) -> usize {
        self.table.len()
    }

    // World membership

    fn with_world<R>(&self, world: WorldHandle, f: impl FnOnce(&mut World) -> R) -> Result<R> {
        let entity = self.entity(world)?;
        entity.mark_modified();
        entity.with_body(|body| match body {
            ObjectBody::World(w) => Ok(f(w)),
            _ => Err(Error::TypeMismatch { expected: ObjectKind::World, found: entity.kind() }),
        })
    }

    pub fn add_geometry(&self, world: WorldHandle, geometry: GeometryHandle) -> Result<()> {
        self.entity(geometry)?;
        self.retain(geometry)?;
        self.with_world(world, |w| w.add_geometry(geometry.into()))
            .inspect_err(|_| self.release_all(&[geometry.into()]))
    }

    /// Remove the first occurrence of `geometry`. Returns whether one was found.
    pub fn remove_geometry(&self, world: WorldHandle, geometry: GeometryHandle) -> Result<bool> {
        let removed = self.with_world(world, |w| w.remove_geometry(geometry.into()))?;
        if removed {
            self.release_all(&[geometry.into()]);
        }
        Ok(removed)
    }

    pub fn add_volume(&self, world: WorldHandle, volume: VolumeHandle) -> Result<()> {
        self.entity(volume)?;
        self.retain(volume)?;
        self.with_world(world, |w| w.add_volume(volume.into()))
            .inspect_err(|_| self.release_all(&[volume.into()]))
    }

    /// Remove the first occurrence of `volume`. Returns whether one was found.
    pub fn remove_volume(&self, world: WorldHandle, volume: VolumeHandle) -> Result<bool> {
        let removed = self.with_world(world, |w| w.remove_volume(volume.into()))?;
        if removed {
            self.release_all(&[volume.into()]);
        }
        Ok(removed)
    }

    // Volume data

    /// Overwrite the voxels in `[origin, origin + extent)` with `source`
    /// (x fastest). Fails with `InvalidRegion`, leaving the data untouched,
    /// if the box does not fit or `source` has the wrong length.
    ///
    /// Writes go to shared storage and are visible to committed snapshots.
    pub fn set_region<T: VoxelType>(&self, volume: VolumeHandle, origin: IVec3, extent: IVec3, source: &[T]) -> Result<()> {
        self.set_region_bytes(volume, origin, extent, T::KIND, bytemuck::cast_slice(source))
    }

    /// Byte-level region write; `bytes` must hold voxels of `kind`.
    pub fn set_region_bytes(
        &self,
        volume: VolumeHandle,
        origin: IVec3,
        extent: IVec3,
        kind: crate::volume::VoxelKind,
        bytes: &[u8],
    ) -> Result<()> {
        let entity = self.entity(volume)?;
        let params = entity.params();
        entity.with_body(|body| match body {
            ObjectBody::Volume(v) => v.set_region_bytes(&params, origin, extent, kind, bytes),
            _ => Err(Error::TypeMismatch { expected: ObjectKind::Volume, found: entity.kind() }),
        })
    }

    /// Sample a committed volume at world positions. Positions outside the
    /// grid yield 0.
    pub fn sample_volume(&self, volume: VolumeHandle, world_coords: &[Vec3], results: &mut [f32]) -> Result<()> {
        self.context().volume(volume.into())?.compute_samples(world_coords, results)
    }

    // Frame buffers

    pub fn frame_buffer(&self, fb: FrameBufferHandle) -> Result<Arc<LocalFrameBuffer>> {
        self.context().frame_buffer(fb.into())
    }

    /// Reset accumulation and variance. The pixel operation is kept.
    pub fn reset_accumulation(&self, fb: FrameBufferHandle) -> Result<()> {
        self.frame_buffer(fb)?.clear();
        Ok(())
    }

    /// Run `f` on a read-only view of one channel; tile writes wait until it returns.
    pub fn map_frame_buffer<R>(&self, fb: FrameBufferHandle, channel: Channel, f: impl FnOnce(&MappedChannel<'_>) -> R) -> Result<R> {
        let fb = self.frame_buffer(fb)?;
        let mapped = fb.map(channel)?;
        let result = f(&mapped);
        fb.unmap(mapped);
        Ok(result)
    }

    /// Attach a committed pixel operation. The frame buffer keeps a
    /// reference on it until replaced or destroyed.
    pub fn set_pixel_op(&self, fb: FrameBufferHandle, op: PixelOpHandle) -> Result<()> {
        let frame_buffer = self.frame_buffer(fb)?;
        let pixel_op = self.context().pixel_op(op.into())?;
        self.set_object(fb, "pixelOp", op)?;
        frame_buffer.set_pixel_op(pixel_op.as_ref());
        Ok(())
    }

    /// Current variance estimate; 0 before two passes have accumulated.
    pub fn get_variance(&self, fb: FrameBufferHandle) -> Result<f32> {
        Ok(self.frame_buffer(fb)?.variance())
    }

    pub fn save_frame_buffer(&self, fb: FrameBufferHandle, path: &Path) -> Result<()> {
        self.frame_buffer(fb)?.save_png(path)
    }

    // Rendering

    /// Start rendering one accumulation pass into `fb`.
    ///
    /// Renderer, camera and world are captured as committed; later edits do
    /// not affect the render. Fails with `Usage` if `fb` is busy or the
    /// device was never committed.
    pub fn render_frame_async(
        &self,
        fb: FrameBufferHandle,
        renderer: RendererHandle,
        camera: CameraHandle,
        world: WorldHandle,
    ) -> Result<FutureHandle> {
        let ctx = self.context();
        let frame_buffer = ctx.frame_buffer(fb.into())?;
        let renderer = ctx.renderer(renderer.into())?;
        let frame = FrameContext {
            camera: ctx.camera(camera.into())?,
            world: ctx.world(world.into())?,
            size: frame_buffer.size(),
            accum_id: frame_buffer.accumulated_frames(),
        };
        let balancer: Arc<dyn TiledLoadBalancer> = load_balancer::instance()
            .ok_or_else(|| Error::Usage("device must be committed before rendering".into()))?;

        let task = RenderTask::submit(frame_buffer, renderer, frame, balancer)?;
        let handle = self.table.insert(ObjectKind::Future, "future", ObjectBody::Future(task));
        Ok(FutureHandle::from_handle(handle))
    }

    fn task(&self, future: FutureHandle) -> Result<Arc<RenderTask>> {
        self.context().future(future.into())
    }

    pub fn is_ready(&self, future: FutureHandle) -> Result<bool> {
        Ok(self.task(future)?.is_ready())
    }

    pub fn wait(&self, future: FutureHandle, event: CompletionEvent) -> Result<()> {
        self.task(future)?.wait(event);
        Ok(())
    }

    pub fn cancel(&self, future: FutureHandle) -> Result<()> {
        self.task(future)?.cancel();
        Ok(())
    }

    pub fn get_progress(&self, future: FutureHandle) -> Result<f32> {
        Ok(self.task(future)?.progress())
    }

    pub fn task_state(&self, future: FutureHandle) -> Result<TaskState> {
        Ok(self.task(future)?.state())
    }

    /// Render one pass synchronously and return the variance estimate.
    pub fn render_frame(
        &self,
        fb: FrameBufferHandle,
        renderer: RendererHandle,
        camera: CameraHandle,
        world: WorldHandle,
    ) -> Result<f32> {
        let future = self.render_frame_async(fb, renderer, camera, world)?;
        self.wait(future, CompletionEvent::FrameFinished)?;
        self.release(Some(future))?;
        self.get_variance(fb)
    }

    /// First surface under a normalized screen position ((0, 0) is the
    /// lower-left corner).
    pub fn pick(
        &self,
        fb: FrameBufferHandle,
        renderer: RendererHandle,
        camera: CameraHandle,
        world: WorldHandle,
        screen: Vec2,
    ) -> Result<PickResult> {
        let ctx = self.context();
        ctx.frame_buffer(fb.into())?;
        let renderer = ctx.renderer(renderer.into())?;
        let camera = ctx.camera(camera.into())?;
        let world = ctx.world(world.into())?;
        Ok(renderer.pick(camera.as_ref(), &world, screen))
    }
}
