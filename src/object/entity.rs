//! Reference-counted, type-tagged runtime objects.
//!
//! An [`Entity`] is what a [`Handle`] points at. It carries the runtime type
//! tag, an atomic reference count, the uncommitted parameter map, the mutable
//! object body and the last published [`Snapshot`]. Renders only ever see
//! snapshots, so parameter edits stay invisible until the next commit.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::types::unpoison;
use crate::core::{Error, Result};
use crate::fb::{LocalFrameBuffer, PixelOp};
use crate::render::{RenderTask, Renderer};
use crate::scene::{Camera, Light, Material, Shape, Texture, TransferFunction, World, WorldState};
use crate::volume::{VolumeObject, VolumeSnapshot};

use super::commit::CommitContext;
use super::handle::{Handle, ObjectKind};
use super::param::ParamSet;

/// Behavior of a parameter-driven object type.
pub trait ManagedObject: Send + Sync {
    /// Re-derive renderer-usable state from the current parameters.
    ///
    /// Called on every commit; must not assume it runs only once.
    fn commit(&mut self, params: &ParamSet, ctx: &CommitContext<'_>) -> Result<Snapshot>;
}

/// Mutable state behind a handle, tagged by variant.
pub enum ObjectBody {
    Object(Box<dyn ManagedObject>),
    Volume(Box<dyn VolumeObject>),
    World(World),
    FrameBuffer(Arc<LocalFrameBuffer>),
    Future(Arc<RenderTask>),
}

impl ObjectBody {
    /// Take every handle this body holds a reference on (not counting parameters).
    fn take_held_refs(&mut self) -> Vec<Handle> {
        match self {
            ObjectBody::World(world) => world.take_members(),
            _ => Vec::new(),
        }
    }
}

/// Immutable, renderer-usable state published by a commit.
#[derive(Clone)]
pub enum Snapshot {
    Geometry(Arc<dyn Shape>),
    Camera(Arc<dyn Camera>),
    Renderer(Arc<dyn Renderer>),
    Material(Arc<Material>),
    Light(Arc<Light>),
    Texture(Arc<dyn Texture>),
    TransferFunction(Arc<TransferFunction>),
    Volume(Arc<VolumeSnapshot>),
    PixelOp(Arc<dyn PixelOp>),
    FrameBuffer(Arc<LocalFrameBuffer>),
    World(Arc<WorldState>),
    Future(Arc<RenderTask>),
}

impl Snapshot {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Snapshot::Geometry(_) => ObjectKind::Geometry,
            Snapshot::Camera(_) => ObjectKind::Camera,
            Snapshot::Renderer(_) => ObjectKind::Renderer,
            Snapshot::Material(_) => ObjectKind::Material,
            Snapshot::Light(_) => ObjectKind::Light,
            Snapshot::Texture(_) => ObjectKind::Texture,
            Snapshot::TransferFunction(_) => ObjectKind::TransferFunction,
            Snapshot::Volume(_) => ObjectKind::Volume,
            Snapshot::PixelOp(_) => ObjectKind::PixelOp,
            Snapshot::FrameBuffer(_) => ObjectKind::FrameBuffer,
            Snapshot::World(_) => ObjectKind::World,
            Snapshot::Future(_) => ObjectKind::Future,
        }
    }
}

type DestroyObserver = Box<dyn FnOnce(Handle) + Send>;

/// A handle-addressable object.
pub struct Entity {
    handle: Handle,
    kind: ObjectKind,
    type_name: String,
    ref_count: AtomicUsize,
    committed: AtomicBool,
    params: Mutex<ParamSet>,
    body: Mutex<ObjectBody>,
    published: RwLock<Option<Snapshot>>,
    observers: Mutex<Vec<DestroyObserver>>,
}

impl Entity {
    /// Create an entity with a reference count of one.
    ///
    /// Bodies that need no commit (frame buffers, futures) are published immediately.
    pub(crate) fn new(handle: Handle, kind: ObjectKind, type_name: &str, body: ObjectBody) -> Self {
        let published = match &body {
            ObjectBody::FrameBuffer(fb) => Some(Snapshot::FrameBuffer(fb.clone())),
            ObjectBody::Future(task) => Some(Snapshot::Future(task.clone())),
            _ => None,
        };
        let committed = published.is_some();

        Self {
            handle,
            kind,
            type_name: type_name.to_string(),
            ref_count: AtomicUsize::new(1),
            committed: AtomicBool::new(committed),
            params: Mutex::new(ParamSet::new()),
            body: Mutex::new(body),
            published: RwLock::new(published),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Registered type name this entity was created from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// True once committed and not modified since.
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Fail with `TypeMismatch` unless this entity is of `expected` kind.
    pub fn expect_kind(&self, expected: ObjectKind) -> Result<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(Error::TypeMismatch { expected, found: self.kind })
        }
    }

    /// Increment the count unless the entity is already dead.
    pub(crate) fn retain(&self) -> bool {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then_some(count + 1)
            })
            .is_ok()
    }

    /// Decrement the count. Returns true exactly once: when it reaches zero.
    pub(crate) fn release(&self) -> bool {
        match self.ref_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            (count > 0).then(|| count - 1)
        }) {
            Ok(previous) => previous == 1,
            Err(_) => false,
        }
    }

    /// Run `f` with the parameter map locked. Marks the entity as modified.
    pub(crate) fn with_params_mut<R>(&self, f: impl FnOnce(&mut ParamSet) -> R) -> R {
        let mut params = unpoison(self.params.lock());
        self.committed.store(false, Ordering::Release);
        f(&mut params)
    }

    /// Flag a change made outside the parameter map (e.g. world membership).
    pub(crate) fn mark_modified(&self) {
        self.committed.store(false, Ordering::Release);
    }

    /// Copy of the current (uncommitted) parameters.
    pub fn params(&self) -> ParamSet {
        unpoison(self.params.lock()).clone()
    }

    /// Run `f` with the mutable body locked.
    pub(crate) fn with_body<R>(&self, f: impl FnOnce(&mut ObjectBody) -> R) -> R {
        let mut body = unpoison(self.body.lock());
        f(&mut body)
    }

    /// Re-derive and publish state from the current parameters.
    pub(crate) fn commit(&self, ctx: &CommitContext<'_>) -> Result<()> {
        let params = self.params();
        let snapshot = self.with_body(|body| match body {
            ObjectBody::Object(object) => object.commit(&params, ctx).map(Some),
            ObjectBody::Volume(volume) => volume.commit(&params, ctx).map(Some),
            ObjectBody::World(world) => world.commit(ctx).map(Some),
            ObjectBody::FrameBuffer(_) | ObjectBody::Future(_) => Ok(None),
        })?;

        if let Some(snapshot) = snapshot {
            if snapshot.kind() != self.kind {
                return Err(Error::TypeMismatch { expected: self.kind, found: snapshot.kind() });
            }
            *unpoison(self.published.write()) = Some(snapshot);
        }
        self.committed.store(true, Ordering::Release);
        log::debug!("Committed {} '{}' {:?}", self.kind, self.type_name, self.handle);
        Ok(())
    }

    /// Last published state, if the entity was ever committed.
    pub fn snapshot(&self) -> Option<Snapshot> {
        unpoison(self.published.read()).clone()
    }

    /// Register a callback fired once when the entity is destroyed.
    pub fn on_destroy(&self, observer: impl FnOnce(Handle) + Send + 'static) {
        unpoison(self.observers.lock()).push(Box::new(observer));
    }

    /// Tear down: drop published state, fire observers and hand back every
    /// handle this entity held a reference on.
    pub(crate) fn destroy(&self) -> Vec<Handle> {
        let mut held = unpoison(self.params.lock()).drain_object_refs();
        held.extend(self.with_body(ObjectBody::take_held_refs));
        *unpoison(self.published.write()) = None;

        let observers = std::mem::take(&mut *unpoison(self.observers.lock()));
        for observer in observers {
            observer(self.handle);
        }
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn test_entity() -> Entity {
        let handle = Handle::from_raw(NonZeroU64::new(1).unwrap());
        Entity::new(handle, ObjectKind::World, "world", ObjectBody::World(World::new()))
    }

    #[test]
    fn test_refcount_lifecycle() {
        let entity = test_entity();
        assert_eq!(entity.ref_count(), 1);
        assert!(entity.retain());
        assert!(!entity.release());
        assert!(entity.release());
        // Dead entities neither resurrect nor report a second death.
        assert!(!entity.retain());
        assert!(!entity.release());
    }

    #[test]
    fn test_expect_kind() {
        let entity = test_entity();
        assert!(entity.expect_kind(ObjectKind::World).is_ok());
        assert!(matches!(
            entity.expect_kind(ObjectKind::Volume),
            Err(Error::TypeMismatch { expected: ObjectKind::Volume, found: ObjectKind::World })
        ));
    }

    #[test]
    fn test_param_edit_clears_committed() {
        let entity = test_entity();
        entity.committed.store(true, Ordering::Release);
        entity.with_params_mut(|p| p.set("x", crate::object::ParamValue::Int(1)));
        assert!(!entity.is_committed());
    }
}
