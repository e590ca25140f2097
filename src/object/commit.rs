//! Reference resolution during commit.

use std::sync::Arc;

use crate::core::{Error, Result};
use crate::engine::IntersectionEngine;
use crate::fb::{LocalFrameBuffer, PixelOp};
use crate::render::{RenderTask, Renderer};
use crate::scene::{Camera, Light, Material, Shape, Texture, TransferFunction, WorldState};
use crate::volume::VolumeSnapshot;

use super::entity::Snapshot;
use super::handle::{Handle, ObjectKind};
use super::table::HandleTable;

/// What a commit may look at besides its own parameters: the committed
/// snapshots of referenced objects and the process-wide engine.
pub struct CommitContext<'a> {
    table: &'a HandleTable,
    engine: Option<Arc<dyn IntersectionEngine>>,
}

impl<'a> CommitContext<'a> {
    pub fn new(table: &'a HandleTable, engine: Option<Arc<dyn IntersectionEngine>>) -> Self {
        Self { table, engine }
    }

    /// Published snapshot of a referenced object of the given kind.
    pub fn snapshot(&self, handle: Handle, kind: ObjectKind) -> Result<Snapshot> {
        let entity = self.table.get_kind(handle, kind)?;
        entity.snapshot().ok_or_else(|| {
            Error::Usage(format!("referenced {} {:?} has never been committed", kind, handle))
        })
    }

    pub fn engine(&self) -> Result<&Arc<dyn IntersectionEngine>> {
        self.engine
            .as_ref()
            .ok_or_else(|| Error::Usage("device must be committed before building scenes".into()))
    }

    pub fn geometry(&self, handle: Handle) -> Result<Arc<dyn Shape>> {
        match self.snapshot(handle, ObjectKind::Geometry)? {
            Snapshot::Geometry(shape) => Ok(shape),
            other => Err(mismatch(ObjectKind::Geometry, &other)),
        }
    }

    pub fn material(&self, handle: Handle) -> Result<Arc<Material>> {
        match self.snapshot(handle, ObjectKind::Material)? {
            Snapshot::Material(material) => Ok(material),
            other => Err(mismatch(ObjectKind::Material, &other)),
        }
    }

    pub fn texture(&self, handle: Handle) -> Result<Arc<dyn Texture>> {
        match self.snapshot(handle, ObjectKind::Texture)? {
            Snapshot::Texture(texture) => Ok(texture),
            other => Err(mismatch(ObjectKind::Texture, &other)),
        }
    }

    pub fn light(&self, handle: Handle) -> Result<Arc<Light>> {
        match self.snapshot(handle, ObjectKind::Light)? {
            Snapshot::Light(light) => Ok(light),
            other => Err(mismatch(ObjectKind::Light, &other)),
        }
    }

    pub fn transfer_function(&self, handle: Handle) -> Result<Arc<TransferFunction>> {
        match self.snapshot(handle, ObjectKind::TransferFunction)? {
            Snapshot::TransferFunction(tf) => Ok(tf),
            other => Err(mismatch(ObjectKind::TransferFunction, &other)),
        }
    }

    pub fn volume(&self, handle: Handle) -> Result<Arc<VolumeSnapshot>> {
        match self.snapshot(handle, ObjectKind::Volume)? {
            Snapshot::Volume(volume) => Ok(volume),
            other => Err(mismatch(ObjectKind::Volume, &other)),
        }
    }

    pub fn camera(&self, handle: Handle) -> Result<Arc<dyn Camera>> {
        match self.snapshot(handle, ObjectKind::Camera)? {
            Snapshot::Camera(camera) => Ok(camera),
            other => Err(mismatch(ObjectKind::Camera, &other)),
        }
    }

    pub fn renderer(&self, handle: Handle) -> Result<Arc<dyn Renderer>> {
        match self.snapshot(handle, ObjectKind::Renderer)? {
            Snapshot::Renderer(renderer) => Ok(renderer),
            other => Err(mismatch(ObjectKind::Renderer, &other)),
        }
    }

    pub fn world(&self, handle: Handle) -> Result<Arc<WorldState>> {
        match self.snapshot(handle, ObjectKind::World)? {
            Snapshot::World(world) => Ok(world),
            other => Err(mismatch(ObjectKind::World, &other)),
        }
    }

    pub fn pixel_op(&self, handle: Handle) -> Result<Arc<dyn PixelOp>> {
        match self.snapshot(handle, ObjectKind::PixelOp)? {
            Snapshot::PixelOp(op) => Ok(op),
            other => Err(mismatch(ObjectKind::PixelOp, &other)),
        }
    }

    /// Frame buffers are usable without a commit.
    pub fn frame_buffer(&self, handle: Handle) -> Result<Arc<LocalFrameBuffer>> {
        match self.snapshot(handle, ObjectKind::FrameBuffer)? {
            Snapshot::FrameBuffer(fb) => Ok(fb),
            other => Err(mismatch(ObjectKind::FrameBuffer, &other)),
        }
    }

    pub fn future(&self, handle: Handle) -> Result<Arc<RenderTask>> {
        match self.snapshot(handle, ObjectKind::Future)? {
            Snapshot::Future(task) => Ok(task),
            other => Err(mismatch(ObjectKind::Future, &other)),
        }
    }
}

fn mismatch(expected: ObjectKind, found: &Snapshot) -> Error {
    Error::TypeMismatch { expected, found: found.kind() }
}
