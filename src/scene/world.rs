//! World: the aggregate of geometry and volumes a frame is rendered from.

use std::sync::Arc;

use crate::core::Result;
use crate::engine::EngineScene;
use crate::math::Aabb;
use crate::object::{CommitContext, Handle, Snapshot};
use crate::volume::VolumeSnapshot;

use super::geometry::Shape;

/// Mutable world membership.
///
/// Members are held by handle; the world owns one reference on each entry
/// (the device retains on add and releases on remove or destruction).
#[derive(Debug, Default)]
pub struct World {
    geometries: Vec<Handle>,
    volumes: Vec<Handle>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometries(&self) -> &[Handle] {
        &self.geometries
    }

    pub fn volumes(&self) -> &[Handle] {
        &self.volumes
    }

    pub fn add_geometry(&mut self, geometry: Handle) {
        self.geometries.push(geometry);
    }

    /// Erase the first entry equal to `geometry`. Returns whether one was found.
    pub fn remove_geometry(&mut self, geometry: Handle) -> bool {
        remove_first(&mut self.geometries, geometry)
    }

    pub fn add_volume(&mut self, volume: Handle) {
        self.volumes.push(volume);
    }

    /// Erase the first entry equal to `volume`. Returns whether one was found.
    pub fn remove_volume(&mut self, volume: Handle) -> bool {
        remove_first(&mut self.volumes, volume)
    }

    /// Empty the world, returning every member it held a reference on.
    pub fn take_members(&mut self) -> Vec<Handle> {
        let mut members = std::mem::take(&mut self.geometries);
        members.append(&mut self.volumes);
        members
    }

    /// Build the engine scene over the members' committed snapshots.
    pub fn commit(&mut self, ctx: &CommitContext<'_>) -> Result<Snapshot> {
        let geometries = self
            .geometries
            .iter()
            .map(|&handle| ctx.geometry(handle))
            .collect::<Result<Vec<_>>>()?;
        let volumes = self
            .volumes
            .iter()
            .map(|&handle| ctx.volume(handle))
            .collect::<Result<Vec<_>>>()?;

        let scene = ctx.engine()?.build_scene(geometries.clone())?;
        let bounds = volumes
            .iter()
            .map(|v| v.bounds())
            .fold(scene.bounds(), |acc, b| acc.merged(&b));

        log::debug!(
            "Built world: {} geometries, {} volumes",
            geometries.len(),
            volumes.len()
        );

        Ok(Snapshot::World(Arc::new(WorldState {
            scene,
            geometries,
            volumes,
            bounds,
        })))
    }
}

fn remove_first(members: &mut Vec<Handle>, handle: Handle) -> bool {
    match members.iter().position(|&h| h == handle) {
        Some(index) => {
            members.remove(index);
            true
        }
        None => false,
    }
}

/// Committed world, read-only for the duration of a render.
pub struct WorldState {
    pub scene: Arc<dyn EngineScene>,
    /// Geometry in engine primitive order
    pub geometries: Vec<Arc<dyn Shape>>,
    pub volumes: Vec<Arc<VolumeSnapshot>>,
    pub bounds: Aabb,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;

    fn handle(raw: u64) -> Handle {
        Handle::from_raw(NonZeroU64::new(raw).unwrap())
    }

    #[test]
    fn test_remove_erases_one_entry() {
        let mut world = World::new();
        world.add_geometry(handle(1));
        world.add_geometry(handle(2));
        world.add_geometry(handle(1));

        assert!(world.remove_geometry(handle(1)));
        assert_eq!(world.geometries(), &[handle(2), handle(1)]);
        assert!(!world.remove_geometry(handle(3)));
    }

    #[test]
    fn test_take_members() {
        let mut world = World::new();
        world.add_geometry(handle(1));
        world.add_volume(handle(2));
        assert_eq!(world.take_members(), vec![handle(1), handle(2)]);
        assert!(world.geometries().is_empty() && world.volumes().is_empty());
    }

    #[test]
    fn test_commit_requires_engine() {
        let table = crate::object::HandleTable::new();
        let mut world = World::new();
        let err = world.commit(&CommitContext::new(&table, None));
        assert!(matches!(err, Err(crate::core::Error::Usage(_))));
    }
}
