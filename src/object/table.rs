//! Handle table: maps opaque handles to live entities and owns the
//! retain/release protocol.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::types::unpoison;
use crate::core::{Error, Result};

use super::entity::{Entity, ObjectBody};
use super::handle::{Handle, ObjectKind};

/// All live entities of one device.
///
/// Entities are shared as `Arc`s, so an in-flight render or a caller holding
/// a looked-up entity keeps its memory alive even after the last handle
/// reference is released. The handle itself stops resolving the moment the
/// count reaches zero.
pub struct HandleTable {
    next_id: AtomicU64,
    entries: RwLock<HashMap<Handle, Arc<Entity>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new entity with a reference count of one.
    pub fn insert(&self, kind: ObjectKind, type_name: &str, body: ObjectBody) -> Handle {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Handle::from_raw(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN));
        let entity = Arc::new(Entity::new(handle, kind, type_name, body));

        unpoison(self.entries.write()).insert(handle, entity);
        log::debug!("Created {} '{}' {:?}", kind, type_name, handle);
        handle
    }

    /// Look up a live entity.
    pub fn get(&self, handle: Handle) -> Result<Arc<Entity>> {
        unpoison(self.entries.read())
            .get(&handle)
            .cloned()
            .ok_or(Error::InvalidHandle)
    }

    /// Look up a live entity and check its type tag.
    pub fn get_kind(&self, handle: Handle, kind: ObjectKind) -> Result<Arc<Entity>> {
        let entity = self.get(handle)?;
        entity.expect_kind(kind)?;
        Ok(entity)
    }

    /// Increment a handle's reference count.
    pub fn retain(&self, handle: Handle) -> Result<()> {
        if self.get(handle)?.retain() {
            Ok(())
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// Decrement a handle's reference count, destroying it at zero.
    ///
    /// Destruction releases everything the entity referenced, transitively.
    /// Returns true if `handle` itself was destroyed.
    pub fn release(&self, handle: Handle) -> Result<bool> {
        let entity = self.get(handle)?;
        if !entity.release() {
            return Ok(false);
        }

        let mut pending = self.destroy(&entity);
        while let Some(next) = pending.pop() {
            // A referent may already be gone if it was released out of order
            // through a stale handle; nothing is left to decrement then.
            let Ok(referent) = self.get(next) else {
                log::warn!("Dangling reference to {:?} during teardown", next);
                continue;
            };
            if referent.release() {
                pending.extend(self.destroy(&referent));
            }
        }
        Ok(true)
    }

    fn destroy(&self, entity: &Arc<Entity>) -> Vec<Handle> {
        unpoison(self.entries.write()).remove(&entity.handle());
        log::debug!("Destroyed {} '{}' {:?}", entity.kind(), entity.type_name(), entity.handle());
        entity.destroy()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        unpoison(self.entries.read()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ParamValue;
    use crate::scene::World;
    use std::sync::atomic::AtomicUsize;

    fn new_world(table: &HandleTable) -> Handle {
        table.insert(ObjectKind::World, "world", ObjectBody::World(World::new()))
    }

    #[test]
    fn test_retain_release_counts() {
        let table = HandleTable::new();
        let handle = new_world(&table);
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = destroyed.clone();
        table.get(handle).unwrap().on_destroy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let retains = 3;
        for _ in 0..retains {
            table.retain(handle).unwrap();
        }
        for _ in 0..retains {
            assert!(!table.release(handle).unwrap());
            assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        }
        assert!(table.release(handle).unwrap());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(matches!(table.release(handle), Err(Error::InvalidHandle)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_destroy_releases_param_referents() {
        let table = HandleTable::new();
        let owner = new_world(&table);
        let referent = new_world(&table);

        // Assignment shares the referent.
        table.retain(referent).unwrap();
        table
            .get(owner)
            .unwrap()
            .with_params_mut(|p| p.set("child", ParamValue::Object(referent)));

        // Caller drops its own reference; the owner keeps the referent alive.
        assert!(!table.release(referent).unwrap());
        assert_eq!(table.get(referent).unwrap().ref_count(), 1);

        assert!(table.release(owner).unwrap());
        assert!(matches!(table.get(referent), Err(Error::InvalidHandle)));
    }

    #[test]
    fn test_long_reference_chain_does_not_recurse() {
        let table = HandleTable::new();
        let root = new_world(&table);
        let mut tail = root;
        for _ in 0..10_000 {
            let next = new_world(&table);
            table
                .get(tail)
                .unwrap()
                .with_params_mut(|p| p.set("next", ParamValue::Object(next)));
            tail = next;
        }
        assert!(table.release(root).unwrap());
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_kind_mismatch() {
        let table = HandleTable::new();
        let handle = new_world(&table);
        assert!(matches!(
            table.get_kind(handle, ObjectKind::Camera),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
