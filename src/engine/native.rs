//! Built-in brute-force engine.
//!
//! Tests every primitive whose bounding box the ray enters. Adequate for the
//! small scenes the built-in geometry produces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::types::unpoison;
use crate::core::{Error, Result};
use crate::math::{Aabb, Ray};
use crate::scene::Shape;

use super::{EngineScene, ErrorCallback, Hit, IntersectionEngine};

/// Engine configuration keys understood by [`NativeEngine`].
const CONFIG_KEYS: [&str; 3] = ["threads", "verbose", "set_affinity"];

pub struct NativeEngine {
    config: String,
    verbose: u32,
    error_callback: Mutex<Option<ErrorCallback>>,
    last_error: Mutex<Option<String>>,
    released: AtomicBool,
}

impl NativeEngine {
    /// Create from a `key=value,...` configuration string.
    pub fn new(config: &str) -> Result<Self> {
        let mut verbose = 0;
        for entry in config.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| Error::EngineFatal(format!("malformed engine option '{}'", entry)))?;
            if !CONFIG_KEYS.contains(&key) {
                return Err(Error::EngineFatal(format!("unknown engine option '{}'", key)));
            }
            let value: u32 = value
                .parse()
                .map_err(|_| Error::EngineFatal(format!("engine option '{}' is not a number", key)))?;
            if key == "verbose" {
                verbose = value;
            }
        }

        Ok(Self {
            config: config.to_string(),
            verbose,
            error_callback: Mutex::new(None),
            last_error: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    /// Record an internal error, notify the callback and produce the fatal error.
    fn fail(&self, message: String) -> Error {
        if let Some(callback) = unpoison(self.error_callback.lock()).as_ref() {
            callback(&message);
        }
        *unpoison(self.last_error.lock()) = Some(message.clone());
        Error::EngineFatal(message)
    }
}

impl IntersectionEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn set_error_callback(&self, callback: ErrorCallback) {
        *unpoison(self.error_callback.lock()) = Some(callback);
    }

    fn last_error(&self) -> Option<String> {
        unpoison(self.last_error.lock()).clone()
    }

    fn build_scene(&self, shapes: Vec<Arc<dyn Shape>>) -> Result<Arc<dyn EngineScene>> {
        if self.released.load(Ordering::Acquire) {
            return Err(self.fail("scene build on a released engine".into()));
        }

        let bounds: Vec<Aabb> = shapes.iter().map(|s| s.bounds()).collect();
        if let Some(index) = bounds.iter().position(|b| !b.is_valid()) {
            return Err(self.fail(format!("primitive {} has invalid bounds", index)));
        }

        if self.verbose > 0 {
            log::debug!("Native engine building scene with {} primitives", shapes.len());
        }
        let total = bounds.iter().fold(Aabb::EMPTY, |acc, b| acc.merged(b));
        Ok(Arc::new(NativeScene { shapes, bounds, total }))
    }

    fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(self.fail("engine released twice".into()));
        }
        Ok(())
    }
}

/// Flat primitive list with per-primitive bounds.
pub struct NativeScene {
    shapes: Vec<Arc<dyn Shape>>,
    bounds: Vec<Aabb>,
    total: Aabb,
}

impl NativeScene {
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl EngineScene for NativeScene {
    fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let mut ray = *ray;
        let mut closest = None;

        for (index, (shape, bounds)) in self.shapes.iter().zip(&self.bounds).enumerate() {
            if ray.intersects_aabb(bounds).is_none() {
                continue;
            }
            if let Some(hit) = shape.intersect(&ray) {
                ray.t_far = hit.t;
                closest = Some(Hit {
                    t: hit.t,
                    position: ray.at(hit.t),
                    normal: hit.normal,
                    primitive: index,
                });
            }
        }
        closest
    }

    fn bounds(&self) -> Aabb {
        self.total
    }
}
