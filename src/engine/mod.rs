//! Ray-intersection engine seam and the process-wide engine slot.
//!
//! The runtime only needs an engine for building world scenes. Exactly one
//! engine exists per process: it is constructed under a lock on the first
//! device commit and torn down by [`shutdown`]. Internal engine errors are
//! reported through an error callback and escalate to
//! [`Error::EngineFatal`]; they are never retried.

pub mod native;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::core::config::EngineConfig;
use crate::core::types::{unpoison, Vec3};
use crate::core::{Error, Result};
use crate::math::{Aabb, Ray};
use crate::scene::Shape;

pub use native::{NativeEngine, NativeScene};

/// Called by an engine with a description of each internal error.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Constructs an engine from its configuration.
pub type EngineBuilder = Arc<dyn Fn(&EngineConfig) -> Result<Arc<dyn IntersectionEngine>> + Send + Sync>;

/// Closest intersection found by an engine scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
    /// Index into the shape list the scene was built from
    pub primitive: usize,
}

/// An acceleration engine.
pub trait IntersectionEngine: Send + Sync {
    fn name(&self) -> &str;

    fn set_error_callback(&self, callback: ErrorCallback);

    /// Last internal error, if any occurred.
    fn last_error(&self) -> Option<String>;

    fn build_scene(&self, shapes: Vec<Arc<dyn Shape>>) -> Result<Arc<dyn EngineScene>>;

    /// Tear the engine down. Called once, by [`shutdown`].
    fn release(&self) -> Result<()>;
}

/// A built, immutable scene.
pub trait EngineScene: Send + Sync {
    fn intersect(&self, ray: &Ray) -> Option<Hit>;

    /// Any hit within the ray interval.
    fn occluded(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }

    fn bounds(&self) -> Aabb;
}

/// Builder that knows the engines shipped with the crate.
pub fn default_builder() -> EngineBuilder {
    Arc::new(|config: &EngineConfig| match config.name.as_str() {
        "native" => {
            let engine: Arc<dyn IntersectionEngine> =
                Arc::new(NativeEngine::new(&config.to_config_string())?);
            Ok(engine)
        }
        other => Err(Error::EngineFatal(format!("unknown intersection engine '{}'", other))),
    })
}

/// Holder of at most one engine instance.
pub struct EngineSlot {
    engine: Mutex<Option<Arc<dyn IntersectionEngine>>>,
}

impl EngineSlot {
    pub const fn new() -> Self {
        Self { engine: Mutex::new(None) }
    }

    /// Return the engine, constructing it first if the slot is empty.
    ///
    /// Construction happens under the slot lock, so concurrent first callers
    /// build exactly one engine.
    pub fn acquire(&self, config: &EngineConfig, builder: &EngineBuilder) -> Result<Arc<dyn IntersectionEngine>> {
        let mut slot = unpoison(self.engine.lock());
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }

        let engine = builder(config).map_err(|e| {
            log::error!("Intersection engine construction failed: {}", e);
            match e {
                Error::EngineFatal(msg) => Error::EngineFatal(msg),
                other => Error::EngineFatal(other.to_string()),
            }
        })?;
        engine.set_error_callback(Arc::new(|message: &str| {
            log::error!("Intersection engine internal error: {}", message);
        }));
        if let Some(message) = engine.last_error() {
            log::error!("Intersection engine reported an error during construction: {}", message);
            return Err(Error::EngineFatal(message));
        }

        log::info!("Intersection engine '{}' initialized ({})", engine.name(), config.to_config_string());
        *slot = Some(engine.clone());
        Ok(engine)
    }

    pub fn current(&self) -> Option<Arc<dyn IntersectionEngine>> {
        unpoison(self.engine.lock()).clone()
    }

    /// Release the engine, if any. Teardown failures are logged and swallowed.
    pub fn shutdown(&self) {
        let Some(engine) = unpoison(self.engine.lock()).take() else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| engine.release())) {
            Ok(Ok(())) => log::info!("Intersection engine '{}' released", engine.name()),
            Ok(Err(e)) => log::warn!("Ignoring intersection engine teardown error: {}", e),
            Err(_) => log::warn!("Ignoring panic during intersection engine teardown"),
        }
    }
}

impl Default for EngineSlot {
    fn default() -> Self {
        Self::new()
    }
}

static ENGINE: EngineSlot = EngineSlot::new();

/// Process-wide engine, constructed on first use.
pub fn acquire(config: &EngineConfig, builder: &EngineBuilder) -> Result<Arc<dyn IntersectionEngine>> {
    ENGINE.acquire(config, builder)
}

/// Process-wide engine, if one has been constructed.
pub fn current() -> Option<Arc<dyn IntersectionEngine>> {
    ENGINE.current()
}

/// Tear down the process-wide engine. A later [`acquire`] builds a new one.
pub fn shutdown() {
    ENGINE.shutdown();
}
