//! Engine construction failures. Kept in its own test binary: the engine
//! slot is process-wide and no test here may leave an engine behind.

use std::sync::{Arc, Mutex};

use raykit::core::EngineConfig;
use raykit::engine::{EngineBuilder, EngineScene, ErrorCallback, IntersectionEngine};
use raykit::scene::Shape;
use raykit::{Device, Error, RuntimeConfig};

/// Engine that reports an internal error as soon as it gets a callback.
#[derive(Default)]
struct BrokenEngine {
    error: Mutex<Option<String>>,
}

impl IntersectionEngine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn set_error_callback(&self, callback: ErrorCallback) {
        let message = "device lost".to_string();
        callback(&message);
        *self.error.lock().unwrap() = Some(message);
    }

    fn last_error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    fn build_scene(&self, _shapes: Vec<Arc<dyn Shape>>) -> raykit::Result<Arc<dyn EngineScene>> {
        Err(Error::EngineFatal("not usable".into()))
    }

    fn release(&self) -> raykit::Result<()> {
        Ok(())
    }
}

#[test]
fn test_construction_failure_is_fatal() {
    let builder: EngineBuilder = Arc::new(|_config: &EngineConfig| Err(Error::Config("no such device".into())));
    let device = Device::with_engine_builder(RuntimeConfig::default(), builder).unwrap();

    assert!(matches!(device.commit(), Err(Error::EngineFatal(_))));
    // Not retried into success: the next commit runs the same failing builder.
    assert!(matches!(device.commit(), Err(Error::EngineFatal(_))));
}

#[test]
fn test_error_after_construction_is_fatal() {
    let builder: EngineBuilder = Arc::new(|_config: &EngineConfig| {
        let engine: Arc<dyn IntersectionEngine> = Arc::new(BrokenEngine::default());
        Ok(engine)
    });
    let device = Device::with_engine_builder(RuntimeConfig::default(), builder).unwrap();

    match device.commit() {
        Err(Error::EngineFatal(message)) => assert_eq!(message, "device lost"),
        other => panic!("expected EngineFatal, got {:?}", other.err()),
    }
}

#[test]
fn test_world_commit_without_engine_is_usage_error() {
    let builder: EngineBuilder = Arc::new(|_config: &EngineConfig| Err(Error::EngineFatal("offline".into())));
    let device = Device::with_engine_builder(RuntimeConfig::default(), builder).unwrap();
    assert!(device.commit().is_err());

    let world = device.new_world();
    assert!(matches!(device.commit_object(world), Err(Error::Usage(_))));
}

#[test]
fn test_unknown_engine_name() {
    let config = RuntimeConfig {
        engine: EngineConfig { name: "optix".into(), ..Default::default() },
        ..Default::default()
    };
    let device = Device::new(config).unwrap();
    assert!(matches!(device.commit(), Err(Error::EngineFatal(_))));
}
