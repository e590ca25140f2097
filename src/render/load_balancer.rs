//! Tiled load balancing
//!
//! A frame is cut into tiles which are rendered independently on a worker
//! pool. Exactly one balancer is active per process; committing a device
//! installs a fresh one, replacing the previous instance. Renders already in
//! flight keep the balancer they were submitted to.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rayon::prelude::*;

use crate::core::config::{validate_tile_size, RuntimeConfig};
use crate::core::types::unpoison;
use crate::core::{Error, Result};
use crate::fb::{tile_grid, LocalFrameBuffer, Tile};

use super::renderer::{render_tile, FrameContext, Renderer};

/// Shared cooperative cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Completed / total tiles of one frame.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn start(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    pub(crate) fn tile_done(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Fraction of tiles done, in [0, 1].
    pub fn fraction(&self) -> f32 {
        match self.total() {
            0 => 0.0,
            total => (self.completed() as f32 / total as f32).min(1.0),
        }
    }
}

/// Distributes the tiles of a frame over execution contexts.
pub trait TiledLoadBalancer: Send + Sync {
    fn tile_size(&self) -> u32;

    /// Render every tile of a frame into `fb`, polling `cancel` before each
    /// tile. Returns true if every tile was rendered.
    fn render_frame(
        &self,
        renderer: &dyn Renderer,
        frame: &FrameContext,
        fb: &LocalFrameBuffer,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> bool;
}

/// Balancer running tiles on an in-process rayon pool.
pub struct LocalTiledLoadBalancer {
    pool: rayon::ThreadPool,
    tile_size: u32,
}

impl LocalTiledLoadBalancer {
    /// `num_threads` of 0 uses one worker per logical core.
    pub fn new(num_threads: usize, tile_size: u32) -> Result<Self> {
        validate_tile_size(tile_size)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("raykit-tile-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("failed to build tile worker pool: {}", e)))?;
        Ok(Self { pool, tile_size })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Self::new(config.num_threads, config.tile_size)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl TiledLoadBalancer for LocalTiledLoadBalancer {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn render_frame(
        &self,
        renderer: &dyn Renderer,
        frame: &FrameContext,
        fb: &LocalFrameBuffer,
        cancel: &CancelToken,
        progress: &Progress,
    ) -> bool {
        let tiles = tile_grid(fb.size(), self.tile_size);
        progress.start(tiles.len());
        let start = Instant::now();

        self.pool.install(|| {
            tiles.par_iter().for_each(|rect| {
                if cancel.is_cancelled() {
                    return;
                }
                let mut tile = Tile::new(*rect, frame.accum_id);
                render_tile(renderer, frame, &mut tile);
                fb.write_tile(&mut tile);
                progress.tile_done();
                log::trace!("Tile {:?} done", rect.origin);
            });
        });

        let completed = progress.completed() == tiles.len();
        log::debug!(
            "Frame {} {}: {}/{} tiles in {:.1}ms",
            frame.accum_id,
            if completed { "finished" } else { "cancelled" },
            progress.completed(),
            tiles.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        completed
    }
}

static INSTANCE: RwLock<Option<Arc<dyn TiledLoadBalancer>>> = RwLock::new(None);

/// Install the process-wide balancer, replacing any previous one.
pub fn install(balancer: Arc<dyn TiledLoadBalancer>) {
    let previous = unpoison(INSTANCE.write()).replace(balancer);
    if previous.is_some() {
        log::info!("Replaced tiled load balancer");
    } else {
        log::info!("Installed tiled load balancer");
    }
}

/// The process-wide balancer, if a device has been committed.
pub fn instance() -> Option<Arc<dyn TiledLoadBalancer>> {
    unpoison(INSTANCE.read()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{UVec2, Vec3};
    use crate::engine::{IntersectionEngine, NativeEngine};
    use crate::fb::{Channel, ChannelMask, ColorFormat};
    use crate::math::{Aabb, Ray};
    use crate::render::renderer::RenderSample;
    use crate::scene::{Camera, PerspectiveCamera, WorldState};

    /// Colour encodes the ray direction, so every pixel differs.
    struct DirectionRenderer;

    impl Renderer for DirectionRenderer {
        fn render_sample(&self, _frame: &FrameContext, ray: &Ray) -> RenderSample {
            RenderSample::background((ray.direction * 0.5 + Vec3::splat(0.5)).extend(1.0))
        }
    }

    fn frame(size: UVec2) -> FrameContext {
        let camera: Arc<dyn Camera> = Arc::new(PerspectiveCamera::default());
        let scene = NativeEngine::new("").unwrap().build_scene(Vec::new()).unwrap();
        let world = Arc::new(WorldState { scene, geometries: Vec::new(), volumes: Vec::new(), bounds: Aabb::EMPTY });
        FrameContext { camera, world, size, accum_id: 0 }
    }

    fn render(threads: usize, tile_size: u32) -> Vec<f32> {
        let size = UVec2::new(37, 23);
        let fb = LocalFrameBuffer::new(size, ColorFormat::Rgba32f, ChannelMask::COLOR).unwrap();
        let balancer = LocalTiledLoadBalancer::new(threads, tile_size).unwrap();
        let progress = Progress::new();
        assert!(balancer.render_frame(&DirectionRenderer, &frame(size), &fb, &CancelToken::new(), &progress));
        assert_eq!(progress.fraction(), 1.0);

        let mapped = fb.map(Channel::Color).unwrap();
        mapped.as_f32().unwrap().to_vec()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = render(1, 8);
        assert_eq!(render(4, 8), sequential);
        // Tiling does not change the image either.
        assert_eq!(render(4, 5), sequential);
        assert!(sequential.chunks(4).any(|p| p != &sequential[..4]));
    }

    #[test]
    fn test_cancel_before_start_renders_nothing() {
        let size = UVec2::new(16, 16);
        let fb = LocalFrameBuffer::new(size, ColorFormat::Rgba32f, ChannelMask::COLOR).unwrap();
        let balancer = LocalTiledLoadBalancer::new(2, 4).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let progress = Progress::new();

        assert!(!balancer.render_frame(&DirectionRenderer, &frame(size), &fb, &cancel, &progress));
        assert_eq!(progress.completed(), 0);
        assert_eq!(progress.total(), 16);

        let mapped = fb.map(Channel::Color).unwrap();
        assert!(mapped.as_f32().unwrap().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        assert!(matches!(LocalTiledLoadBalancer::new(1, 0), Err(Error::Config(_))));
        assert!(matches!(LocalTiledLoadBalancer::new(1, u32::MAX), Err(Error::Config(_))));
    }
}
