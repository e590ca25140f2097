//! Pixel operations: per-tile post-processing attached to a frame buffer.
//!
//! A [`PixelOp`] is the committed, shareable description; each frame buffer
//! gets its own [`PixelOpInstance`] built from it.

use std::any::Any;
use std::sync::Arc;

use crate::core::types::{UVec2, Vec3};
use crate::core::Result;
use crate::object::{CommitContext, ManagedObject, ParamSet, Snapshot};

use super::channel::{ChannelMask, ColorFormat};
use super::tile::Tile;

/// What an instance is told about the frame buffer it is attached to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameBufferInfo {
    pub size: UVec2,
    pub format: ColorFormat,
    pub channels: ChannelMask,
}

/// Factory for per-frame-buffer instances.
pub trait PixelOp: Send + Sync {
    /// Build an instance for one frame buffer.
    ///
    /// `previous` is the instance being replaced, handed over by value: the
    /// new instance may take state from it or simply drop it.
    fn create_instance(
        &self,
        fb: &FrameBufferInfo,
        previous: Option<Box<dyn PixelOpInstance>>,
    ) -> Box<dyn PixelOpInstance>;
}

/// Per-frame-buffer state of a pixel operation.
pub trait PixelOpInstance: Send {
    fn begin_frame(&mut self) {}

    /// Runs on every tile after accumulation, before colour conversion.
    fn process_tile(&mut self, tile: &mut Tile);

    fn end_frame(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Exponential tone mapping followed by gamma.
///
/// Parameters: `exposure` (default 1), `gamma` (default 1).
#[derive(Clone, Debug, PartialEq)]
pub struct TonemapOp {
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for TonemapOp {
    fn default() -> Self {
        Self { exposure: 1.0, gamma: 1.0 }
    }
}

impl TonemapOp {
    pub fn apply(&self, color: Vec3) -> Vec3 {
        let mapped = Vec3::ONE - (-color * self.exposure).exp();
        mapped.powf(1.0 / self.gamma)
    }
}

impl PixelOp for TonemapOp {
    fn create_instance(
        &self,
        _fb: &FrameBufferInfo,
        _previous: Option<Box<dyn PixelOpInstance>>,
    ) -> Box<dyn PixelOpInstance> {
        Box::new(self.clone())
    }
}

impl PixelOpInstance for TonemapOp {
    fn process_tile(&mut self, tile: &mut Tile) {
        for color in &mut tile.color {
            *color = self.apply(color.truncate()).extend(color.w);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ManagedObject for TonemapOp {
    fn commit(&mut self, params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        self.exposure = params.get_f32("exposure", 1.0);
        self.gamma = params.get_f32("gamma", 1.0).max(f32::EPSILON);
        Ok(Snapshot::PixelOp(Arc::new(self.clone())))
    }
}

/// Counts completed frames. The count survives replacing one counter with
/// another on the same frame buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameCounterOp;

/// Instance state of [`FrameCounterOp`].
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: u64,
}

impl FrameCounter {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl PixelOp for FrameCounterOp {
    fn create_instance(
        &self,
        _fb: &FrameBufferInfo,
        previous: Option<Box<dyn PixelOpInstance>>,
    ) -> Box<dyn PixelOpInstance> {
        let frames = previous
            .and_then(|p| p.into_any().downcast::<FrameCounter>().ok())
            .map_or(0, |counter| counter.frames);
        Box::new(FrameCounter { frames })
    }
}

impl PixelOpInstance for FrameCounter {
    fn process_tile(&mut self, _tile: &mut Tile) {}

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ManagedObject for FrameCounterOp {
    fn commit(&mut self, _params: &ParamSet, _ctx: &CommitContext<'_>) -> Result<Snapshot> {
        Ok(Snapshot::PixelOp(Arc::new(FrameCounterOp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> FrameBufferInfo {
        FrameBufferInfo {
            size: UVec2::splat(4),
            format: ColorFormat::Rgba32f,
            channels: ChannelMask::COLOR,
        }
    }

    #[test]
    fn test_counter_keeps_previous_count() {
        let mut first = FrameCounterOp.create_instance(&info(), None);
        first.end_frame();
        first.end_frame();

        let second = FrameCounterOp.create_instance(&info(), Some(first));
        let counter = second.as_any().downcast_ref::<FrameCounter>().unwrap();
        assert_eq!(counter.frames(), 2);
    }

    #[test]
    fn test_counter_drops_foreign_instance() {
        let tonemap = TonemapOp::default().create_instance(&info(), None);
        let counter = FrameCounterOp.create_instance(&info(), Some(tonemap));
        assert_eq!(counter.as_any().downcast_ref::<FrameCounter>().unwrap().frames(), 0);
    }

    #[test]
    fn test_tonemap_is_monotone_and_bounded() {
        let op = TonemapOp { exposure: 2.0, gamma: 2.2 };
        let dark = op.apply(Vec3::splat(0.1));
        let bright = op.apply(Vec3::splat(10.0));
        assert!(dark.x < bright.x);
        assert!(bright.x <= 1.0);
        assert_eq!(op.apply(Vec3::ZERO), Vec3::ZERO);
    }
}
