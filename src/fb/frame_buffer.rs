//! Local frame buffer: channel storage, accumulation, variance and the
//! completion event.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, RwLock, RwLockReadGuard};

use bytemuck::{Pod, Zeroable};

use crate::core::types::{unpoison, UVec2, Vec3, Vec4};
use crate::core::{Error, Result};

use super::channel::{Channel, ChannelMask, ColorFormat, CompletionEvent};
use super::pixel_op::{FrameBufferInfo, PixelOp, PixelOpInstance};
use super::tile::Tile;

/// Welford running statistics of one pixel's per-pass luminance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LuminanceStats {
    pub mean: f32,
    pub m2: f32,
}

enum ColorBuffer {
    None,
    Rgba8(Vec<[u8; 4]>),
    Rgba32f(Vec<Vec4>),
}

struct Storage {
    color: ColorBuffer,
    depth: Option<Vec<f32>>,
    normal: Option<Vec<Vec3>>,
    accum: Option<Vec<Vec4>>,
    variance: Option<Vec<LuminanceStats>>,
    /// Per pixel: accumulation passes folded in (last `accum_id` + 1)
    written: Option<Vec<u32>>,
    /// Accumulated mean and statistics before the pixel's latest pass, so a
    /// pass re-run after a cancel replaces its partial writes
    accum_prev: Option<Vec<Vec4>>,
    variance_prev: Option<Vec<LuminanceStats>>,
}

/// Frame buffer living in host memory.
pub struct LocalFrameBuffer {
    info: FrameBufferInfo,
    storage: RwLock<Storage>,
    pixel_op: Mutex<Option<Box<dyn PixelOpInstance>>>,
    /// Completed accumulation passes since the last clear
    accumulated: AtomicU32,
    event: Mutex<CompletionEvent>,
    event_changed: Condvar,
    busy: AtomicBool,
}

impl LocalFrameBuffer {
    /// Allocate storage for the requested channels only.
    pub fn new(size: UVec2, format: ColorFormat, channels: ChannelMask) -> Result<Self> {
        if size.cmpeq(UVec2::ZERO).any() {
            return Err(Error::Usage(format!("frame buffer size {} has an empty axis", size)));
        }
        let n = size.x as usize * size.y as usize;

        let color = match format {
            _ if !channels.contains(Channel::Color) => ColorBuffer::None,
            ColorFormat::None => ColorBuffer::None,
            ColorFormat::Rgba8 | ColorFormat::Srgba => ColorBuffer::Rgba8(vec![[0; 4]; n]),
            ColorFormat::Rgba32f => ColorBuffer::Rgba32f(vec![Vec4::ZERO; n]),
        };
        let has_accum = channels.contains(Channel::Accum);
        let has_variance = channels.contains(Channel::Variance);
        let storage = Storage {
            color,
            depth: channels.contains(Channel::Depth).then(|| vec![f32::INFINITY; n]),
            normal: channels.contains(Channel::Normal).then(|| vec![Vec3::ZERO; n]),
            accum: has_accum.then(|| vec![Vec4::ZERO; n]),
            variance: has_variance.then(|| vec![LuminanceStats::default(); n]),
            written: (has_accum || has_variance).then(|| vec![0; n]),
            accum_prev: has_accum.then(|| vec![Vec4::ZERO; n]),
            variance_prev: has_variance.then(|| vec![LuminanceStats::default(); n]),
        };

        Ok(Self {
            info: FrameBufferInfo { size, format, channels },
            storage: RwLock::new(storage),
            pixel_op: Mutex::new(None),
            accumulated: AtomicU32::new(0),
            event: Mutex::new(CompletionEvent::NoneFinished),
            event_changed: Condvar::new(),
            busy: AtomicBool::new(false),
        })
    }

    pub fn info(&self) -> FrameBufferInfo {
        self.info
    }

    pub fn size(&self) -> UVec2 {
        self.info.size
    }

    pub fn format(&self) -> ColorFormat {
        self.info.format
    }

    pub fn channels(&self) -> ChannelMask {
        self.info.channels
    }

    /// Completed accumulation passes since the last clear. Also the
    /// accumulation index of the next pass.
    pub fn accumulated_frames(&self) -> u32 {
        self.accumulated.load(Ordering::Acquire)
    }

    /// Reset accumulation: counter, accumulated colour and variance state.
    /// The pixel operation is left alone.
    pub fn clear(&self) {
        let mut storage = unpoison(self.storage.write());
        if let Some(accum) = storage.accum.as_mut() {
            accum.fill(Vec4::ZERO);
        }
        if let Some(variance) = storage.variance.as_mut() {
            variance.fill(LuminanceStats::default());
        }
        if let Some(written) = storage.written.as_mut() {
            written.fill(0);
        }
        self.accumulated.store(0, Ordering::Release);
    }

    /// Replace the pixel operation, handing the old instance to the factory.
    pub fn set_pixel_op(&self, op: &dyn PixelOp) {
        let mut slot = unpoison(self.pixel_op.lock());
        let previous = slot.take();
        *slot = Some(op.create_instance(&self.info, previous));
    }

    /// Inspect the current pixel operation instance.
    pub fn with_pixel_op<R>(&self, f: impl FnOnce(Option<&dyn PixelOpInstance>) -> R) -> R {
        let slot = unpoison(self.pixel_op.lock());
        f(slot.as_deref())
    }

    /// Read-only view of one channel. Tile writes block while it is held.
    pub fn map(&self, channel: Channel) -> Result<MappedChannel<'_>> {
        let storage = unpoison(self.storage.read());
        let present = match channel {
            Channel::Color => !matches!(storage.color, ColorBuffer::None),
            Channel::Depth => storage.depth.is_some(),
            Channel::Normal => storage.normal.is_some(),
            Channel::Accum => storage.accum.is_some(),
            Channel::Variance => storage.variance.is_some(),
        };
        if !present {
            return Err(Error::ChannelNotPresent(channel));
        }
        Ok(MappedChannel { storage, channel })
    }

    /// Release a mapping.
    pub fn unmap(&self, mapped: MappedChannel<'_>) {
        drop(mapped);
    }

    /// Merge a rendered tile: accumulate, update variance statistics, run
    /// the pixel operation and convert into the colour format.
    pub fn write_tile(&self, tile: &mut Tile) {
        let width = self.info.size.x as usize;
        let rect = tile.rect;
        let mut storage = unpoison(self.storage.write());
        let Storage { accum, variance, written, accum_prev, variance_prev, depth, normal, .. } = &mut *storage;
        let n = tile.accum_id as f32 + 1.0;
        let pass_mark = tile.accum_id.wrapping_add(1);

        for (i, pixel) in rect.pixels().enumerate() {
            let index = pixel.y as usize * width + pixel.x as usize;
            let sample = tile.color[i];
            // Same pass again (the earlier attempt was cancelled): blend from
            // the state before that attempt instead of on top of it.
            let rewrite = written.as_ref().is_some_and(|w| w[index] == pass_mark);

            if let (Some(accum), Some(prev)) = (accum.as_mut(), accum_prev.as_mut()) {
                if !rewrite {
                    prev[index] = accum[index];
                }
                let base = prev[index];
                let mean = if tile.accum_id == 0 { sample } else { base + (sample - base) / n };
                accum[index] = mean;
                tile.color[i] = mean;
            }

            if let (Some(variance), Some(prev)) = (variance.as_mut(), variance_prev.as_mut()) {
                if !rewrite {
                    prev[index] = variance[index];
                }
                let l = luminance(sample.truncate());
                variance[index] = if tile.accum_id == 0 {
                    LuminanceStats { mean: l, m2: 0.0 }
                } else {
                    let base = prev[index];
                    let delta = l - base.mean;
                    let mean = base.mean + delta / n;
                    LuminanceStats { mean, m2: base.m2 + delta * (l - mean) }
                };
            }

            if let Some(written) = written.as_mut() {
                written[index] = pass_mark;
            }
            if let Some(depth) = depth.as_mut() {
                depth[index] = tile.depth[i];
            }
            if let Some(normal) = normal.as_mut() {
                normal[index] = tile.normal[i];
            }
        }

        if let Some(op) = unpoison(self.pixel_op.lock()).as_mut() {
            op.process_tile(tile);
        }

        let format = self.info.format;
        match &mut storage.color {
            ColorBuffer::None => {}
            ColorBuffer::Rgba8(color) => {
                for (i, pixel) in rect.pixels().enumerate() {
                    color[pixel.y as usize * width + pixel.x as usize] = encode_rgba8(tile.color[i], format);
                }
            }
            ColorBuffer::Rgba32f(color) => {
                for (i, pixel) in rect.pixels().enumerate() {
                    color[pixel.y as usize * width + pixel.x as usize] = tile.color[i];
                }
            }
        }
    }

    /// Mean estimated variance of the accumulated per-pixel mean.
    ///
    /// 0 until at least two passes have been accumulated, and always 0 without
    /// a `VARIANCE` channel.
    pub fn variance(&self) -> f32 {
        let passes = self.accumulated_frames();
        if passes < 2 {
            return 0.0;
        }
        let storage = unpoison(self.storage.read());
        let Some(stats) = storage.variance.as_ref() else {
            return 0.0;
        };

        let n = passes as f64;
        let total: f64 = stats.iter().map(|s| s.m2 as f64 / (n - 1.0) / n).sum();
        (total / stats.len() as f64) as f32
    }

    /// Claim the buffer for a render. Fails if one is already in flight.
    pub(crate) fn begin_render(&self) -> Result<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Usage("frame buffer already has a render in flight".into()));
        }
        self.set_event(CompletionEvent::NoneFinished);
        Ok(())
    }

    pub(crate) fn begin_frame(&self) {
        if let Some(op) = unpoison(self.pixel_op.lock()).as_mut() {
            op.begin_frame();
        }
    }

    /// Close a frame. Only completed frames count as accumulation passes.
    pub(crate) fn end_frame(&self, completed: bool) {
        if completed {
            self.accumulated.fetch_add(1, Ordering::AcqRel);
            if let Some(op) = unpoison(self.pixel_op.lock()).as_mut() {
                op.end_frame();
            }
        }
    }

    /// Release the buffer and signal `FrameFinished`.
    pub(crate) fn finish_render(&self) {
        self.busy.store(false, Ordering::Release);
        self.set_event(CompletionEvent::FrameFinished);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn completion_event(&self) -> CompletionEvent {
        *unpoison(self.event.lock())
    }

    fn set_event(&self, event: CompletionEvent) {
        *unpoison(self.event.lock()) = event;
        self.event_changed.notify_all();
    }

    /// Block until the completion event reaches at least `event`.
    pub fn wait_for(&self, event: CompletionEvent) {
        let mut current = unpoison(self.event.lock());
        while *current < event {
            current = unpoison(self.event_changed.wait(current));
        }
    }

    /// Write the colour channel as an 8-bit PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        let mapped = self.map(Channel::Color)?;
        let bytes: Vec<u8> = match &mapped.storage.color {
            ColorBuffer::None => return Err(Error::ChannelNotPresent(Channel::Color)),
            ColorBuffer::Rgba8(color) => bytemuck::cast_slice(color).to_vec(),
            ColorBuffer::Rgba32f(color) => color
                .iter()
                .flat_map(|c| encode_rgba8(*c, ColorFormat::Rgba8))
                .collect(),
        };
        drop(mapped);

        let size = self.size();
        let image = image::RgbaImage::from_raw(size.x, size.y, bytes)
            .ok_or_else(|| Error::Usage("colour buffer does not match frame size".into()))?;
        image.save(path)?;
        log::info!("Saved frame buffer to {}", path.display());
        Ok(())
    }
}

/// Read guard over one channel of a [`LocalFrameBuffer`].
pub struct MappedChannel<'a> {
    storage: RwLockReadGuard<'a, Storage>,
    channel: Channel,
}

impl MappedChannel<'_> {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Raw channel bytes, pixels in row-major order.
    ///
    /// Colour is 4 or 16 bytes per pixel depending on the format; depth is
    /// one f32; normal is three f32; accumulation is four f32; variance is
    /// a [`LuminanceStats`].
    pub fn as_bytes(&self) -> &[u8] {
        match self.channel {
            Channel::Color => match &self.storage.color {
                ColorBuffer::None => &[],
                ColorBuffer::Rgba8(c) => bytemuck::cast_slice(c),
                ColorBuffer::Rgba32f(c) => bytemuck::cast_slice(c),
            },
            Channel::Depth => self.storage.depth.as_deref().map_or(&[][..], |v| bytemuck::cast_slice(v)),
            Channel::Normal => self.storage.normal.as_deref().map_or(&[][..], |v| bytemuck::cast_slice(v)),
            Channel::Accum => self.storage.accum.as_deref().map_or(&[][..], |v| bytemuck::cast_slice(v)),
            Channel::Variance => self.storage.variance.as_deref().map_or(&[][..], |v| bytemuck::cast_slice(v)),
        }
    }

    /// Channel as f32 values, or None for 8-bit colour.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match (self.channel, &self.storage.color) {
            (Channel::Color, ColorBuffer::Rgba8(_)) => None,
            _ => bytemuck::try_cast_slice(self.as_bytes()).ok(),
        }
    }
}

fn luminance(c: Vec3) -> f32 {
    c.dot(Vec3::new(0.2126, 0.7152, 0.0722))
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn encode_rgba8(color: Vec4, format: ColorFormat) -> [u8; 4] {
    let rgb = color.truncate().clamp(Vec3::ZERO, Vec3::ONE);
    let rgb = match format {
        ColorFormat::Srgba => Vec3::new(linear_to_srgb(rgb.x), linear_to_srgb(rgb.y), linear_to_srgb(rgb.z)),
        _ => rgb,
    };
    let quantize = |v: f32| (v * 255.0 + 0.5) as u8;
    [quantize(rgb.x), quantize(rgb.y), quantize(rgb.z), quantize(color.w.clamp(0.0, 1.0))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fb::pixel_op::{FrameCounter, FrameCounterOp};
    use crate::fb::tile::tile_grid;
    use tempfile::TempDir;

    fn fb(channels: ChannelMask) -> LocalFrameBuffer {
        LocalFrameBuffer::new(UVec2::new(4, 3), ColorFormat::Rgba32f, channels).unwrap()
    }

    fn pass(fb: &LocalFrameBuffer, color: impl Fn(UVec2) -> Vec4) {
        let accum_id = fb.accumulated_frames();
        for rect in tile_grid(fb.size(), 2) {
            let mut tile = Tile::new(rect, accum_id);
            for (i, p) in rect.pixels().enumerate() {
                tile.color[i] = color(p);
            }
            fb.write_tile(&mut tile);
        }
        fb.end_frame(true);
    }

    #[test]
    fn test_unrequested_channel_cannot_be_mapped() {
        let fb = fb(ChannelMask::COLOR);
        assert!(fb.map(Channel::Color).is_ok());
        assert!(matches!(fb.map(Channel::Depth), Err(Error::ChannelNotPresent(Channel::Depth))));
        assert!(matches!(fb.map(Channel::Variance), Err(Error::ChannelNotPresent(_))));
    }

    #[test]
    fn test_accumulation_is_running_mean() {
        let fb = fb(ChannelMask::COLOR | ChannelMask::ACCUM);
        pass(&fb, |_| Vec4::splat(1.0));
        pass(&fb, |_| Vec4::splat(0.0));
        pass(&fb, |_| Vec4::splat(0.5));

        let mapped = fb.map(Channel::Color).unwrap();
        let color = mapped.as_f32().unwrap();
        assert_eq!(color.len(), 4 * 12);
        assert!(color.iter().all(|&c| (c - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_variance_sentinel_and_constant_input() {
        let fb = fb(ChannelMask::COLOR | ChannelMask::ACCUM | ChannelMask::VARIANCE);
        assert_eq!(fb.variance(), 0.0);
        pass(&fb, |_| Vec4::new(0.3, 0.6, 0.9, 1.0));
        assert_eq!(fb.variance(), 0.0);
        pass(&fb, |_| Vec4::new(0.3, 0.6, 0.9, 1.0));
        assert_eq!(fb.variance(), 0.0);
    }

    #[test]
    fn test_variance_of_alternating_passes() {
        let fb = fb(ChannelMask::ACCUM | ChannelMask::VARIANCE);
        pass(&fb, |_| Vec4::ZERO);
        pass(&fb, |_| Vec4::ONE);
        // Luminance samples 0 and 1: sample variance 0.5, variance of the mean 0.25.
        assert!((fb.variance() - 0.25).abs() < 1e-5);

        fb.clear();
        assert_eq!(fb.accumulated_frames(), 0);
        assert_eq!(fb.variance(), 0.0);
    }

    #[test]
    fn test_cancelled_pass_is_not_counted_twice() {
        let fb = fb(ChannelMask::ACCUM | ChannelMask::VARIANCE);
        pass(&fb, |_| Vec4::ZERO);

        // Second pass cancelled after its first tile.
        let rect = tile_grid(fb.size(), 2)[0];
        let mut tile = Tile::new(rect, fb.accumulated_frames());
        tile.color.fill(Vec4::ONE);
        fb.write_tile(&mut tile);
        fb.end_frame(false);
        assert_eq!(fb.accumulated_frames(), 1);

        pass(&fb, |_| Vec4::ONE);
        let mapped = fb.map(Channel::Accum).unwrap();
        assert!(mapped.as_f32().unwrap().iter().all(|&c| (c - 0.5).abs() < 1e-6));
        drop(mapped);
        assert!((fb.variance() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_variance_requires_channel() {
        let fb = fb(ChannelMask::ACCUM);
        pass(&fb, |_| Vec4::ZERO);
        pass(&fb, |_| Vec4::ONE);
        assert_eq!(fb.variance(), 0.0);
    }

    #[test]
    fn test_clear_keeps_pixel_op() {
        let fb = fb(ChannelMask::COLOR);
        fb.set_pixel_op(&FrameCounterOp);
        pass(&fb, |_| Vec4::ONE);
        fb.clear();
        let frames = fb.with_pixel_op(|op| {
            op.and_then(|op| op.as_any().downcast_ref::<FrameCounter>()).map(|c| c.frames())
        });
        assert_eq!(frames, Some(1));
    }

    #[test]
    fn test_double_begin_is_usage_error() {
        let fb = fb(ChannelMask::COLOR);
        fb.begin_render().unwrap();
        assert!(matches!(fb.begin_render(), Err(Error::Usage(_))));
        fb.finish_render();
        assert_eq!(fb.completion_event(), CompletionEvent::FrameFinished);
        fb.wait_for(CompletionEvent::FrameFinished);
        assert!(fb.begin_render().is_ok());
    }

    #[test]
    fn test_srgb_encoding() {
        assert_eq!(encode_rgba8(Vec4::new(0.0, 1.0, 0.5, 1.0), ColorFormat::Rgba8), [0, 255, 128, 255]);
        assert_eq!(encode_rgba8(Vec4::new(0.5, 0.5, 0.5, 1.0), ColorFormat::Srgba)[0], 188);
    }

    #[test]
    fn test_save_png() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("frame.png");
        let fb = fb(ChannelMask::COLOR);
        pass(&fb, |p| Vec4::new(p.x as f32 / 3.0, 0.0, 0.0, 1.0));
        fb.save_png(&path).unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(3, 0).0, [255, 0, 0, 255]);
    }
}
