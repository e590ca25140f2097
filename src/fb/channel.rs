//! Frame buffer channel layout and colour formats

use std::fmt;
use std::ops::BitOr;

/// A per-pixel channel a frame buffer may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Final colour in the buffer's [`ColorFormat`]
    Color,
    /// Hit distance along the primary ray
    Depth,
    /// Running mean of all accumulated passes (RGBA f32)
    Accum,
    /// Per-pixel luminance statistics for the variance estimate
    Variance,
    /// Surface normal at the primary hit
    Normal,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Color,
        Channel::Depth,
        Channel::Accum,
        Channel::Variance,
        Channel::Normal,
    ];

    const fn bit(self) -> u32 {
        match self {
            Channel::Color => 1 << 0,
            Channel::Depth => 1 << 1,
            Channel::Accum => 1 << 2,
            Channel::Variance => 1 << 3,
            Channel::Normal => 1 << 4,
        }
    }
}

/// Set of requested channels.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const NONE: ChannelMask = ChannelMask(0);
    pub const COLOR: ChannelMask = ChannelMask(Channel::Color.bit());
    pub const DEPTH: ChannelMask = ChannelMask(Channel::Depth.bit());
    pub const ACCUM: ChannelMask = ChannelMask(Channel::Accum.bit());
    pub const VARIANCE: ChannelMask = ChannelMask(Channel::Variance.bit());
    pub const NORMAL: ChannelMask = ChannelMask(Channel::Normal.bit());

    pub fn contains(self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Mask from raw bits; unknown bits are dropped.
    pub fn from_bits_truncate(bits: u32) -> Self {
        let known = Channel::ALL.iter().fold(0, |acc, c| acc | c.bit());
        Self(bits & known)
    }
}

impl From<Channel> for ChannelMask {
    fn from(channel: Channel) -> Self {
        Self(channel.bit())
    }
}

impl BitOr for ChannelMask {
    type Output = ChannelMask;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Channel::ALL.iter().filter(|c| self.contains(**c)))
            .finish()
    }
}

/// Storage format of the colour channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// No colour storage at all
    None,
    /// Linear 8-bit RGBA
    #[default]
    Rgba8,
    /// sRGB-encoded 8-bit RGB, linear alpha
    Srgba,
    /// Linear 32-bit float RGBA
    Rgba32f,
}

impl ColorFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorFormat::None => 0,
            ColorFormat::Rgba8 | ColorFormat::Srgba => 4,
            ColorFormat::Rgba32f => 16,
        }
    }
}

/// Coarse render progress marker of a frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompletionEvent {
    NoneFinished,
    FrameFinished,
}
