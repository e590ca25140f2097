//! Frame buffers, tiles and pixel operations

pub mod channel;
pub mod tile;
pub mod pixel_op;
pub mod frame_buffer;

pub use channel::{Channel, ChannelMask, ColorFormat, CompletionEvent};
pub use frame_buffer::{LocalFrameBuffer, LuminanceStats, MappedChannel};
pub use pixel_op::{FrameBufferInfo, FrameCounter, FrameCounterOp, PixelOp, PixelOpInstance, TonemapOp};
pub use tile::{tile_grid, Tile, TileRect};
