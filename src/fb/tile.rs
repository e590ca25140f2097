//! Tiles: the unit of scheduling and of frame buffer writes.

use crate::core::types::{UVec2, Vec3, Vec4};

/// Rectangle of pixels in frame buffer coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileRect {
    pub origin: UVec2,
    pub size: UVec2,
}

impl TileRect {
    pub fn pixel_count(&self) -> usize {
        self.size.x as usize * self.size.y as usize
    }

    /// Frame buffer pixels covered, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = UVec2> + '_ {
        (0..self.size.y).flat_map(move |y| (0..self.size.x).map(move |x| self.origin + UVec2::new(x, y)))
    }
}

/// Cut a frame of `size` into `tile_size`² tiles, row-major. Tiles on the
/// right and bottom edges are clipped to the frame.
pub fn tile_grid(size: UVec2, tile_size: u32) -> Vec<TileRect> {
    let tile_size = tile_size.max(1);
    let count = UVec2::new(size.x.div_ceil(tile_size), size.y.div_ceil(tile_size));

    let mut tiles = Vec::with_capacity(count.x as usize * count.y as usize);
    for ty in 0..count.y {
        for tx in 0..count.x {
            let origin = UVec2::new(tx, ty) * tile_size;
            let size = (size - origin).min(UVec2::splat(tile_size));
            tiles.push(TileRect { origin, size });
        }
    }
    tiles
}

/// Samples rendered for one tile, in linear RGBA, before they are merged
/// into a frame buffer.
#[derive(Clone, Debug)]
pub struct Tile {
    pub rect: TileRect,
    /// Accumulation pass this tile belongs to (0 for the first pass).
    pub accum_id: u32,
    pub color: Vec<Vec4>,
    pub depth: Vec<f32>,
    pub normal: Vec<Vec3>,
}

impl Tile {
    pub fn new(rect: TileRect, accum_id: u32) -> Self {
        let n = rect.pixel_count();
        Self {
            rect,
            accum_id,
            color: vec![Vec4::ZERO; n],
            depth: vec![f32::INFINITY; n],
            normal: vec![Vec3::ZERO; n],
        }
    }

    /// Index of a tile-local pixel.
    #[inline]
    pub fn index(&self, local: UVec2) -> usize {
        local.y as usize * self.rect.size.x as usize + local.x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_covers_frame_once() {
        let size = UVec2::new(100, 70);
        let tiles = tile_grid(size, 32);
        assert_eq!(tiles.len(), 4 * 3);
        assert_eq!(tiles[3], TileRect { origin: UVec2::new(96, 0), size: UVec2::new(4, 32) });
        assert_eq!(tiles[11].size, UVec2::new(4, 6));

        let mut covered = vec![0u8; (size.x * size.y) as usize];
        for tile in &tiles {
            for p in tile.pixels() {
                covered[(p.y * size.x + p.x) as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_huge_tile_is_whole_frame() {
        let tiles = tile_grid(UVec2::new(5, 3), u32::MAX);
        assert_eq!(tiles, vec![TileRect { origin: UVec2::ZERO, size: UVec2::new(5, 3) }]);
    }

    #[test]
    fn test_tile_index_matches_pixel_order() {
        let rect = TileRect { origin: UVec2::new(8, 8), size: UVec2::new(3, 2) };
        let tile = Tile::new(rect, 0);
        for (i, p) in rect.pixels().enumerate() {
            assert_eq!(tile.index(p - rect.origin), i);
        }
        assert_eq!(tile.color.len(), 6);
    }
}
