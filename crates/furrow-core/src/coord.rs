//! Coordinate mapping between world tiles, chunks, and sections.
//!
//! World positions are integer tile coordinates. Chunk coordinates are
//! obtained by *floor* division so that negative tiles map to negative
//! chunks (`-1` with a chunk size of 30 is chunk `-1`, not `0`).

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Map a world tile coordinate on one axis to its chunk coordinate.
pub fn world_to_chunk(value: i32, chunk_size: u32) -> i32 {
    value.div_euclid(chunk_size as i32)
}

/// Map a chunk coordinate on one axis to the world coordinate of its
/// origin corner.
pub fn chunk_to_world(chunk: i32, chunk_size: u32) -> i32 {
    chunk * chunk_size as i32
}

// ---------------------------------------------------------------------------
// TilePos
// ---------------------------------------------------------------------------

/// A position on the world tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The chunk containing this tile.
    pub fn chunk(&self, chunk_size: u32) -> ChunkCoord {
        ChunkCoord::from_tile(*self, chunk_size)
    }

    /// The packed map key for this tile.
    pub fn key(&self) -> TileKey {
        TileKey::pack(self.x, self.y)
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// ChunkCoord
// ---------------------------------------------------------------------------

/// Grid coordinate of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The chunk containing a world tile.
    pub fn from_tile(pos: TilePos, chunk_size: u32) -> Self {
        Self {
            x: world_to_chunk(pos.x, chunk_size),
            y: world_to_chunk(pos.y, chunk_size),
        }
    }

    /// World-space origin (min corner) of this chunk.
    pub fn world_origin(&self, chunk_size: u32) -> TilePos {
        TilePos::new(
            chunk_to_world(self.x, chunk_size),
            chunk_to_world(self.y, chunk_size),
        )
    }

    /// Whether a world tile lies inside this chunk.
    pub fn contains(&self, pos: TilePos, chunk_size: u32) -> bool {
        Self::from_tile(pos, chunk_size) == *self
    }

    /// Chebyshev (chessboard) distance to another chunk.
    pub fn distance(&self, other: &ChunkCoord) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    /// Every chunk within `radius` of this one (Chebyshev), including itself,
    /// row by row. Coordinates past the `i32` range are left out.
    pub fn neighborhood(&self, radius: u32) -> impl Iterator<Item = ChunkCoord> {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        let (x_lo, x_hi) = (self.x.saturating_sub(r), self.x.saturating_add(r));
        let (y_lo, y_hi) = (self.y.saturating_sub(r), self.y.saturating_add(r));
        (y_lo..=y_hi).flat_map(move |y| (x_lo..=x_hi).map(move |x| ChunkCoord::new(x, y)))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// TileKey
// ---------------------------------------------------------------------------

/// A tile position packed into a single 64-bit map key.
///
/// The high 32 bits hold `x`, the low 32 bits hold `y`, both as their
/// two's-complement bit patterns. Every `(i32, i32)` pair maps to a distinct
/// key, so no world bound can make two tiles collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey(pub u64);

impl TileKey {
    pub fn pack(x: i32, y: i32) -> Self {
        Self(((x as u32 as u64) << 32) | (y as u32 as u64))
    }

    pub fn unpack(self) -> TilePos {
        TilePos::new((self.0 >> 32) as u32 as i32, self.0 as u32 as i32)
    }
}

// ---------------------------------------------------------------------------
// ChunkRect
// ---------------------------------------------------------------------------

/// A rectangle of chunks: the extent of a section in chunk space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRect {
    pub start: ChunkCoord,
    pub extent_x: u32,
    pub extent_y: u32,
}

impl ChunkRect {
    pub fn new(start: ChunkCoord, extent_x: u32, extent_y: u32) -> Self {
        Self {
            start,
            extent_x,
            extent_y,
        }
    }

    /// Half-open containment in chunk space.
    pub fn contains_chunk(&self, chunk: ChunkCoord) -> bool {
        let dx = chunk.x as i64 - self.start.x as i64;
        let dy = chunk.y as i64 - self.start.y as i64;
        dx >= 0 && dy >= 0 && dx < self.extent_x as i64 && dy < self.extent_y as i64
    }

    /// Half-open containment in tile space:
    /// `[start * size, (start + extent) * size)` on each axis.
    pub fn contains_tile(&self, pos: TilePos, chunk_size: u32) -> bool {
        let size = chunk_size as i64;
        let min_x = self.start.x as i64 * size;
        let min_y = self.start.y as i64 * size;
        let max_x = (self.start.x as i64 + self.extent_x as i64) * size;
        let max_y = (self.start.y as i64 + self.extent_y as i64) * size;
        let x = pos.x as i64;
        let y = pos.y as i64;
        x >= min_x && x < max_x && y >= min_y && y < max_y
    }

    /// Number of chunks covered.
    pub fn chunk_count(&self) -> usize {
        self.extent_x as usize * self.extent_y as usize
    }

    /// Iterate over every chunk in the rectangle, row by row.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkCoord> {
        let sx = self.start.x;
        let sy = self.start.y;
        let w = self.extent_x as i32;
        let h = self.extent_y as i32;
        (0..h).flat_map(move |dy| (0..w).map(move |dx| ChunkCoord::new(sx + dx, sy + dy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_to_chunk_floors_negative_coordinates() {
        assert_eq!(world_to_chunk(-1, 30), -1);
        assert_eq!(world_to_chunk(-30, 30), -1);
        assert_eq!(world_to_chunk(-31, 30), -2);
        assert_eq!(world_to_chunk(0, 30), 0);
        assert_eq!(world_to_chunk(29, 30), 0);
        assert_eq!(world_to_chunk(30, 30), 1);
    }

    #[test]
    fn chunk_to_world_is_origin_corner() {
        assert_eq!(chunk_to_world(2, 30), 60);
        assert_eq!(chunk_to_world(-1, 30), -30);
        assert_eq!(
            ChunkCoord::new(-1, 3).world_origin(16),
            TilePos::new(-16, 48)
        );
    }

    #[test]
    fn chunk_contains_its_tiles() {
        let chunk = ChunkCoord::new(-1, 0);
        assert!(chunk.contains(TilePos::new(-1, 0), 30));
        assert!(chunk.contains(TilePos::new(-30, 29), 30));
        assert!(!chunk.contains(TilePos::new(0, 0), 30));
        assert!(!chunk.contains(TilePos::new(-31, 0), 30));
    }

    #[test]
    fn chunk_distance_is_chebyshev() {
        let a = ChunkCoord::new(0, 0);
        assert_eq!(a.distance(&ChunkCoord::new(3, 2)), 3);
        assert_eq!(a.distance(&ChunkCoord::new(-2, 1)), 2);
    }

    #[test]
    fn neighborhood_covers_square() {
        let around: Vec<_> = ChunkCoord::new(5, 5).neighborhood(1).collect();
        assert_eq!(around.len(), 9);
        assert!(around.contains(&ChunkCoord::new(4, 4)));
        assert!(around.contains(&ChunkCoord::new(6, 6)));
        assert!(around.iter().all(|c| c.distance(&ChunkCoord::new(5, 5)) <= 1));

        assert_eq!(ChunkCoord::new(0, 0).neighborhood(0).count(), 1);
    }

    #[test]
    fn neighborhood_stops_at_the_coordinate_limits() {
        let corner = ChunkCoord::new(i32::MAX, i32::MIN);
        let around: Vec<_> = corner.neighborhood(1).collect();
        assert_eq!(around.len(), 4);
        assert!(around.contains(&ChunkCoord::new(i32::MAX - 1, i32::MIN + 1)));
        assert!(around.contains(&corner));

        let edge = ChunkCoord::new(i32::MAX - 1, 0);
        assert_eq!(edge.neighborhood(3).count(), 5 * 7);
    }

    #[test]
    fn tile_key_round_trips_extremes() {
        for (x, y) in [
            (0, 0),
            (-1, -1),
            (i32::MIN, i32::MAX),
            (i32::MAX, i32::MIN),
            (123_456, -987_654),
        ] {
            assert_eq!(TileKey::pack(x, y).unpack(), TilePos::new(x, y));
        }
    }

    #[test]
    fn tile_key_does_not_collide_across_axes() {
        // A multiplicative `x * base + y` scheme collides here.
        let base = 10_000;
        assert_ne!(TileKey::pack(1, 0), TileKey::pack(0, base));
        assert_ne!(TileKey::pack(0, -1), TileKey::pack(-1, u32::MAX as i32));
    }

    #[test]
    fn chunk_rect_half_open_bounds() {
        let rect = ChunkRect::new(ChunkCoord::new(-1, 0), 2, 1);
        let size = 10;

        assert!(rect.contains_tile(TilePos::new(-10, 0), size));
        assert!(rect.contains_tile(TilePos::new(9, 9), size));
        assert!(!rect.contains_tile(TilePos::new(10, 0), size));
        assert!(!rect.contains_tile(TilePos::new(0, 10), size));
        assert!(!rect.contains_tile(TilePos::new(-11, 0), size));

        assert!(rect.contains_chunk(ChunkCoord::new(0, 0)));
        assert!(!rect.contains_chunk(ChunkCoord::new(1, 0)));
        assert_eq!(rect.chunks().count(), rect.chunk_count());
    }
}
