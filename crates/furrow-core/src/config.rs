//! World, loading, sync, and growth configuration.
//!
//! Every field has a default so partial data files deserialize cleanly.
//! Call [`WorldConfig::validate`] before building a world from untrusted
//! configuration.

use crate::coord::{ChunkCoord, ChunkRect};
use crate::id::SectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Largest chunk side length whose slot count still fits the 2-byte wire
/// field (255 * 255 = 65025).
pub const MAX_CHUNK_SIZE: u32 = 255;

/// Largest load radius; a radius of `r` keeps up to `(2r + 1)^2` chunks live.
pub const MAX_LOAD_RADIUS: u32 = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("chunk size {0} must be between 1 and {MAX_CHUNK_SIZE}")]
    InvalidChunkSize(u32),
    #[error("sync batch size must be at least 1")]
    ZeroBatchSize,
    #[error("duplicate section id {0}")]
    DuplicateSection(SectionId),
    #[error("{0} has an empty extent")]
    EmptySection(SectionId),
    #[error("{0} extends past the representable world bounds")]
    SectionOutOfBounds(SectionId),
    #[error("loading poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("load radius {0} exceeds {MAX_LOAD_RADIUS}")]
    LoadRadiusTooLarge(u32),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// A rectangular block of chunks, the unit of world partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub id: SectionId,
    pub chunk_start_x: i32,
    pub chunk_start_y: i32,
    pub chunk_extent_x: u32,
    pub chunk_extent_y: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl SectionConfig {
    pub fn new(id: SectionId, start: ChunkCoord, extent_x: u32, extent_y: u32) -> Self {
        Self {
            id,
            chunk_start_x: start.x,
            chunk_start_y: start.y,
            chunk_extent_x: extent_x,
            chunk_extent_y: extent_y,
            active: true,
        }
    }

    pub fn bounds(&self) -> ChunkRect {
        ChunkRect::new(
            ChunkCoord::new(self.chunk_start_x, self.chunk_start_y),
            self.chunk_extent_x,
            self.chunk_extent_y,
        )
    }

    /// Whether every tile of the section is addressable as an `i32`.
    fn fits_world(&self, chunk_size: u32) -> bool {
        let size = chunk_size as i64;
        let min_x = self.chunk_start_x as i64 * size;
        let min_y = self.chunk_start_y as i64 * size;
        let max_x = (self.chunk_start_x as i64 + self.chunk_extent_x as i64) * size - 1;
        let max_y = (self.chunk_start_y as i64 + self.chunk_extent_y as i64) * size - 1;
        let range = i32::MIN as i64..=i32::MAX as i64;
        range.contains(&min_x)
            && range.contains(&min_y)
            && range.contains(&max_x)
            && range.contains(&max_y)
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Chunk activation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    /// Chebyshev radius, in chunks, around the local peer's chunk.
    pub load_radius: u32,
    /// Grace period before an unwanted chunk is unloaded.
    pub unload_delay_ms: u64,
    /// How often the local peer's chunk is re-evaluated.
    pub poll_interval_ms: u64,
}

impl LoadingConfig {
    pub fn unload_delay(&self) -> Duration {
        Duration::from_millis(self.unload_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            load_radius: 1,
            unload_delay_ms: 3_000,
            poll_interval_ms: 250,
        }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Full-sync transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chunks per batch message.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay_ms: u64,
    /// Delay before re-trying a sync request that could not be sent yet.
    pub request_retry_delay_ms: u64,
    /// Retries before a follower gives up requesting.
    pub max_request_retries: u32,
}

impl SyncConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_retry_delay(&self) -> Duration {
        Duration::from_millis(self.request_retry_delay_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 50,
            request_retry_delay_ms: 500,
            max_request_retries: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Pollen harvests allowed per crop stage.
    pub max_pollen_harvests_per_stage: u8,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            max_pollen_harvests_per_stage: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Top-level world configuration. Peers in one session must share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Tiles per chunk side.
    pub chunk_size: u32,
    /// Sections in registration order. Lookups return the first match.
    pub sections: Vec<SectionConfig>,
    pub loading: LoadingConfig,
    pub sync: SyncConfig,
    pub growth: GrowthConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size: 30,
            sections: Vec::new(),
            loading: LoadingConfig::default(),
            sync: SyncConfig::default(),
            growth: GrowthConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Check the configuration for values the world cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.loading.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.loading.load_radius > MAX_LOAD_RADIUS {
            return Err(ConfigError::LoadRadiusTooLarge(self.loading.load_radius));
        }

        let mut seen = HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.id) {
                return Err(ConfigError::DuplicateSection(section.id));
            }
            if section.chunk_extent_x == 0 || section.chunk_extent_y == 0 {
                return Err(ConfigError::EmptySection(section.id));
            }
            if !section.fits_world(self.chunk_size) {
                return Err(ConfigError::SectionOutOfBounds(section.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(sections: Vec<SectionConfig>) -> WorldConfig {
        WorldConfig {
            sections,
            ..WorldConfig::default()
        }
    }

    #[test]
    fn defaults_validate() {
        assert_eq!(WorldConfig::default().validate(), Ok(()));
        assert_eq!(WorldConfig::default().sync.batch_size, 10);
    }

    #[test]
    fn rejects_bad_chunk_size() {
        let mut config = WorldConfig::default();
        config.chunk_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidChunkSize(0)));
        config.chunk_size = 256;
        assert_eq!(config.validate(), Err(ConfigError::InvalidChunkSize(256)));
    }

    #[test]
    fn rejects_huge_load_radius() {
        let mut config = WorldConfig::default();
        config.loading.load_radius = MAX_LOAD_RADIUS;
        assert_eq!(config.validate(), Ok(()));
        config.loading.load_radius = u32::MAX;
        assert_eq!(
            config.validate(),
            Err(ConfigError::LoadRadiusTooLarge(u32::MAX))
        );
    }

    #[test]
    fn rejects_duplicate_sections() {
        let a = SectionConfig::new(SectionId(1), ChunkCoord::new(0, 0), 2, 2);
        let b = SectionConfig::new(SectionId(1), ChunkCoord::new(5, 5), 2, 2);
        assert_eq!(
            config_with(vec![a, b]).validate(),
            Err(ConfigError::DuplicateSection(SectionId(1)))
        );
    }

    #[test]
    fn rejects_empty_section() {
        let a = SectionConfig::new(SectionId(2), ChunkCoord::new(0, 0), 0, 2);
        assert_eq!(
            config_with(vec![a]).validate(),
            Err(ConfigError::EmptySection(SectionId(2)))
        );
    }

    #[test]
    fn rejects_section_past_world_bounds() {
        let edge = i32::MAX / 30;
        let ok = SectionConfig::new(SectionId(1), ChunkCoord::new(edge - 1, 0), 1, 1);
        assert_eq!(config_with(vec![ok]).validate(), Ok(()));

        let too_far = SectionConfig::new(SectionId(1), ChunkCoord::new(edge, 0), 2, 1);
        assert_eq!(
            config_with(vec![too_far]).validate(),
            Err(ConfigError::SectionOutOfBounds(SectionId(1)))
        );

        let negative = SectionConfig::new(SectionId(3), ChunkCoord::new(i32::MIN / 30 - 1, 0), 1, 1);
        assert_eq!(
            config_with(vec![negative]).validate(),
            Err(ConfigError::SectionOutOfBounds(SectionId(3)))
        );
    }
}
