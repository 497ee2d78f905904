//! Shared test helpers for unit tests, integration tests, and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available to other crates through the `test-utils` feature.

use crate::catalog::{Catalog, CatalogBuilder, PlantDef, PlantKind, StructureDef};
use crate::config::{SectionConfig, WorldConfig};
use crate::coord::{ChunkCoord, TilePos};
use crate::id::{PlantId, SectionId, StructureId};
use crate::loading::{VisualKind, VisualSpawner};

// ===========================================================================
// World configuration
// ===========================================================================

/// Chunk size 16 with three sections:
///
/// - section 1: 3x2 chunks at `(0, 0)`, active
/// - section 2: 2x2 chunks at `(-2, -2)`, active
/// - section 3: 2x2 chunks at `(10, 0)`, inactive
pub fn test_config() -> WorldConfig {
    let mut inactive = SectionConfig::new(SectionId(3), ChunkCoord::new(10, 0), 2, 2);
    inactive.active = false;
    WorldConfig {
        chunk_size: 16,
        sections: vec![
            SectionConfig::new(SectionId(1), ChunkCoord::new(0, 0), 3, 2),
            SectionConfig::new(SectionId(2), ChunkCoord::new(-2, -2), 2, 2),
            inactive,
        ],
        ..WorldConfig::default()
    }
}

/// A single `width` x `height` section at the origin.
pub fn grid_config(chunk_size: u32, width: u32, height: u32) -> WorldConfig {
    WorldConfig {
        chunk_size,
        sections: vec![SectionConfig::new(
            SectionId(1),
            ChunkCoord::new(0, 0),
            width,
            height,
        )],
        ..WorldConfig::default()
    }
}

// ===========================================================================
// Catalog
// ===========================================================================

pub fn turnip() -> PlantId {
    PlantId::from("turnip")
}

pub fn carrot() -> PlantId {
    PlantId::from("carrot")
}

pub fn glowroot() -> PlantId {
    PlantId::from("glowroot")
}

pub fn fence() -> StructureId {
    StructureId::from("fence")
}

fn normal_plant(id: &str, stage_days: Vec<u32>, pollen_stage: Option<u8>) -> PlantDef {
    let stages = stage_days.len() + 1;
    PlantDef {
        id: PlantId::from(id),
        name: id.to_string(),
        stage_days,
        pollen_stage,
        kind: PlantKind::Normal {
            stage_sprites: (0..stages).map(|s| format!("{id}_{s}")).collect(),
        },
    }
}

/// Turnip (stages after 1, 2, 3 days; pollen at stage 1), carrot (2, 2;
/// pollen at stage 2), their hybrid glowroot, and a fence.
pub fn test_catalog() -> Catalog {
    let mut builder = CatalogBuilder::new();
    builder
        .register_plant(normal_plant("turnip", vec![1, 2, 3], Some(1)))
        .register_plant(normal_plant("carrot", vec![2, 2], Some(2)))
        .register_plant(PlantDef {
            id: glowroot(),
            name: "Glowroot".to_string(),
            stage_days: vec![1, 1],
            pollen_stage: None,
            kind: PlantKind::Hybrid {
                parents: [turnip(), carrot()],
                sprite_sheet: "glowroot".to_string(),
            },
        })
        .register_structure(StructureDef {
            id: fence(),
            name: "Fence".to_string(),
            sprite: "fence_post".to_string(),
        });
    match builder.build() {
        Ok(catalog) => catalog,
        Err(e) => panic!("test catalog is invalid: {e}"),
    }
}

// ===========================================================================
// Visual spawner
// ===========================================================================

/// One call made to a [`RecordingSpawner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnerCall {
    Spawn {
        pos: TilePos,
        kind: VisualKind,
        sprite: String,
    },
    Destroy(ChunkCoord),
}

/// A [`VisualSpawner`] that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingSpawner {
    calls: Vec<SpawnerCall>,
}

impl RecordingSpawner {
    pub fn calls(&self) -> &[SpawnerCall] {
        &self.calls
    }

    pub fn spawned(&self) -> Vec<(TilePos, VisualKind, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SpawnerCall::Spawn { pos, kind, sprite } => Some((*pos, *kind, sprite.clone())),
                SpawnerCall::Destroy(_) => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<ChunkCoord> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SpawnerCall::Destroy(chunk) => Some(*chunk),
                SpawnerCall::Spawn { .. } => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl VisualSpawner for RecordingSpawner {
    fn spawn_tile_visual(&mut self, pos: TilePos, kind: VisualKind, sprite_key: &str) {
        self.calls.push(SpawnerCall::Spawn {
            pos,
            kind,
            sprite: sprite_key.to_string(),
        });
    }

    fn destroy_chunk_visuals(&mut self, chunk: ChunkCoord) {
        self.calls.push(SpawnerCall::Destroy(chunk));
    }
}
