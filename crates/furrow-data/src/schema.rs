//! Serde data file structs for world layout and farm content.
//!
//! These structs define the on-disk format of `world`, `plants`, and
//! `structures` files. They are deserialized from RON, JSON, or TOML and
//! then resolved into core types by the loader. Ids are plain strings and
//! integers here so every format reads them the same way.

use furrow_core::catalog::{PlantDef, PlantKind, StructureDef};
use furrow_core::config::{GrowthConfig, LoadingConfig, SectionConfig, SyncConfig, WorldConfig};
use furrow_core::id::{PlantId, SectionId, StructureId};
use serde::Deserialize;

// ===========================================================================
// World
// ===========================================================================

/// The world layout file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldData {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    #[serde(default)]
    pub sections: Vec<SectionData>,
    #[serde(default)]
    pub loading: LoadingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
}

fn default_chunk_size() -> u32 {
    WorldConfig::default().chunk_size
}

fn default_true() -> bool {
    true
}

/// A section entry: a rectangle of chunks.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionData {
    pub id: u32,
    pub chunk_start_x: i32,
    pub chunk_start_y: i32,
    pub chunk_extent_x: u32,
    pub chunk_extent_y: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl WorldData {
    /// Convert to a core config. Validation is left to the caller.
    pub fn into_config(self) -> WorldConfig {
        WorldConfig {
            chunk_size: self.chunk_size,
            sections: self
                .sections
                .into_iter()
                .map(|s| SectionConfig {
                    id: SectionId(s.id),
                    chunk_start_x: s.chunk_start_x,
                    chunk_start_y: s.chunk_start_y,
                    chunk_extent_x: s.chunk_extent_x,
                    chunk_extent_y: s.chunk_extent_y,
                    active: s.active,
                })
                .collect(),
            loading: self.loading,
            sync: self.sync,
            growth: self.growth,
        }
    }
}

// ===========================================================================
// Plants
// ===========================================================================

/// A plant definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantData {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Days spent in each non-final stage.
    pub stage_days: Vec<u32>,
    #[serde(default)]
    pub pollen_stage: Option<u8>,
    /// One sprite key per stage. Defaults to `{name}_{stage}`.
    #[serde(default)]
    pub sprites: Vec<String>,
    /// Present on crossbred plants.
    #[serde(default)]
    pub hybrid: Option<HybridData>,
}

/// Parentage of a crossbred plant.
#[derive(Debug, Clone, Deserialize)]
pub struct HybridData {
    pub parents: (String, String),
    pub sprite_sheet: String,
}

impl PlantData {
    pub fn into_def(self) -> PlantDef {
        let stages = self.stage_days.len() + 1;
        let kind = match self.hybrid {
            Some(hybrid) => PlantKind::Hybrid {
                parents: [
                    PlantId::new(hybrid.parents.0),
                    PlantId::new(hybrid.parents.1),
                ],
                sprite_sheet: hybrid.sprite_sheet,
            },
            None if self.sprites.is_empty() => PlantKind::Normal {
                stage_sprites: (0..stages).map(|s| format!("{}_{s}", self.name)).collect(),
            },
            None => PlantKind::Normal {
                stage_sprites: self.sprites,
            },
        };
        PlantDef {
            id: PlantId::new(self.name.clone()),
            name: self.display_name.unwrap_or(self.name),
            stage_days: self.stage_days,
            pollen_stage: self.pollen_stage,
            kind,
        }
    }
}

// ===========================================================================
// Structures
// ===========================================================================

/// A structure definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureData {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Defaults to the structure name.
    #[serde(default)]
    pub sprite: Option<String>,
}

impl StructureData {
    pub fn into_def(self) -> StructureDef {
        StructureDef {
            id: StructureId::new(self.name.clone()),
            sprite: self.sprite.unwrap_or_else(|| self.name.clone()),
            name: self.display_name.unwrap_or(self.name),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_data_from_ron() {
        let ron_str = r#"(
            chunk_size: 16,
            sections: [
                (id: 1, chunk_start_x: 0, chunk_start_y: 0, chunk_extent_x: 4, chunk_extent_y: 2),
                (id: 2, chunk_start_x: -4, chunk_start_y: 0, chunk_extent_x: 2, chunk_extent_y: 2, active: false),
            ],
            sync: (batch_size: 5),
        )"#;
        let world: WorldData = ron::from_str(ron_str).unwrap();
        let config = world.into_config();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.sections.len(), 2);
        assert!(config.sections[0].active);
        assert!(!config.sections[1].active);
        assert_eq!(config.sync.batch_size, 5);
        assert_eq!(config.sync.batch_delay_ms, SyncConfig::default().batch_delay_ms);
        assert_eq!(config.loading, LoadingConfig::default());
    }

    #[test]
    fn world_data_defaults_from_json() {
        let world: WorldData = serde_json::from_str("{}").unwrap();
        let config = world.into_config();
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn world_data_from_toml() {
        let toml_str = r#"
chunk_size = 30

[loading]
load_radius = 2

[[sections]]
id = 7
chunk_start_x = 1
chunk_start_y = -1
chunk_extent_x = 3
chunk_extent_y = 3
"#;
        let world: WorldData = toml::from_str(toml_str).unwrap();
        let config = world.into_config();
        assert_eq!(config.sections[0].id, SectionId(7));
        assert_eq!(config.loading.load_radius, 2);
        assert_eq!(config.loading.unload_delay_ms, 3_000);
    }

    #[test]
    fn plant_data_default_sprites() {
        let plant: PlantData =
            ron::from_str(r#"(name: "turnip", stage_days: [1, 2], pollen_stage: Some(1))"#).unwrap();
        let def = plant.into_def();
        assert_eq!(def.id, PlantId::from("turnip"));
        assert_eq!(def.name, "turnip");
        assert_eq!(def.stage_count(), 3);
        assert_eq!(def.stage_sprite(2).as_deref(), Some("turnip_2"));
        assert!(def.bears_pollen(1));
    }

    #[test]
    fn hybrid_plant_from_json() {
        let plant: PlantData = serde_json::from_str(
            r#"{
                "name": "glowroot",
                "display_name": "Glowroot",
                "stage_days": [1, 1],
                "hybrid": { "parents": ["turnip", "carrot"], "sprite_sheet": "glow" }
            }"#,
        )
        .unwrap();
        let def = plant.into_def();
        assert_eq!(def.name, "Glowroot");
        assert!(def.kind.is_hybrid());
        assert_eq!(def.stage_sprite(1).as_deref(), Some("glow_1"));
    }

    #[test]
    fn structure_sprite_defaults_to_name() {
        let s: StructureData = ron::from_str(r#"(name: "fence")"#).unwrap();
        let def = s.into_def();
        assert_eq!(def.sprite, "fence");
        assert_eq!(def.name, "fence");

        let s: StructureData =
            ron::from_str(r#"(name: "well", display_name: Some("Well"), sprite: Some("well_stone"))"#)
                .unwrap();
        let def = s.into_def();
        assert_eq!(def.sprite, "well_stone");
        assert_eq!(def.name, "Well");
    }
}
