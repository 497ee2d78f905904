//! Plant and structure definitions.
//!
//! The catalog is built once with a [`CatalogBuilder`] (usually from data
//! files by `furrow-data`) and is immutable afterwards. The growth scheduler
//! reads stage thresholds from it; the loading controller reads sprite keys.

use crate::id::{PlantId, StructureId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// How a plant is drawn, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantKind {
    /// A base plant with one sprite key per stage.
    Normal { stage_sprites: Vec<String> },
    /// A crossbred plant. Its stage sprites are numbered frames of a sheet.
    Hybrid {
        parents: [PlantId; 2],
        sprite_sheet: String,
    },
}

impl PlantKind {
    /// Sprite key for a growth stage. Normal plants past their last listed
    /// sprite keep showing it.
    pub fn stage_sprite(&self, stage: u8) -> Option<Cow<'_, str>> {
        match self {
            PlantKind::Normal { stage_sprites } => {
                let idx = (stage as usize).min(stage_sprites.len().checked_sub(1)?);
                Some(Cow::Borrowed(stage_sprites[idx].as_str()))
            }
            PlantKind::Hybrid { sprite_sheet, .. } => {
                Some(Cow::Owned(format!("{sprite_sheet}_{stage}")))
            }
        }
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self, PlantKind::Hybrid { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantDef {
    pub id: PlantId,
    pub name: String,
    /// Days spent in each stage before advancing. A plant has one more
    /// stage than there are entries; the last stage is final.
    pub stage_days: Vec<u32>,
    /// Stage at which pollen can be harvested, if any.
    #[serde(default)]
    pub pollen_stage: Option<u8>,
    pub kind: PlantKind,
}

impl PlantDef {
    pub fn stage_count(&self) -> u8 {
        (self.stage_days.len() + 1).min(u8::MAX as usize) as u8
    }

    pub fn is_final_stage(&self, stage: u8) -> bool {
        stage as usize >= self.stage_days.len()
    }

    /// Cumulative age, in days since planting, at which a crop leaves
    /// `stage`. `None` for the final stage.
    pub fn next_stage_age(&self, stage: u8) -> Option<u32> {
        let end = stage as usize + 1;
        if end > self.stage_days.len() {
            return None;
        }
        Some(
            self.stage_days[..end]
                .iter()
                .fold(0u32, |acc, d| acc.saturating_add(*d)),
        )
    }

    pub fn bears_pollen(&self, stage: u8) -> bool {
        self.pollen_stage == Some(stage)
    }

    pub fn stage_sprite(&self, stage: u8) -> Option<Cow<'_, str>> {
        self.kind.stage_sprite(stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDef {
    pub id: StructureId,
    pub name: String,
    pub sprite: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate plant id: {0}")]
    DuplicatePlant(PlantId),
    #[error("duplicate structure id: {0}")]
    DuplicateStructure(StructureId),
    #[error("hybrid {hybrid} names unknown parent {parent}")]
    UnknownParent { hybrid: PlantId, parent: PlantId },
    #[error("hybrids {first} and {second} share the same parent pair")]
    DuplicateHybridPair { first: PlantId, second: PlantId },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects definitions, then validates cross references in
/// [`build`](CatalogBuilder::build).
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    plants: Vec<PlantDef>,
    structures: Vec<StructureDef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_plant(&mut self, def: PlantDef) -> &mut Self {
        self.plants.push(def);
        self
    }

    pub fn register_structure(&mut self, def: StructureDef) -> &mut Self {
        self.structures.push(def);
        self
    }

    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut plants = HashMap::with_capacity(self.plants.len());
        for def in self.plants {
            if plants.contains_key(&def.id) {
                return Err(CatalogError::DuplicatePlant(def.id));
            }
            plants.insert(def.id.clone(), def);
        }

        let mut structures = HashMap::with_capacity(self.structures.len());
        for def in self.structures {
            if structures.contains_key(&def.id) {
                return Err(CatalogError::DuplicateStructure(def.id));
            }
            structures.insert(def.id.clone(), def);
        }

        let mut hybrids: HashMap<(PlantId, PlantId), PlantId> = HashMap::new();
        let mut ids: Vec<&PlantId> = plants.keys().collect();
        ids.sort();
        for id in ids {
            let PlantKind::Hybrid { parents, .. } = &plants[id].kind else {
                continue;
            };
            for parent in parents {
                if !plants.contains_key(parent) {
                    return Err(CatalogError::UnknownParent {
                        hybrid: id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            let pair = parent_pair(&parents[0], &parents[1]);
            if let Some(existing) = hybrids.get(&pair) {
                return Err(CatalogError::DuplicateHybridPair {
                    first: existing.clone(),
                    second: id.clone(),
                });
            }
            hybrids.insert(pair, id.clone());
        }

        Ok(Catalog {
            plants,
            structures,
            hybrids,
        })
    }
}

fn parent_pair(a: &PlantId, b: &PlantId) -> (PlantId, PlantId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable plant and structure definitions.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    plants: HashMap<PlantId, PlantDef>,
    structures: HashMap<StructureId, StructureDef>,
    hybrids: HashMap<(PlantId, PlantId), PlantId>,
}

impl Catalog {
    pub fn plant(&self, id: &PlantId) -> Option<&PlantDef> {
        self.plants.get(id)
    }

    pub fn structure(&self, id: &StructureId) -> Option<&StructureDef> {
        self.structures.get(id)
    }

    /// The hybrid bred from two parents, in either order.
    pub fn hybrid_of(&self, a: &PlantId, b: &PlantId) -> Option<&PlantDef> {
        self.hybrids
            .get(&parent_pair(a, b))
            .and_then(|id| self.plants.get(id))
    }

    pub fn plants(&self) -> impl Iterator<Item = &PlantDef> {
        self.plants.values()
    }

    pub fn structures(&self) -> impl Iterator<Item = &StructureDef> {
        self.structures.values()
    }

    pub fn plant_count(&self) -> usize {
        self.plants.len()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(id: &str, stage_days: Vec<u32>) -> PlantDef {
        PlantDef {
            id: PlantId::from(id),
            name: id.to_string(),
            stage_days,
            pollen_stage: None,
            kind: PlantKind::Normal {
                stage_sprites: vec![format!("{id}_seed"), format!("{id}_sprout")],
            },
        }
    }

    fn hybrid(id: &str, a: &str, b: &str) -> PlantDef {
        PlantDef {
            id: PlantId::from(id),
            name: id.to_string(),
            stage_days: vec![2, 2],
            pollen_stage: None,
            kind: PlantKind::Hybrid {
                parents: [PlantId::from(a), PlantId::from(b)],
                sprite_sheet: format!("{id}_sheet"),
            },
        }
    }

    #[test]
    fn stage_thresholds_are_cumulative() {
        let def = normal("turnip", vec![1, 2, 3]);
        assert_eq!(def.stage_count(), 4);
        assert_eq!(def.next_stage_age(0), Some(1));
        assert_eq!(def.next_stage_age(1), Some(3));
        assert_eq!(def.next_stage_age(2), Some(6));
        assert_eq!(def.next_stage_age(3), None);
        assert!(def.is_final_stage(3));
        assert!(!def.is_final_stage(2));
    }

    #[test]
    fn normal_sprite_clamps_to_last() {
        let def = normal("turnip", vec![1, 1, 1]);
        assert_eq!(def.stage_sprite(0).as_deref(), Some("turnip_seed"));
        assert_eq!(def.stage_sprite(1).as_deref(), Some("turnip_sprout"));
        assert_eq!(def.stage_sprite(3).as_deref(), Some("turnip_sprout"));

        let bare = PlantKind::Normal {
            stage_sprites: Vec::new(),
        };
        assert_eq!(bare.stage_sprite(0), None);
    }

    #[test]
    fn hybrid_sprite_numbers_frames() {
        let def = hybrid("glowroot", "turnip", "carrot");
        assert!(def.kind.is_hybrid());
        assert_eq!(def.stage_sprite(2).as_deref(), Some("glowroot_sheet_2"));
    }

    #[test]
    fn hybrid_lookup_is_order_independent() {
        let mut builder = CatalogBuilder::new();
        builder
            .register_plant(normal("turnip", vec![1]))
            .register_plant(normal("carrot", vec![1]))
            .register_plant(hybrid("glowroot", "turnip", "carrot"));
        let catalog = builder.build().unwrap();

        let id = PlantId::from("glowroot");
        assert_eq!(
            catalog
                .hybrid_of(&PlantId::from("carrot"), &PlantId::from("turnip"))
                .map(|d| &d.id),
            Some(&id)
        );
        assert_eq!(
            catalog
                .hybrid_of(&PlantId::from("turnip"), &PlantId::from("carrot"))
                .map(|d| &d.id),
            Some(&id)
        );
        assert!(
            catalog
                .hybrid_of(&PlantId::from("turnip"), &PlantId::from("turnip"))
                .is_none()
        );
    }

    #[test]
    fn duplicate_plant_rejected() {
        let mut builder = CatalogBuilder::new();
        builder
            .register_plant(normal("turnip", vec![1]))
            .register_plant(normal("turnip", vec![2]));
        assert_eq!(
            builder.build().unwrap_err(),
            CatalogError::DuplicatePlant(PlantId::from("turnip"))
        );
    }

    #[test]
    fn duplicate_structure_rejected() {
        let fence = StructureDef {
            id: StructureId::from("fence"),
            name: "Fence".into(),
            sprite: "fence".into(),
        };
        let mut builder = CatalogBuilder::new();
        builder
            .register_structure(fence.clone())
            .register_structure(fence);
        assert_eq!(
            builder.build().unwrap_err(),
            CatalogError::DuplicateStructure(StructureId::from("fence"))
        );
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut builder = CatalogBuilder::new();
        builder
            .register_plant(normal("turnip", vec![1]))
            .register_plant(hybrid("glowroot", "turnip", "moonbean"));
        assert_eq!(
            builder.build().unwrap_err(),
            CatalogError::UnknownParent {
                hybrid: PlantId::from("glowroot"),
                parent: PlantId::from("moonbean"),
            }
        );
    }

    #[test]
    fn shared_parent_pair_rejected() {
        let mut builder = CatalogBuilder::new();
        builder
            .register_plant(normal("turnip", vec![1]))
            .register_plant(normal("carrot", vec![1]))
            .register_plant(hybrid("glowroot", "turnip", "carrot"))
            .register_plant(hybrid("dimroot", "carrot", "turnip"));
        assert!(matches!(
            builder.build(),
            Err(CatalogError::DuplicateHybridPair { .. })
        ));
    }
}
