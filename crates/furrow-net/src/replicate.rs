//! Incremental mutation replication.
//!
//! A local mutation is applied to the world store first and, only if it
//! succeeds, turned into the delta message the session broadcasts. Deltas
//! carry absolute values (stage, age, pollen count, flags), so applying one
//! twice leaves the tile as applying it once did.

use crate::message::FarmMessage;
use furrow_core::catalog::Catalog;
use furrow_core::chunk::TileError;
use furrow_core::coord::TilePos;
use furrow_core::id::{PlantId, StructureId};
use furrow_core::tile::CropFlags;
use furrow_core::world::WorldStore;

/// A tile mutation requested by gameplay on the local peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileMutation {
    Till {
        pos: TilePos,
    },
    Untill {
        pos: TilePos,
    },
    PlantCrop {
        pos: TilePos,
        plant_id: PlantId,
    },
    RemoveCrop {
        pos: TilePos,
    },
    SetCropStage {
        pos: TilePos,
        stage: u8,
    },
    HarvestPollen {
        pos: TilePos,
    },
    /// Replace the crop at `target` with the hybrid of it and `donor`.
    Crossbreed {
        target: TilePos,
        donor: TilePos,
    },
    PlaceStructure {
        pos: TilePos,
        structure_id: StructureId,
        day: u32,
    },
    RemoveStructure {
        pos: TilePos,
    },
    TendCrop {
        pos: TilePos,
        flags: CropFlags,
    },
}

impl TileMutation {
    /// The tile whose state changes.
    pub fn pos(&self) -> TilePos {
        match self {
            TileMutation::Till { pos }
            | TileMutation::Untill { pos }
            | TileMutation::PlantCrop { pos, .. }
            | TileMutation::RemoveCrop { pos }
            | TileMutation::SetCropStage { pos, .. }
            | TileMutation::HarvestPollen { pos }
            | TileMutation::PlaceStructure { pos, .. }
            | TileMutation::RemoveStructure { pos }
            | TileMutation::TendCrop { pos, .. } => *pos,
            TileMutation::Crossbreed { target, .. } => *target,
        }
    }
}

/// Apply a mutation to the local store and return the delta describing
/// its result.
pub fn apply_local(
    world: &mut WorldStore,
    catalog: &Catalog,
    mutation: &TileMutation,
) -> Result<FarmMessage, TileError> {
    Ok(match mutation {
        TileMutation::Till { pos } => {
            world.till_tile(*pos)?;
            FarmMessage::Tilled { pos: *pos }
        }
        TileMutation::Untill { pos } => {
            world.untill_tile(*pos)?;
            FarmMessage::Untilled { pos: *pos }
        }
        TileMutation::PlantCrop { pos, plant_id } => {
            world.plant_crop(*pos, plant_id)?;
            FarmMessage::CropPlanted {
                pos: *pos,
                plant_id: plant_id.clone(),
            }
        }
        TileMutation::RemoveCrop { pos } => {
            world.remove_crop(*pos)?;
            FarmMessage::CropRemoved { pos: *pos }
        }
        TileMutation::SetCropStage { pos, stage } => {
            let crop = world.update_crop_stage(*pos, *stage)?;
            FarmMessage::CropStageUpdated {
                pos: *pos,
                stage: crop.stage,
                total_age: crop.total_age,
            }
        }
        TileMutation::HarvestPollen { pos } => {
            let crop = world.harvest_pollen(*pos, catalog)?;
            FarmMessage::PollenHarvested {
                pos: *pos,
                count: crop.pollen_harvest_count,
            }
        }
        TileMutation::Crossbreed { target, donor } => {
            let crop = world.crossbreed(*target, *donor, catalog)?;
            FarmMessage::Crossbred {
                pos: *target,
                plant_id: crop.plant_id,
            }
        }
        TileMutation::PlaceStructure {
            pos,
            structure_id,
            day,
        } => {
            world.place_structure(*pos, structure_id, *day)?;
            FarmMessage::StructurePlaced {
                pos: *pos,
                structure_id: structure_id.clone(),
                placed_day: *day,
            }
        }
        TileMutation::RemoveStructure { pos } => {
            world.remove_structure(*pos)?;
            FarmMessage::StructureRemoved { pos: *pos }
        }
        TileMutation::TendCrop { pos, flags } => {
            let crop = world.set_crop_flags(*pos, *flags)?;
            FarmMessage::CropTended {
                pos: *pos,
                flags: crop.flags(),
            }
        }
    })
}

/// What applying a received delta did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied(TilePos),
    /// The tile already had the delta's state.
    AlreadyApplied(TilePos),
    /// The message is part of full sync, not a delta.
    NotADelta,
}

/// Apply a delta received from another peer.
pub fn apply_delta(world: &mut WorldStore, message: &FarmMessage) -> Result<DeltaOutcome, TileError> {
    let Some(pos) = message.delta_pos() else {
        return Ok(DeltaOutcome::NotADelta);
    };
    let slot = world.slot(pos);
    let tilled = slot.is_some_and(|s| s.is_tilled());
    let crop = slot.and_then(|s| s.crop());
    let structure = slot.and_then(|s| s.structure());

    let duplicate = match message {
        FarmMessage::Tilled { .. } => tilled,
        FarmMessage::Untilled { .. } => !tilled,
        FarmMessage::CropPlanted { plant_id, .. } => {
            crop.is_some_and(|c| c.plant_id == *plant_id && c.stage == 0 && c.total_age == 0)
        }
        FarmMessage::CropRemoved { .. } => crop.is_none(),
        // A stage update also zeroes the pollen count.
        FarmMessage::CropStageUpdated {
            stage, total_age, ..
        } => crop.is_some_and(|c| {
            c.stage == *stage && c.total_age == *total_age && c.pollen_harvest_count == 0
        }),
        FarmMessage::Crossbred { plant_id, .. } => crop.is_some_and(|c| c.plant_id == *plant_id),
        FarmMessage::StructurePlaced { structure_id, .. } => {
            structure.is_some_and(|s| s.structure_id == *structure_id)
        }
        FarmMessage::StructureRemoved { .. } => structure.is_none(),
        _ => false,
    };
    if duplicate {
        return Ok(DeltaOutcome::AlreadyApplied(pos));
    }

    match message {
        FarmMessage::Tilled { .. } => world.till_tile(pos)?,
        FarmMessage::Untilled { .. } => world.untill_tile(pos)?,
        FarmMessage::CropPlanted { plant_id, .. } => {
            world.plant_crop(pos, plant_id)?;
        }
        FarmMessage::CropRemoved { .. } => {
            world.remove_crop(pos)?;
        }
        FarmMessage::CropStageUpdated {
            stage, total_age, ..
        } => {
            world.update_crop_stage(pos, *stage)?;
            world.update_crop_age(pos, *total_age)?;
        }
        FarmMessage::PollenHarvested { count, .. } => {
            world.set_pollen_harvest_count(pos, *count)?;
        }
        FarmMessage::Crossbred { plant_id, .. } => {
            world.replace_crop(pos, plant_id)?;
        }
        FarmMessage::StructurePlaced {
            structure_id,
            placed_day,
            ..
        } => {
            world.place_structure(pos, structure_id, *placed_day)?;
        }
        FarmMessage::StructureRemoved { .. } => {
            world.remove_structure(pos)?;
        }
        FarmMessage::CropTended { flags, .. } => {
            world.set_crop_flags(pos, *flags)?;
        }
        FarmMessage::SyncRequest
        | FarmMessage::SyncBatch { .. }
        | FarmMessage::SyncComplete { .. } => return Ok(DeltaOutcome::NotADelta),
    }
    Ok(DeltaOutcome::Applied(pos))
}
