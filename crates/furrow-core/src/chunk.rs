//! The tile store for a single chunk.
//!
//! A [`Chunk`] maps packed tile keys to [`TileSlot`]s. Every mutator returns
//! a `Result` describing why it failed; none of the failures are fatal.
//! Mutations go through small get/update helpers that compact a slot away
//! as soon as it carries no state.

use crate::coord::{ChunkCoord, TileKey, TilePos};
use crate::id::{PlantId, SectionId, StructureId};
use crate::tile::{Crop, CropFlags, Structure, TileSlot};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a tile operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    #[error("tile {0} is not tilled")]
    NotTilled(TilePos),
    #[error("tile {0} is already tilled")]
    AlreadyTilled(TilePos),
    #[error("tile {0} already holds a crop")]
    CropPresent(TilePos),
    #[error("tile {0} already holds a structure")]
    StructurePresent(TilePos),
    #[error("tile {0} has no crop")]
    NoCrop(TilePos),
    #[error("tile {0} has no structure")]
    NoStructure(TilePos),
    #[error("tile {pos} is outside chunk {chunk}")]
    OutsideChunk { pos: TilePos, chunk: ChunkCoord },
    #[error("chunk {0} does not exist")]
    ChunkMissing(ChunkCoord),
    #[error("tile {0} is outside every active section")]
    OutsideSections(TilePos),
    #[error("slot at {0} holds both a crop and a structure")]
    Inconsistent(TilePos),
    #[error("plant {0} is not in the catalog")]
    UnknownPlant(PlantId),
    #[error("crop at {0} is not at its pollen stage")]
    NotPollenStage(TilePos),
    #[error("crop at {0} has no pollen left this stage")]
    PollenExhausted(TilePos),
    #[error("crop at {0} is not pollinated")]
    NotPollinated(TilePos),
    #[error("no hybrid is bred from {0} and {1}")]
    NoHybrid(PlantId, PlantId),
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A square region of tiles and the slots stored for it.
#[derive(Debug, Clone)]
pub struct Chunk {
    coord: ChunkCoord,
    section: SectionId,
    size: u32,
    slots: HashMap<TileKey, TileSlot>,
    /// Whether visuals for this chunk are currently spawned.
    pub loaded: bool,
    /// Whether the chunk changed since the flag was last cleared.
    pub dirty: bool,
}

impl Chunk {
    /// Create an empty chunk.
    pub fn new(coord: ChunkCoord, section: SectionId, size: u32) -> Self {
        Self {
            coord,
            section,
            size,
            slots: HashMap::new(),
            loaded: false,
            dirty: false,
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn section(&self) -> SectionId {
        self.section
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    // -- Queries --

    pub fn slot(&self, pos: TilePos) -> Option<&TileSlot> {
        self.slots.get(&pos.key())
    }

    /// All slots, in no particular order.
    pub fn slots(&self) -> impl Iterator<Item = &TileSlot> {
        self.slots.values()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether no tile in this chunk carries state.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn crop(&self, pos: TilePos) -> Option<&Crop> {
        self.slot(pos).and_then(TileSlot::crop)
    }

    pub fn structure(&self, pos: TilePos) -> Option<&Structure> {
        self.slot(pos).and_then(TileSlot::structure)
    }

    // -- Tilling --

    /// Till a tile, creating its slot if needed.
    pub fn till_tile(&mut self, pos: TilePos) -> Result<(), TileError> {
        self.check_bounds(pos)?;
        let slot = self
            .slots
            .entry(pos.key())
            .or_insert_with(|| TileSlot::empty(pos));
        if slot.tilled {
            return Err(TileError::AlreadyTilled(pos));
        }
        slot.tilled = true;
        self.dirty = true;
        Ok(())
    }

    /// Untill a tile. A crop or structure on it stays; the slot is dropped
    /// if nothing remains.
    pub fn untill_tile(&mut self, pos: TilePos) -> Result<(), TileError> {
        self.update_slot(pos, TileError::NotTilled(pos), |slot| {
            if !slot.tilled {
                return Err(TileError::NotTilled(pos));
            }
            slot.tilled = false;
            Ok(())
        })
    }

    // -- Crops --

    /// Plant a crop on a tilled, unoccupied tile.
    pub fn plant_crop(&mut self, pos: TilePos, plant_id: &PlantId) -> Result<Crop, TileError> {
        self.update_slot(pos, TileError::NotTilled(pos), |slot| {
            if !slot.tilled {
                return Err(TileError::NotTilled(pos));
            }
            if slot.crop.is_some() {
                return Err(TileError::CropPresent(pos));
            }
            if slot.structure.is_some() {
                return Err(TileError::StructurePresent(pos));
            }
            let crop = Crop::new(plant_id.clone());
            slot.crop = Some(crop.clone());
            Ok(crop)
        })
    }

    /// Remove a crop, returning it. The slot is dropped if it is neither
    /// tilled nor built on afterwards.
    pub fn remove_crop(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.update_slot(pos, TileError::NoCrop(pos), |slot| {
            slot.crop.take().ok_or(TileError::NoCrop(pos))
        })
    }

    /// Set the growth stage. Always resets the pollen harvest count, also
    /// when `stage` equals the current stage.
    pub fn update_crop_stage(&mut self, pos: TilePos, stage: u8) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.set_stage(stage))
    }

    pub fn increment_crop_age(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.total_age = crop.total_age.saturating_add(1))
    }

    pub fn update_crop_age(&mut self, pos: TilePos, age: u32) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.total_age = age)
    }

    pub fn increment_pollen_harvest_count(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| {
            crop.pollen_harvest_count = crop.pollen_harvest_count.saturating_add(1)
        })
    }

    pub fn reset_pollen_harvest_count(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.pollen_harvest_count = 0)
    }

    /// Overwrite the pollen harvest count with an authoritative value.
    pub fn set_pollen_harvest_count(&mut self, pos: TilePos, count: u8) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.pollen_harvest_count = count)
    }

    pub fn set_crop_flags(&mut self, pos: TilePos, flags: CropFlags) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| crop.set_flags(flags))
    }

    /// Replace an existing crop with a fresh one of another plant, as when a
    /// crossbreed turns a crop into its hybrid.
    pub fn replace_crop(&mut self, pos: TilePos, plant_id: &PlantId) -> Result<Crop, TileError> {
        self.update_crop(pos, |crop| *crop = Crop::new(plant_id.clone()))
    }

    // -- Structures --

    /// Place a structure. Tilling is not required, but the tile must not
    /// hold a crop or another structure.
    pub fn place_structure(
        &mut self,
        pos: TilePos,
        structure_id: &StructureId,
        placed_day: u32,
    ) -> Result<Structure, TileError> {
        self.check_bounds(pos)?;
        if let Some(slot) = self.slots.get(&pos.key()) {
            if slot.crop.is_some() {
                return Err(TileError::CropPresent(pos));
            }
            if slot.structure.is_some() {
                return Err(TileError::StructurePresent(pos));
            }
        }
        let structure = Structure::new(structure_id.clone(), placed_day);
        self.slots
            .entry(pos.key())
            .or_insert_with(|| TileSlot::empty(pos))
            .structure = Some(structure.clone());
        self.dirty = true;
        Ok(structure)
    }

    /// Remove a structure, returning it. The slot is dropped if it is not
    /// tilled.
    pub fn remove_structure(&mut self, pos: TilePos) -> Result<Structure, TileError> {
        self.update_slot(pos, TileError::NoStructure(pos), |slot| {
            slot.structure.take().ok_or(TileError::NoStructure(pos))
        })
    }

    // -- Bulk --

    /// Drop every slot.
    pub fn clear(&mut self) {
        if !self.slots.is_empty() {
            self.dirty = true;
        }
        self.slots.clear();
    }

    /// Insert or overwrite a whole slot, as a replay from a full sync or a
    /// snapshot does. Empty slots are ignored.
    pub fn restore_slot(&mut self, slot: TileSlot) -> Result<(), TileError> {
        let pos = slot.pos();
        self.check_bounds(pos)?;
        if !slot.is_consistent() {
            return Err(TileError::Inconsistent(pos));
        }
        self.dirty = true;
        if slot.is_empty() {
            self.slots.remove(&pos.key());
        } else {
            self.slots.insert(pos.key(), slot);
        }
        Ok(())
    }

    // -- Helpers --

    fn check_bounds(&self, pos: TilePos) -> Result<(), TileError> {
        if self.coord.contains(pos, self.size) {
            Ok(())
        } else {
            Err(TileError::OutsideChunk {
                pos,
                chunk: self.coord,
            })
        }
    }

    /// Run `f` against an existing slot and drop the slot if it ends up
    /// empty. `missing` is returned when there is no slot at `pos`.
    fn update_slot<R>(
        &mut self,
        pos: TilePos,
        missing: TileError,
        f: impl FnOnce(&mut TileSlot) -> Result<R, TileError>,
    ) -> Result<R, TileError> {
        self.check_bounds(pos)?;
        let key = pos.key();
        let slot = self.slots.get_mut(&key).ok_or(missing)?;
        let result = f(slot)?;
        if slot.is_empty() {
            self.slots.remove(&key);
        }
        self.dirty = true;
        Ok(result)
    }

    /// Run `f` against an existing crop and return the updated value.
    fn update_crop(
        &mut self,
        pos: TilePos,
        f: impl FnOnce(&mut Crop),
    ) -> Result<Crop, TileError> {
        self.update_slot(pos, TileError::NoCrop(pos), |slot| {
            let crop = slot.crop.as_mut().ok_or(TileError::NoCrop(pos))?;
            f(crop);
            Ok(crop.clone())
        })
    }
}
