//! Per-position tile records.
//!
//! A [`TileSlot`] exists only while it carries state: it is created the
//! first time its position is tilled or built on, and removed by its chunk
//! as soon as it is neither tilled nor holds a crop or a structure.

use crate::coord::{TileKey, TilePos};
use crate::id::{PlantId, StructureId};
use serde::{Deserialize, Serialize};

/// Wire flag: the slot is tilled.
pub const FLAG_TILLED: u8 = 0b0000_0001;
/// Wire flag: the slot holds a crop.
pub const FLAG_CROP: u8 = 0b0000_0010;
/// Wire flag: the slot holds a structure.
pub const FLAG_STRUCTURE: u8 = 0b0000_0100;

// ---------------------------------------------------------------------------
// Crop
// ---------------------------------------------------------------------------

/// A crop growing on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crop {
    pub plant_id: PlantId,
    /// Current growth stage, starting at 0.
    pub stage: u8,
    /// Days since planting.
    pub total_age: u32,
    /// Pollen harvests taken during the current stage.
    pub pollen_harvest_count: u8,
    pub watered: bool,
    pub fertilized: bool,
    pub pollinated: bool,
}

impl Crop {
    /// A freshly planted crop: stage 0, age 0, no pollen taken, no care flags.
    pub fn new(plant_id: PlantId) -> Self {
        Self {
            plant_id,
            stage: 0,
            total_age: 0,
            pollen_harvest_count: 0,
            watered: false,
            fertilized: false,
            pollinated: false,
        }
    }

    /// Set the stage and restart the pollen count, even when the stage is
    /// unchanged.
    pub fn set_stage(&mut self, stage: u8) {
        self.stage = stage;
        self.pollen_harvest_count = 0;
    }

    pub fn flags(&self) -> CropFlags {
        CropFlags {
            watered: self.watered,
            fertilized: self.fertilized,
            pollinated: self.pollinated,
        }
    }

    pub fn set_flags(&mut self, flags: CropFlags) {
        self.watered = flags.watered;
        self.fertilized = flags.fertilized;
        self.pollinated = flags.pollinated;
    }
}

/// The care flags of a crop, replicated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CropFlags {
    pub watered: bool,
    pub fertilized: bool,
    pub pollinated: bool,
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// A structure placed on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Structure {
    pub structure_id: StructureId,
    /// In-game day the structure was placed.
    pub placed_day: u32,
}

impl Structure {
    pub fn new(structure_id: StructureId, placed_day: u32) -> Self {
        Self {
            structure_id,
            placed_day,
        }
    }
}

// ---------------------------------------------------------------------------
// TileSlot
// ---------------------------------------------------------------------------

/// State of one world tile.
///
/// A slot never holds a crop and a structure at the same time. The chunk
/// mutators and the wire decoder both enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSlot {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) tilled: bool,
    pub(crate) crop: Option<Crop>,
    pub(crate) structure: Option<Structure>,
}

impl TileSlot {
    /// An empty slot at a position. Callers fill it before storing it.
    pub(crate) fn empty(pos: TilePos) -> Self {
        Self {
            x: pos.x,
            y: pos.y,
            tilled: false,
            crop: None,
            structure: None,
        }
    }

    /// A tilled slot with nothing on it.
    pub fn tilled(pos: TilePos) -> Self {
        Self {
            tilled: true,
            ..Self::empty(pos)
        }
    }

    /// A tilled slot holding a crop.
    pub fn with_crop(pos: TilePos, crop: Crop) -> Self {
        Self {
            tilled: true,
            crop: Some(crop),
            ..Self::empty(pos)
        }
    }

    /// A slot holding a structure, tilled or not.
    pub fn with_structure(pos: TilePos, tilled: bool, structure: Structure) -> Self {
        Self {
            tilled,
            structure: Some(structure),
            ..Self::empty(pos)
        }
    }

    pub fn pos(&self) -> TilePos {
        TilePos::new(self.x, self.y)
    }

    pub fn key(&self) -> TileKey {
        TileKey::pack(self.x, self.y)
    }

    pub fn is_tilled(&self) -> bool {
        self.tilled
    }

    pub fn has_crop(&self) -> bool {
        self.crop.is_some()
    }

    pub fn has_structure(&self) -> bool {
        self.structure.is_some()
    }

    pub fn crop(&self) -> Option<&Crop> {
        self.crop.as_ref()
    }

    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    /// Whether the slot carries no state and should be dropped.
    pub fn is_empty(&self) -> bool {
        !self.tilled && self.crop.is_none() && self.structure.is_none()
    }

    /// Whether the crop/structure exclusion holds.
    pub fn is_consistent(&self) -> bool {
        !(self.crop.is_some() && self.structure.is_some())
    }

    /// Wire flags byte: bit0 tilled, bit1 crop, bit2 structure.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.tilled {
            flags |= FLAG_TILLED;
        }
        if self.crop.is_some() {
            flags |= FLAG_CROP;
        }
        if self.structure.is_some() {
            flags |= FLAG_STRUCTURE;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_crop_starts_fresh() {
        let crop = Crop::new(PlantId::from("turnip"));
        assert_eq!(crop.stage, 0);
        assert_eq!(crop.total_age, 0);
        assert_eq!(crop.pollen_harvest_count, 0);
        assert_eq!(crop.flags(), CropFlags::default());
    }

    #[test]
    fn set_stage_resets_pollen() {
        let mut crop = Crop::new(PlantId::from("turnip"));
        crop.pollen_harvest_count = 2;
        crop.set_stage(3);
        assert_eq!(crop.stage, 3);
        assert_eq!(crop.pollen_harvest_count, 0);

        crop.pollen_harvest_count = 1;
        crop.set_stage(3);
        assert_eq!(crop.stage, 3);
        assert_eq!(crop.pollen_harvest_count, 0);
    }

    #[test]
    fn flags_byte_layout() {
        let pos = TilePos::new(1, 2);
        assert_eq!(TileSlot::tilled(pos).flags(), FLAG_TILLED);
        assert_eq!(
            TileSlot::with_crop(pos, Crop::new(PlantId::from("turnip"))).flags(),
            FLAG_TILLED | FLAG_CROP
        );
        assert_eq!(
            TileSlot::with_structure(pos, false, Structure::new(StructureId::from("fence"), 4))
                .flags(),
            FLAG_STRUCTURE
        );
    }

    #[test]
    fn empty_slot_detection() {
        let mut slot = TileSlot::tilled(TilePos::new(0, 0));
        assert!(!slot.is_empty());
        slot.tilled = false;
        assert!(slot.is_empty());
    }
}
