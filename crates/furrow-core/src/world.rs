//! The world store: every chunk of every active section.
//!
//! Chunks are created eagerly when the store is built and live as long as
//! it does. All position-based operations resolve `tile -> section -> chunk`
//! here and then delegate to [`Chunk`]. Successful mutations mark the chunk
//! in a [`DirtyTracker`] so visual refresh and saving can run as separate
//! passes.

use crate::catalog::Catalog;
use crate::chunk::{Chunk, TileError};
use crate::config::{ConfigError, SectionConfig, WorldConfig};
use crate::coord::{ChunkCoord, TilePos};
use crate::dirty::DirtyTracker;
use crate::id::{PlantId, SectionId, StructureId};
use crate::sim::StateHash;
use crate::tile::{Crop, CropFlags, Structure, TileSlot};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct WorldStore {
    chunk_size: u32,
    /// Registration order; section lookup returns the first match.
    sections: Vec<SectionConfig>,
    chunks: HashMap<SectionId, HashMap<ChunkCoord, Chunk>>,
    /// Chunk -> owning section.
    membership: HashMap<ChunkCoord, SectionId>,
    dirty: DirtyTracker,
    max_pollen_harvests: u8,
}

impl WorldStore {
    /// Validate `config` and pre-create every chunk of every active section.
    ///
    /// A chunk covered by two sections belongs to the first one registered.
    pub fn new(config: &WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut chunks: HashMap<SectionId, HashMap<ChunkCoord, Chunk>> = HashMap::new();
        let mut membership = HashMap::new();

        for section in config.sections.iter().filter(|s| s.active) {
            let owned = chunks.entry(section.id).or_default();
            for coord in section.bounds().chunks() {
                if let Some(owner) = membership.get(&coord) {
                    debug!(%coord, section = %section.id, %owner, "chunk already owned by an earlier section");
                    continue;
                }
                membership.insert(coord, section.id);
                owned.insert(coord, Chunk::new(coord, section.id, config.chunk_size));
            }
        }

        info!(
            sections = chunks.len(),
            chunks = membership.len(),
            chunk_size = config.chunk_size,
            "world store initialized"
        );

        Ok(Self {
            chunk_size: config.chunk_size,
            sections: config.sections.clone(),
            chunks,
            membership,
            dirty: DirtyTracker::new(),
            max_pollen_harvests: config.growth.max_pollen_harvests_per_stage,
        })
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn sections(&self) -> &[SectionConfig] {
        &self.sections
    }

    pub fn chunk_count(&self) -> usize {
        self.membership.len()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// The first active section containing a tile.
    pub fn section_at(&self, pos: TilePos) -> Option<&SectionConfig> {
        self.sections
            .iter()
            .find(|s| s.active && s.bounds().contains_tile(pos, self.chunk_size))
    }

    pub fn get_chunk(&self, section: SectionId, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&section)?.get(&coord)
    }

    pub fn get_chunk_mut(&mut self, section: SectionId, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&section)?.get_mut(&coord)
    }

    /// A chunk by coordinate alone, through the membership index.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        let section = self.membership.get(&coord)?;
        self.get_chunk(*section, coord)
    }

    fn chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        let section = *self.membership.get(&coord)?;
        self.get_chunk_mut(section, coord)
    }

    pub fn contains_chunk(&self, coord: ChunkCoord) -> bool {
        self.membership.contains_key(&coord)
    }

    pub fn chunk_at_world_position(&self, pos: TilePos) -> Option<&Chunk> {
        let section = self.section_at(pos)?;
        self.get_chunk(section.id, pos.chunk(self.chunk_size))
    }

    /// Every chunk coordinate, sorted.
    pub fn chunk_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self.membership.keys().copied().collect();
        coords.sort();
        coords
    }

    /// Chunks holding at least one slot, sorted by coordinate.
    pub fn non_empty_chunks(&self) -> Vec<&Chunk> {
        let mut out: Vec<&Chunk> = self
            .chunks
            .values()
            .flat_map(|m| m.values())
            .filter(|c| !c.is_empty())
            .collect();
        out.sort_by_key(|c| c.coord());
        out
    }

    /// Positions of every crop in the world, sorted.
    pub fn crop_positions(&self) -> Vec<TilePos> {
        let mut out: Vec<TilePos> = self
            .chunks
            .values()
            .flat_map(|m| m.values())
            .flat_map(|c| c.slots())
            .filter(|s| s.has_crop())
            .map(TileSlot::pos)
            .collect();
        out.sort();
        out
    }

    pub fn slot(&self, pos: TilePos) -> Option<&TileSlot> {
        self.chunk_at_world_position(pos)?.slot(pos)
    }

    pub fn crop(&self, pos: TilePos) -> Option<&Crop> {
        self.slot(pos).and_then(TileSlot::crop)
    }

    pub fn structure(&self, pos: TilePos) -> Option<&Structure> {
        self.slot(pos).and_then(TileSlot::structure)
    }

    // -----------------------------------------------------------------------
    // Tile facades
    // -----------------------------------------------------------------------

    pub fn till_tile(&mut self, pos: TilePos) -> Result<(), TileError> {
        self.with_chunk(pos, |c| c.till_tile(pos))
    }

    pub fn untill_tile(&mut self, pos: TilePos) -> Result<(), TileError> {
        self.with_chunk(pos, |c| c.untill_tile(pos))
    }

    pub fn plant_crop(&mut self, pos: TilePos, plant_id: &PlantId) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.plant_crop(pos, plant_id))
    }

    pub fn remove_crop(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.remove_crop(pos))
    }

    pub fn update_crop_stage(&mut self, pos: TilePos, stage: u8) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.update_crop_stage(pos, stage))
    }

    pub fn increment_crop_age(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.increment_crop_age(pos))
    }

    pub fn update_crop_age(&mut self, pos: TilePos, age: u32) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.update_crop_age(pos, age))
    }

    pub fn increment_pollen_harvest_count(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.increment_pollen_harvest_count(pos))
    }

    pub fn reset_pollen_harvest_count(&mut self, pos: TilePos) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.reset_pollen_harvest_count(pos))
    }

    pub fn set_pollen_harvest_count(&mut self, pos: TilePos, count: u8) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.set_pollen_harvest_count(pos, count))
    }

    pub fn set_crop_flags(&mut self, pos: TilePos, flags: CropFlags) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.set_crop_flags(pos, flags))
    }

    pub fn replace_crop(&mut self, pos: TilePos, plant_id: &PlantId) -> Result<Crop, TileError> {
        self.with_chunk(pos, |c| c.replace_crop(pos, plant_id))
    }

    pub fn place_structure(
        &mut self,
        pos: TilePos,
        structure_id: &StructureId,
        placed_day: u32,
    ) -> Result<Structure, TileError> {
        self.with_chunk(pos, |c| c.place_structure(pos, structure_id, placed_day))
    }

    pub fn remove_structure(&mut self, pos: TilePos) -> Result<Structure, TileError> {
        self.with_chunk(pos, |c| c.remove_structure(pos))
    }

    // -----------------------------------------------------------------------
    // Gameplay rules
    // -----------------------------------------------------------------------

    /// Take pollen from a crop at its plant's pollen stage, up to the
    /// configured number of harvests per stage. Returns the updated crop.
    pub fn harvest_pollen(&mut self, pos: TilePos, catalog: &Catalog) -> Result<Crop, TileError> {
        let crop = self.crop(pos).ok_or(TileError::NoCrop(pos))?;
        let def = catalog
            .plant(&crop.plant_id)
            .ok_or_else(|| TileError::UnknownPlant(crop.plant_id.clone()))?;
        if !def.bears_pollen(crop.stage) {
            return Err(TileError::NotPollenStage(pos));
        }
        if crop.pollen_harvest_count >= self.max_pollen_harvests {
            return Err(TileError::PollenExhausted(pos));
        }
        self.increment_pollen_harvest_count(pos)
    }

    /// Crossbreed two pollinated crops. The target crop is replaced by a
    /// freshly planted hybrid; the donor is left alone.
    pub fn crossbreed(
        &mut self,
        target: TilePos,
        donor: TilePos,
        catalog: &Catalog,
    ) -> Result<Crop, TileError> {
        let target_crop = self.crop(target).ok_or(TileError::NoCrop(target))?;
        let donor_crop = self.crop(donor).ok_or(TileError::NoCrop(donor))?;
        if !target_crop.pollinated {
            return Err(TileError::NotPollinated(target));
        }
        if !donor_crop.pollinated {
            return Err(TileError::NotPollinated(donor));
        }
        let hybrid = catalog
            .hybrid_of(&target_crop.plant_id, &donor_crop.plant_id)
            .ok_or_else(|| {
                TileError::NoHybrid(target_crop.plant_id.clone(), donor_crop.plant_id.clone())
            })?;
        let hybrid_id = hybrid.id.clone();
        self.replace_crop(target, &hybrid_id)
    }

    // -----------------------------------------------------------------------
    // Bulk (sync replay, snapshots)
    // -----------------------------------------------------------------------

    /// Drop every slot of a chunk.
    pub fn clear_chunk(&mut self, coord: ChunkCoord) -> Result<(), TileError> {
        let chunk = self
            .chunk_mut(coord)
            .ok_or(TileError::ChunkMissing(coord))?;
        chunk.clear();
        self.dirty.mark_chunk(coord);
        Ok(())
    }

    /// Overwrite one slot of a chunk with a replicated or saved value.
    pub fn restore_slot(&mut self, coord: ChunkCoord, slot: TileSlot) -> Result<(), TileError> {
        let chunk = self
            .chunk_mut(coord)
            .ok_or(TileError::ChunkMissing(coord))?;
        chunk.restore_slot(slot)?;
        self.dirty.mark_chunk(coord);
        Ok(())
    }

    /// Drop every slot in the world.
    pub fn clear_all(&mut self) {
        for coord in self.chunk_coords() {
            if let Some(chunk) = self.chunk_mut(coord)
                && !chunk.is_empty()
            {
                chunk.clear();
                self.dirty.mark_chunk(coord);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Loading and change tracking
    // -----------------------------------------------------------------------

    pub fn set_chunk_loaded(&mut self, coord: ChunkCoord, loaded: bool) {
        if let Some(chunk) = self.chunk_mut(coord) {
            chunk.loaded = loaded;
        }
    }

    pub fn is_chunk_loaded(&self, coord: ChunkCoord) -> bool {
        self.chunk(coord).is_some_and(|c| c.loaded)
    }

    pub fn has_dirty_chunks(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Take the chunks changed since the last call and clear their flags.
    pub fn take_dirty_chunks(&mut self) -> Vec<ChunkCoord> {
        let coords = self.dirty.drain();
        for coord in &coords {
            if let Some(chunk) = self.chunk_mut(*coord) {
                chunk.dirty = false;
            }
        }
        coords
    }

    /// Order-independent hash of every slot, for desync detection.
    #[cfg(not(feature = "parallel"))]
    pub fn state_hash(&self) -> u64 {
        StateHash::of_slots(
            self.chunks
                .values()
                .flat_map(|m| m.values())
                .flat_map(|c| c.slots()),
        )
    }

    /// Order-independent hash of every slot, for desync detection. Chunks
    /// are hashed in parallel; the per-chunk sums combine the same way the
    /// per-slot hashes do.
    #[cfg(feature = "parallel")]
    pub fn state_hash(&self) -> u64 {
        use rayon::prelude::*;
        let chunks: Vec<&Chunk> = self.chunks.values().flat_map(|m| m.values()).collect();
        chunks
            .par_iter()
            .map(|c| StateHash::of_slots(c.slots()))
            .reduce(|| 0, u64::wrapping_add)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Resolve `pos` to its chunk, run `f`, and mark the chunk dirty on
    /// success.
    fn with_chunk<R>(
        &mut self,
        pos: TilePos,
        f: impl FnOnce(&mut Chunk) -> Result<R, TileError>,
    ) -> Result<R, TileError> {
        let section = self
            .section_at(pos)
            .map(|s| s.id)
            .ok_or(TileError::OutsideSections(pos))?;
        let coord = pos.chunk(self.chunk_size);
        let chunk = self
            .get_chunk_mut(section, coord)
            .ok_or(TileError::ChunkMissing(coord))?;
        let result = f(chunk)?;
        self.dirty.mark_chunk(coord);
        Ok(result)
    }
}
