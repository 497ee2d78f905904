//! Proximity-driven chunk activation.
//!
//! The controller polls the local peer's chunk on a fixed interval. When it
//! changes, every existing chunk within `load_radius` (Chebyshev) becomes
//! wanted. Wanted chunks are activated at once; chunks that stop being
//! wanted are scheduled for unload after `unload_delay` and the schedule is
//! cancelled if they are wanted again first. Only visuals are created or
//! destroyed here; tile state always stays in the [`WorldStore`].

use crate::catalog::Catalog;
use crate::chunk::Chunk;
use crate::config::LoadingConfig;
use crate::coord::{ChunkCoord, TilePos};
use crate::world::WorldStore;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Sprite key used for tilled ground.
pub const SOIL_SPRITE: &str = "tilled_soil";

// ---------------------------------------------------------------------------
// Visual collaborator
// ---------------------------------------------------------------------------

/// What a spawned tile visual represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualKind {
    Soil,
    Crop,
    Structure,
}

/// Creates and destroys tile visuals on behalf of the loading controller.
pub trait VisualSpawner {
    fn spawn_tile_visual(&mut self, pos: TilePos, kind: VisualKind, sprite_key: &str);

    /// Destroy every visual previously spawned for a chunk.
    fn destroy_chunk_visuals(&mut self, chunk: ChunkCoord);
}

/// Spawn visuals for every slot of a chunk, in position order.
///
/// Crops whose plant is missing from the catalog fall back to the plant id
/// as sprite key, structures likewise.
pub fn spawn_chunk_visuals(chunk: &Chunk, catalog: &Catalog, spawner: &mut dyn VisualSpawner) {
    let mut slots: Vec<_> = chunk.slots().collect();
    slots.sort_by_key(|s| s.pos());

    for slot in slots {
        let pos = slot.pos();
        if slot.is_tilled() {
            spawner.spawn_tile_visual(pos, VisualKind::Soil, SOIL_SPRITE);
        }
        if let Some(crop) = slot.crop() {
            let sprite = catalog
                .plant(&crop.plant_id)
                .and_then(|def| def.stage_sprite(crop.stage));
            match sprite {
                Some(key) => spawner.spawn_tile_visual(pos, VisualKind::Crop, &key),
                None => {
                    debug!(%pos, plant = %crop.plant_id, "no sprite for crop, using plant id");
                    spawner.spawn_tile_visual(pos, VisualKind::Crop, crop.plant_id.as_str());
                }
            }
        }
        if let Some(structure) = slot.structure() {
            let key = catalog
                .structure(&structure.structure_id)
                .map(|def| def.sprite.as_str())
                .unwrap_or(structure.structure_id.as_str());
            spawner.spawn_tile_visual(pos, VisualKind::Structure, key);
        }
    }
}

// ---------------------------------------------------------------------------
// LoadingController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadingController {
    config: LoadingConfig,
    since_poll: Duration,
    poll_due: bool,
    current_chunk: Option<ChunkCoord>,
    wanted: BTreeSet<ChunkCoord>,
    /// Chunks with spawned visuals, including those pending unload.
    active: BTreeSet<ChunkCoord>,
    /// Chunks scheduled for unload, with the time left before it happens.
    pending_unload: BTreeMap<ChunkCoord, Duration>,
    /// Chunks activated during the last update.
    pub newly_activated: Vec<ChunkCoord>,
    /// Chunks unloaded during the last update.
    pub newly_deactivated: Vec<ChunkCoord>,
}

impl LoadingController {
    pub fn new(config: LoadingConfig) -> Self {
        Self {
            config,
            since_poll: Duration::ZERO,
            poll_due: true,
            current_chunk: None,
            wanted: BTreeSet::new(),
            active: BTreeSet::new(),
            pending_unload: BTreeMap::new(),
            newly_activated: Vec::new(),
            newly_deactivated: Vec::new(),
        }
    }

    pub fn config(&self) -> &LoadingConfig {
        &self.config
    }

    pub fn current_chunk(&self) -> Option<ChunkCoord> {
        self.current_chunk
    }

    pub fn wanted(&self) -> &BTreeSet<ChunkCoord> {
        &self.wanted
    }

    pub fn active_chunks(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.active.iter().copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, chunk: ChunkCoord) -> bool {
        self.active.contains(&chunk)
    }

    pub fn is_pending_unload(&self, chunk: ChunkCoord) -> bool {
        self.pending_unload.contains_key(&chunk)
    }

    /// Time left before a pending chunk unloads.
    pub fn unload_remaining(&self, chunk: ChunkCoord) -> Option<Duration> {
        self.pending_unload.get(&chunk).copied()
    }

    /// Re-evaluate the local chunk on the next update regardless of the
    /// poll interval.
    pub fn request_poll(&mut self) {
        self.poll_due = true;
    }

    /// Advance by `dt`. Polls the local peer's chunk when the interval has
    /// elapsed (and on the very first update), then counts down pending
    /// unloads.
    pub fn update(
        &mut self,
        dt: Duration,
        local_pos: TilePos,
        world: &mut WorldStore,
        catalog: &Catalog,
        spawner: &mut dyn VisualSpawner,
    ) {
        self.newly_activated.clear();
        self.newly_deactivated.clear();

        self.since_poll += dt;
        let mut just_scheduled = BTreeSet::new();
        if self.poll_due || self.since_poll >= self.config.poll_interval() {
            self.since_poll = Duration::ZERO;
            self.poll_due = false;
            let chunk = local_pos.chunk(world.chunk_size());
            if self.current_chunk != Some(chunk) {
                just_scheduled = self.enter_chunk(chunk, world, catalog, spawner);
            }
        }

        let mut expired = Vec::new();
        for (coord, remaining) in self.pending_unload.iter_mut() {
            if just_scheduled.contains(coord) {
                continue;
            }
            *remaining = remaining.saturating_sub(dt);
            if remaining.is_zero() {
                expired.push(*coord);
            }
        }
        for coord in expired {
            self.pending_unload.remove(&coord);
            self.unload(coord, world, spawner);
        }
    }

    /// Destroy and respawn the visuals of one active chunk. Returns `false`
    /// if the chunk is not active.
    pub fn refresh_chunk(
        &mut self,
        coord: ChunkCoord,
        world: &WorldStore,
        catalog: &Catalog,
        spawner: &mut dyn VisualSpawner,
    ) -> bool {
        if !self.active.contains(&coord) {
            return false;
        }
        spawner.destroy_chunk_visuals(coord);
        if let Some(chunk) = world.chunk(coord) {
            spawn_chunk_visuals(chunk, catalog, spawner);
        }
        trace!(%coord, "chunk visuals refreshed");
        true
    }

    /// Unload and immediately reactivate every active chunk, so visuals
    /// match state changed in bulk (a new day's growth pass).
    pub fn reload_all(
        &mut self,
        world: &WorldStore,
        catalog: &Catalog,
        spawner: &mut dyn VisualSpawner,
    ) {
        let coords: Vec<ChunkCoord> = self.active.iter().copied().collect();
        for coord in &coords {
            spawner.destroy_chunk_visuals(*coord);
        }
        for coord in &coords {
            if let Some(chunk) = world.chunk(*coord) {
                spawn_chunk_visuals(chunk, catalog, spawner);
            }
        }
        debug!(chunks = coords.len(), "reloaded all active chunks");
    }

    /// Destroy every visual and forget all loading state. Returns the chunks
    /// that were active.
    pub fn shutdown(
        &mut self,
        world: &mut WorldStore,
        spawner: &mut dyn VisualSpawner,
    ) -> Vec<ChunkCoord> {
        let coords: Vec<ChunkCoord> = std::mem::take(&mut self.active).into_iter().collect();
        for coord in &coords {
            spawner.destroy_chunk_visuals(*coord);
            world.set_chunk_loaded(*coord, false);
        }
        self.pending_unload.clear();
        self.wanted.clear();
        self.current_chunk = None;
        self.poll_due = true;
        self.since_poll = Duration::ZERO;
        debug!(chunks = coords.len(), "loading controller shut down");
        coords
    }

    // -- Internals --

    /// Recompute the wanted set around `center`. Returns the chunks newly
    /// scheduled for unload.
    fn enter_chunk(
        &mut self,
        center: ChunkCoord,
        world: &mut WorldStore,
        catalog: &Catalog,
        spawner: &mut dyn VisualSpawner,
    ) -> BTreeSet<ChunkCoord> {
        debug!(from = ?self.current_chunk, to = %center, "local chunk changed");
        self.current_chunk = Some(center);
        self.wanted = center
            .neighborhood(self.config.load_radius)
            .filter(|c| world.contains_chunk(*c))
            .collect();

        let wanted: Vec<ChunkCoord> = self.wanted.iter().copied().collect();
        for coord in wanted {
            if self.pending_unload.remove(&coord).is_some() {
                debug!(%coord, "pending unload cancelled");
            }
            if !self.active.contains(&coord) {
                self.activate(coord, world, catalog, spawner);
            }
        }

        let delay = self.config.unload_delay();
        let unwanted: Vec<ChunkCoord> = self
            .active
            .iter()
            .filter(|c| !self.wanted.contains(*c) && !self.pending_unload.contains_key(*c))
            .copied()
            .collect();

        let mut scheduled = BTreeSet::new();
        for coord in unwanted {
            if delay.is_zero() {
                self.unload(coord, world, spawner);
            } else {
                trace!(%coord, ?delay, "unload scheduled");
                self.pending_unload.insert(coord, delay);
                scheduled.insert(coord);
            }
        }
        scheduled
    }

    fn activate(
        &mut self,
        coord: ChunkCoord,
        world: &mut WorldStore,
        catalog: &Catalog,
        spawner: &mut dyn VisualSpawner,
    ) {
        if let Some(chunk) = world.chunk(coord) {
            spawn_chunk_visuals(chunk, catalog, spawner);
        }
        world.set_chunk_loaded(coord, true);
        self.active.insert(coord);
        self.newly_activated.push(coord);
        debug!(%coord, "chunk activated");
    }

    fn unload(&mut self, coord: ChunkCoord, world: &mut WorldStore, spawner: &mut dyn VisualSpawner) {
        spawner.destroy_chunk_visuals(coord);
        world.set_chunk_loaded(coord, false);
        self.active.remove(&coord);
        self.newly_deactivated.push(coord);
        debug!(%coord, "chunk unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SectionConfig, WorldConfig};
    use crate::id::{PlantId, SectionId, StructureId};
    use crate::test_utils::{RecordingSpawner, SpawnerCall, test_catalog};

    const TICK: Duration = Duration::from_millis(250);

    /// A 7x7 block of chunks centred on the origin, chunk size 10.
    fn world() -> WorldStore {
        let config = WorldConfig {
            chunk_size: 10,
            sections: vec![SectionConfig::new(
                SectionId(1),
                ChunkCoord::new(-3, -3),
                7,
                7,
            )],
            ..WorldConfig::default()
        };
        WorldStore::new(&config).unwrap()
    }

    fn controller() -> LoadingController {
        LoadingController::new(LoadingConfig {
            load_radius: 1,
            unload_delay_ms: 1_000,
            poll_interval_ms: 250,
        })
    }

    fn in_chunk(x: i32, y: i32) -> TilePos {
        TilePos::new(x * 10 + 5, y * 10 + 5)
    }

    fn square(cx: i32, cy: i32) -> BTreeSet<ChunkCoord> {
        ChunkCoord::new(cx, cy).neighborhood(1).collect()
    }

    #[test]
    fn first_update_activates_neighborhood() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(Duration::ZERO, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        assert_eq!(lc.current_chunk(), Some(ChunkCoord::new(0, 0)));
        assert_eq!(*lc.wanted(), square(0, 0));
        assert_eq!(lc.active_count(), 9);
        assert_eq!(lc.newly_activated.len(), 9);
        assert!(w.is_chunk_loaded(ChunkCoord::new(-1, -1)));
    }

    #[test]
    fn moving_shifts_wanted_set_and_schedules_unload() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);

        assert_eq!(*lc.wanted(), square(1, 0));
        // The new column activates at once.
        assert_eq!(lc.newly_activated.len(), 3);
        assert!(lc.is_active(ChunkCoord::new(2, 0)));
        // The old column is scheduled, not unloaded.
        for y in -1..=1 {
            let c = ChunkCoord::new(-1, y);
            assert!(lc.is_active(c));
            assert!(lc.is_pending_unload(c));
            assert_eq!(lc.unload_remaining(c), Some(Duration::from_millis(1_000)));
        }
        assert!(lc.newly_deactivated.is_empty());
        assert!(spawner.destroyed().is_empty());
    }

    #[test]
    fn returning_before_delay_cancels_unload() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);

        for y in -1..=1 {
            assert!(!lc.is_pending_unload(ChunkCoord::new(-1, y)));
            assert!(lc.is_active(ChunkCoord::new(-1, y)));
        }
        // Column 2 is now the one waiting.
        assert!(lc.is_pending_unload(ChunkCoord::new(2, 0)));
        assert!(spawner.destroyed().is_empty());
    }

    #[test]
    fn unload_happens_after_delay() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
        for _ in 0..3 {
            lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
            assert!(lc.newly_deactivated.is_empty());
        }
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);

        assert_eq!(lc.newly_deactivated.len(), 3);
        assert_eq!(lc.active_count(), 9);
        assert!(!lc.is_active(ChunkCoord::new(-1, 0)));
        assert!(!w.is_chunk_loaded(ChunkCoord::new(-1, 0)));
        assert_eq!(spawner.destroyed().len(), 3);
    }

    #[test]
    fn polling_respects_interval() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(Duration::ZERO, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(Duration::from_millis(100), in_chunk(2, 2), &mut w, &catalog, &mut spawner);
        assert_eq!(lc.current_chunk(), Some(ChunkCoord::new(0, 0)));

        lc.update(Duration::from_millis(150), in_chunk(2, 2), &mut w, &catalog, &mut spawner);
        assert_eq!(lc.current_chunk(), Some(ChunkCoord::new(2, 2)));
    }

    #[test]
    fn only_existing_chunks_are_wanted() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(3, 3), &mut w, &catalog, &mut spawner);
        assert_eq!(lc.wanted().len(), 4);
    }

    #[test]
    fn spawns_visuals_from_tile_state() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        let soil = TilePos::new(1, 1);
        let crop = TilePos::new(2, 1);
        let fence = TilePos::new(3, 1);
        w.till_tile(soil).unwrap();
        w.till_tile(crop).unwrap();
        w.plant_crop(crop, &PlantId::from("turnip")).unwrap();
        w.place_structure(fence, &StructureId::from("fence"), 0).unwrap();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);

        let spawned = spawner.spawned();
        assert!(spawned.contains(&(soil, VisualKind::Soil, SOIL_SPRITE.to_string())));
        assert!(spawned.contains(&(crop, VisualKind::Crop, "turnip_0".to_string())));
        assert!(spawned.contains(&(fence, VisualKind::Structure, "fence_post".to_string())));
    }

    #[test]
    fn reload_all_respawns_every_active_chunk() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        let pos = TilePos::new(2, 2);
        w.till_tile(pos).unwrap();
        w.plant_crop(pos, &PlantId::from("turnip")).unwrap();
        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);

        w.update_crop_stage(pos, 1).unwrap();
        spawner.clear();
        lc.reload_all(&w, &catalog, &mut spawner);

        assert_eq!(spawner.destroyed().len(), 9);
        let calls = spawner.calls();
        let first_spawn = calls
            .iter()
            .position(|c| matches!(c, SpawnerCall::Spawn { .. }))
            .unwrap();
        assert_eq!(first_spawn, 9, "all destroys happen before respawning");
        assert!(spawner
            .spawned()
            .contains(&(pos, VisualKind::Crop, "turnip_1".to_string())));
    }

    #[test]
    fn refresh_only_touches_active_chunks() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        spawner.clear();
        assert!(lc.refresh_chunk(ChunkCoord::new(0, 0), &w, &catalog, &mut spawner));
        assert!(!lc.refresh_chunk(ChunkCoord::new(3, 3), &w, &catalog, &mut spawner));
        assert_eq!(spawner.destroyed(), vec![ChunkCoord::new(0, 0)]);
    }

    #[test]
    fn shutdown_destroys_everything() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = controller();

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
        spawner.clear();

        let unloaded = lc.shutdown(&mut w, &mut spawner);
        assert_eq!(unloaded.len(), 12);
        assert_eq!(lc.active_count(), 0);
        assert!(!lc.is_pending_unload(ChunkCoord::new(-1, 0)));
        assert_eq!(spawner.destroyed().len(), 12);
        assert!(!w.is_chunk_loaded(ChunkCoord::new(0, 0)));
    }

    #[test]
    fn zero_delay_unloads_immediately() {
        let mut w = world();
        let catalog = test_catalog();
        let mut spawner = RecordingSpawner::default();
        let mut lc = LoadingController::new(LoadingConfig {
            load_radius: 0,
            unload_delay_ms: 0,
            poll_interval_ms: 250,
        });

        lc.update(TICK, in_chunk(0, 0), &mut w, &catalog, &mut spawner);
        lc.update(TICK, in_chunk(1, 0), &mut w, &catalog, &mut spawner);
        assert_eq!(lc.newly_deactivated, vec![ChunkCoord::new(0, 0)]);
        assert_eq!(lc.active_count(), 1);
    }
}
