//! Day-driven crop growth.
//!
//! Growth runs on the authority only. Each new day every crop in the world
//! ages by one day, whether or not its chunk is loaded, and advances one
//! stage once its age reaches the cumulative threshold from the catalog.
//! The returned [`GrowthReport`] lists each advance so the caller can
//! broadcast it; followers never run the pass and apply those broadcasts
//! instead.

use crate::catalog::Catalog;
use crate::coord::TilePos;
use crate::id::PlantId;
use crate::world::WorldStore;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// A crop that moved to a new stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAdvance {
    pub pos: TilePos,
    pub plant_id: PlantId,
    pub stage: u8,
    pub total_age: u32,
}

/// Outcome of one growth pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrowthReport {
    pub day: u32,
    pub crops_aged: usize,
    pub advances: Vec<StageAdvance>,
    /// Crops skipped because their plant is not in the catalog.
    pub unknown_plants: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GrowthScheduler {
    last_day: Option<u32>,
}

impl GrowthScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last day a pass ran for (or was skipped for as a follower).
    pub fn last_day(&self) -> Option<u32> {
        self.last_day
    }

    /// Run the growth pass for `day`. Returns `None` on followers and when
    /// `day` is not later than the last day seen.
    pub fn on_day_changed(
        &mut self,
        day: u32,
        is_authority: bool,
        world: &mut WorldStore,
        catalog: &Catalog,
    ) -> Option<GrowthReport> {
        if self.last_day.is_some_and(|last| day <= last) {
            debug!(day, last = ?self.last_day, "day already processed, skipping growth");
            return None;
        }
        self.last_day = Some(day);
        if !is_authority {
            return None;
        }

        let mut report = GrowthReport {
            day,
            ..GrowthReport::default()
        };
        let mut missing: BTreeSet<PlantId> = BTreeSet::new();

        for pos in world.crop_positions() {
            let crop = match world.increment_crop_age(pos) {
                Ok(crop) => crop,
                Err(e) => {
                    warn!(%pos, error = %e, "crop vanished during growth pass");
                    continue;
                }
            };
            report.crops_aged += 1;

            let Some(def) = catalog.plant(&crop.plant_id) else {
                report.unknown_plants += 1;
                missing.insert(crop.plant_id);
                continue;
            };
            let Some(threshold) = def.next_stage_age(crop.stage) else {
                continue;
            };
            if crop.total_age < threshold {
                continue;
            }

            let next = crop.stage + 1;
            match world.update_crop_stage(pos, next) {
                Ok(updated) => report.advances.push(StageAdvance {
                    pos,
                    plant_id: updated.plant_id,
                    stage: updated.stage,
                    total_age: updated.total_age,
                }),
                Err(e) => warn!(%pos, error = %e, "failed to advance crop stage"),
            }
        }

        for plant in &missing {
            warn!(%plant, "plant missing from catalog, crops will not grow");
        }
        info!(
            day,
            aged = report.crops_aged,
            advanced = report.advances.len(),
            "growth pass complete"
        );
        Some(report)
    }
}
