//! Day clock and state hashing.
//!
//! Hosts that already own an in-game calendar call the session's day-change
//! hook directly. Headless hosts can drive it from a [`DayClock`] instead,
//! which turns elapsed wall time into day-boundary signals.

use crate::tile::TileSlot;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Day clock
// ---------------------------------------------------------------------------

/// Accumulates elapsed time and reports every day boundary it crosses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayClock {
    day: u32,
    day_length: Duration,
    /// Time elapsed since the start of the current day.
    accumulator: Duration,
}

impl DayClock {
    /// A clock at day `start_day`. A zero `day_length` is clamped to one
    /// millisecond.
    pub fn new(start_day: u32, day_length: Duration) -> Self {
        Self {
            day: start_day,
            day_length: day_length.max(Duration::from_millis(1)),
            accumulator: Duration::ZERO,
        }
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn day_length(&self) -> Duration {
        self.day_length
    }

    /// Fraction of the current day that has elapsed, in `[0, 1)`.
    pub fn progress(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.day_length.as_secs_f32()
    }

    /// Advance by `dt`, returning every day that began, in order.
    pub fn advance(&mut self, dt: Duration) -> Vec<u32> {
        self.accumulator += dt;
        let mut started = Vec::new();
        while self.accumulator >= self.day_length {
            self.accumulator -= self.day_length;
            self.day = self.day.saturating_add(1);
            started.push(self.day);
        }
        started
    }

    /// Jump to a day, as when a follower learns the authority's calendar.
    pub fn set_day(&mut self, day: u32) {
        self.day = day;
        self.accumulator = Duration::ZERO;
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A deterministic hash of world state for desync detection between peers.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write(&[v]);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write(&v.to_le_bytes());
    }

    /// Length-prefixed so adjacent strings cannot alias.
    pub fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write(s.as_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }

    /// Hash of a single slot and everything on it.
    pub fn of_slot(slot: &TileSlot) -> u64 {
        let mut h = Self::new();
        let pos = slot.pos();
        h.write_i32(pos.x);
        h.write_i32(pos.y);
        h.write_u8(slot.flags());
        if let Some(crop) = slot.crop() {
            h.write_str(crop.plant_id.as_str());
            h.write_u8(crop.stage);
            h.write_u32(crop.total_age);
            h.write_u8(crop.pollen_harvest_count);
            h.write_u8(crop.watered as u8);
            h.write_u8(crop.fertilized as u8);
            h.write_u8(crop.pollinated as u8);
        }
        if let Some(structure) = slot.structure() {
            h.write_str(structure.structure_id.as_str());
            h.write_u32(structure.placed_day);
        }
        h.finish()
    }

    /// Combine per-slot hashes so the result does not depend on iteration
    /// order.
    pub fn of_slots<'a>(slots: impl IntoIterator<Item = &'a TileSlot>) -> u64 {
        slots
            .into_iter()
            .fold(0u64, |acc, slot| acc.wrapping_add(Self::of_slot(slot)))
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
