//! Furrow Core -- persistent per-tile world state for peer-hosted farming worlds.
//!
//! This crate owns the spatial data model that every Furrow peer keeps in
//! memory: tilled ground, planted crops, and placed structures, stored per
//! chunk and grouped into sections. It also provides the binary wire format
//! used for replication and saves, the proximity-driven loading controller,
//! and the day-driven growth scheduler.
//!
//! # World Layout
//!
//! The world is a 2D integer grid of tiles. Tiles are grouped into square
//! chunks of `chunk_size` tiles per side, and chunks are grouped into
//! rectangular sections. Every chunk of every active section is created
//! eagerly when the [`world::WorldStore`] is built and lives for the lifetime
//! of the store; only visuals come and go.
//!
//! # Mutation Pattern
//!
//! All tile mutations go through the [`world::WorldStore`] facades, which
//! resolve a world position to its chunk and return a `Result`:
//!
//! ```rust,ignore
//! let pos = TilePos::new(4, 7);
//! world.till_tile(pos)?;
//! world.plant_crop(pos, &PlantId::from("turnip"))?;
//! ```
//!
//! Replication and visual refresh are layered on top of these facades by
//! `furrow-net`; the store itself never talks to the network.
//!
//! # Key Types
//!
//! - [`coord::TilePos`], [`coord::ChunkCoord`], [`coord::TileKey`] -- coordinate mapping.
//! - [`tile::TileSlot`] -- per-position tilled/crop/structure record.
//! - [`chunk::Chunk`] -- the tile store for one chunk.
//! - [`codec`] -- chunk wire format shared by replication and snapshots.
//! - [`world::WorldStore`] -- all chunks across all sections.
//! - [`loading::LoadingController`] -- chunk activation with unload hysteresis.
//! - [`growth::GrowthScheduler`] -- authority-only crop growth on day change.
//! - [`event::EventBus`] -- typed observer registration for world events.

pub mod catalog;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod coord;
pub mod dirty;
pub mod event;
pub mod growth;
pub mod id;
pub mod loading;
pub mod sim;
pub mod snapshot;
pub mod tile;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
