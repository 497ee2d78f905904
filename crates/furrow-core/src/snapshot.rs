//! Whole-world snapshots for an external save collaborator.
//!
//! A snapshot is a `bitcode` envelope around a versioned header and the
//! non-empty chunks of the world, each in the chunk wire format from
//! [`crate::codec`]. Restoring replaces the whole world's tile state.

use crate::chunk::TileError;
use crate::codec::{CodecError, decode_chunk, encode_chunk};
use crate::world::WorldStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Furrow world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xF0A2_0001;

/// Current format version. Increment when breaking the layout.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("snapshot chunk size {found} does not match world chunk size {expected}")]
    ChunkSizeMismatch { expected: u32, found: u32 },
    #[error("chunk payload: {0}")]
    Codec(#[from] CodecError),
    #[error("tile restore: {0}")]
    Tile(#[from] TileError),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// In-game day the snapshot was taken on.
    pub day: u32,
    pub chunk_size: u32,
    /// [`WorldStore::state_hash`] at capture time.
    pub state_hash: u64,
}

impl SnapshotHeader {
    pub fn new(day: u32, chunk_size: u32, state_hash: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            day,
            chunk_size,
            state_hash,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    /// Encoded non-empty chunks.
    pub chunks: Vec<Vec<u8>>,
}

/// What a restore did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub chunks_restored: usize,
    pub slots_restored: usize,
    /// Chunks in the snapshot that this world does not have.
    pub chunks_skipped: usize,
    /// Whether the restored world hashes to the captured value.
    pub hash_matches: bool,
}

impl WorldSnapshot {
    /// Capture every non-empty chunk of `world`.
    pub fn capture(world: &WorldStore, day: u32) -> Result<Self, SnapshotError> {
        let chunks = world
            .non_empty_chunks()
            .into_iter()
            .map(encode_chunk)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            header: SnapshotHeader::new(day, world.chunk_size(), world.state_hash()),
            chunks,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        bitcode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode and validate the header. Chunk payloads are checked on
    /// [`restore`](Self::restore).
    pub fn deserialize(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: WorldSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Ok(snapshot)
    }

    /// Replace the tile state of `world` with the snapshot's.
    ///
    /// Every chunk payload is decoded before the world is touched, so a
    /// corrupt snapshot leaves the world unchanged. Chunks the world does not
    /// have are skipped with a warning.
    pub fn restore(&self, world: &mut WorldStore) -> Result<RestoreSummary, SnapshotError> {
        if self.header.chunk_size != world.chunk_size() {
            return Err(SnapshotError::ChunkSizeMismatch {
                expected: world.chunk_size(),
                found: self.header.chunk_size,
            });
        }

        let payloads = self
            .chunks
            .iter()
            .map(|data| decode_chunk(data))
            .collect::<Result<Vec<_>, _>>()?;

        world.clear_all();
        let mut summary = RestoreSummary::default();
        for payload in payloads {
            if !world.contains_chunk(payload.coord) {
                warn!(chunk = %payload.coord, "snapshot chunk not in this world, skipping");
                summary.chunks_skipped += 1;
                continue;
            }
            for slot in payload.slots {
                world.restore_slot(payload.coord, slot)?;
                summary.slots_restored += 1;
            }
            summary.chunks_restored += 1;
        }

        summary.hash_matches = world.state_hash() == self.header.state_hash;
        if !summary.hash_matches {
            warn!(
                expected = self.header.state_hash,
                actual = world.state_hash(),
                "restored world hash differs from snapshot"
            );
        }
        info!(
            day = self.header.day,
            chunks = summary.chunks_restored,
            slots = summary.slots_restored,
            "world snapshot restored"
        );
        Ok(summary)
    }
}
