use crate::coord::ChunkCoord;
use std::collections::BTreeSet;

/// Tracks which chunks have been modified since the last drain.
///
/// The world store marks a chunk on every successful mutation. Consumers
/// (visual refresh, autosave) take the set once per update with
/// [`drain`](DirtyTracker::drain) so each change is acted on once.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty_chunks: BTreeSet<ChunkCoord>,
    any_dirty: bool,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_chunk(&mut self, chunk: ChunkCoord) {
        self.dirty_chunks.insert(chunk);
        self.any_dirty = true;
    }

    /// Returns `true` if anything has been marked since the last clean.
    pub fn is_dirty(&self) -> bool {
        self.any_dirty
    }

    pub fn is_chunk_dirty(&self, chunk: ChunkCoord) -> bool {
        self.dirty_chunks.contains(&chunk)
    }

    pub fn dirty_chunks(&self) -> &BTreeSet<ChunkCoord> {
        &self.dirty_chunks
    }

    /// Take every dirty chunk, in coordinate order, and reset the tracker.
    pub fn drain(&mut self) -> Vec<ChunkCoord> {
        self.any_dirty = false;
        std::mem::take(&mut self.dirty_chunks).into_iter().collect()
    }

    pub fn mark_clean(&mut self) {
        self.dirty_chunks.clear();
        self.any_dirty = false;
    }
}
