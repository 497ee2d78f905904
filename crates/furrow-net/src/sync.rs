//! Full-state catch-up for late joiners.
//!
//! # Follower side
//!
//! [`FollowerSync`] walks `NotSynced -> RequestingSync -> ReceivingBatches ->
//! Synced`. The request is sent at most once per session; a request made
//! before the authority is known is retried on a fixed delay a bounded
//! number of times. Each received batch overwrites the named chunks
//! wholesale, so the latest full sync always wins.
//!
//! # Authority side
//!
//! [`AuthoritySync`] serves one transfer at a time behind an atomic
//! single-flight guard. A transfer lists the non-empty chunks when it
//! starts, then sends one batch per `batch_delay` from
//! [`AuthoritySync::update`], followed by a completion message. Each batch
//! is encoded from the live world just before it is sent, so it already
//! holds every mutation broadcast ahead of it and none broadcast after. Peers that
//! ask while a transfer is running are queued once each and served in
//! arrival order, which also collapses the join-push and the peer's own
//! request into a single transfer.

use crate::authority::AuthorityProvider;
use crate::message::FarmMessage;
use crate::transport::{MessageBus, send_message};
use furrow_core::codec::{decode_chunk, encode_chunk};
use furrow_core::config::SyncConfig;
use furrow_core::coord::ChunkCoord;
use furrow_core::id::PeerId;
use furrow_core::world::WorldStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("a full sync to {0} is already in flight")]
    TransferInFlight(PeerId),
    #[error("no authority is known yet")]
    NoAuthority,
    #[error("the local peer is not authority")]
    NotAuthority,
    #[error("{0} batches exceed the u16 batch index")]
    TooManyBatches(usize),
}

// ---------------------------------------------------------------------------
// Snapshot and replay
// ---------------------------------------------------------------------------

/// Non-empty chunks at the start of a transfer, split into batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub batches: Vec<Vec<ChunkCoord>>,
    pub chunk_count: u32,
}

/// List every chunk holding at least one slot, in batches of `batch_size`.
pub fn plan_full_sync(world: &WorldStore, batch_size: usize) -> SyncPlan {
    let coords: Vec<ChunkCoord> = world
        .non_empty_chunks()
        .into_iter()
        .map(|chunk| chunk.coord())
        .collect();
    let chunk_count = coords.len() as u32;
    let batches = coords
        .chunks(batch_size.max(1))
        .map(<[ChunkCoord]>::to_vec)
        .collect();
    SyncPlan {
        batches,
        chunk_count,
    }
}

/// Encode the current contents of a batch's chunks. A chunk emptied since
/// it was planned still goes out, so the receiver clears its copy. Chunks
/// that are missing or fail to encode are logged and left out.
pub fn encode_sync_batch(world: &WorldStore, coords: &[ChunkCoord]) -> Vec<Vec<u8>> {
    let mut encoded = Vec::with_capacity(coords.len());
    for &coord in coords {
        let Some(chunk) = world.chunk(coord) else {
            warn!(chunk = %coord, "planned chunk vanished, left out of full sync");
            continue;
        };
        match encode_chunk(chunk) {
            Ok(bytes) => encoded.push(bytes),
            Err(e) => warn!(chunk = %coord, error = %e, "chunk left out of full sync"),
        }
    }
    encoded
}

/// What replaying one batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub chunks_applied: usize,
    pub slots_applied: usize,
    /// Chunks this world does not have.
    pub chunks_skipped: usize,
    /// Chunks whose payload failed to decode.
    pub chunks_rejected: usize,
}

/// Overwrite every chunk named in a batch with the batch's contents.
///
/// Malformed payloads and chunks missing locally are logged and skipped;
/// the rest of the batch is still applied.
pub fn replay_sync_batch(world: &mut WorldStore, chunks: &[Vec<u8>]) -> ReplayReport {
    let mut report = ReplayReport::default();
    for data in chunks {
        let payload = match decode_chunk(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(bytes = data.len(), error = %e, "rejected malformed chunk in sync batch");
                report.chunks_rejected += 1;
                continue;
            }
        };
        if world.clear_chunk(payload.coord).is_err() {
            warn!(chunk = %payload.coord, section = %payload.section, "sync names a chunk this world lacks, skipping");
            report.chunks_skipped += 1;
            continue;
        }
        for slot in payload.slots {
            let pos = slot.pos();
            match world.restore_slot(payload.coord, slot) {
                Ok(()) => report.slots_applied += 1,
                Err(e) => warn!(chunk = %payload.coord, %pos, error = %e, "sync slot rejected"),
            }
        }
        report.chunks_applied += 1;
    }
    report
}

// ---------------------------------------------------------------------------
// Follower
// ---------------------------------------------------------------------------

/// Follower-side full-sync progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotSynced,
    RequestingSync,
    ReceivingBatches,
    Synced,
}

#[derive(Debug, Clone)]
pub struct FollowerSync {
    config: SyncConfig,
    state: SyncState,
    /// Set once the request went out; never cleared within a session.
    requested: bool,
    retry_in: Option<Duration>,
    attempts: u32,
    batches_received: u32,
    chunks_received: u32,
}

impl FollowerSync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: SyncState::NotSynced,
            requested: false,
            retry_in: None,
            attempts: 0,
            batches_received: 0,
            chunks_received: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    pub fn has_requested(&self) -> bool {
        self.requested
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_in.is_some()
    }

    /// Failed request attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Ask the authority for a full sync.
    ///
    /// Returns `Ok(true)` when a request was sent and `Ok(false)` when none
    /// was needed: one was already sent this session, or the local peer is
    /// the authority and is therefore synced by definition. With no known
    /// authority a retry is scheduled and [`SyncError::NoAuthority`]
    /// returned.
    pub fn request(
        &mut self,
        authority: &dyn AuthorityProvider,
        bus: &mut dyn MessageBus,
    ) -> Result<bool, SyncError> {
        if authority.is_local_peer_authority() {
            self.state = SyncState::Synced;
            self.retry_in = None;
            return Ok(false);
        }
        if self.requested {
            debug!("full sync already requested this session");
            return Ok(false);
        }
        let Some(target) = authority.authority_peer() else {
            self.schedule_retry();
            return Err(SyncError::NoAuthority);
        };

        send_message(bus, target, &FarmMessage::SyncRequest);
        self.requested = true;
        self.retry_in = None;
        if self.state == SyncState::NotSynced {
            self.state = SyncState::RequestingSync;
        }
        info!(authority = %target, "requested full sync");
        Ok(true)
    }

    fn schedule_retry(&mut self) {
        if self.attempts >= self.config.max_request_retries {
            warn!(attempts = self.attempts, "giving up on full sync request");
            self.retry_in = None;
            return;
        }
        self.attempts += 1;
        self.retry_in = Some(self.config.request_retry_delay());
        debug!(
            attempt = self.attempts,
            delay_ms = self.config.request_retry_delay_ms,
            "authority unknown, retrying sync request later"
        );
    }

    /// Count down a pending retry and re-issue the request when it is due.
    pub fn update(
        &mut self,
        dt: Duration,
        authority: &dyn AuthorityProvider,
        bus: &mut dyn MessageBus,
    ) {
        let Some(remaining) = self.retry_in.as_mut() else {
            return;
        };
        *remaining = remaining.saturating_sub(dt);
        if !remaining.is_zero() {
            return;
        }
        self.retry_in = None;
        if let Err(e) = self.request(authority, bus) {
            debug!(attempt = self.attempts, error = %e, "sync request retry failed");
        }
    }

    /// Apply one received batch.
    pub fn on_batch(
        &mut self,
        batch_index: u16,
        total_batches: u16,
        chunks: &[Vec<u8>],
        world: &mut WorldStore,
    ) -> ReplayReport {
        self.state = SyncState::ReceivingBatches;
        self.batches_received += 1;
        self.chunks_received += chunks.len() as u32;
        let report = replay_sync_batch(world, chunks);
        debug!(
            batch = batch_index as u32 + 1,
            total = total_batches,
            applied = report.chunks_applied,
            skipped = report.chunks_skipped,
            rejected = report.chunks_rejected,
            "sync batch received"
        );
        report
    }

    /// Finish a transfer. Returns whether the chunk count matches what
    /// arrived.
    pub fn on_complete(&mut self, chunk_count: u32) -> bool {
        let matches = chunk_count == self.chunks_received;
        if !matches {
            warn!(
                expected = chunk_count,
                received = self.chunks_received,
                "full sync chunk count mismatch"
            );
        }
        info!(
            chunks = chunk_count,
            batches = self.batches_received,
            "full sync complete"
        );
        self.state = SyncState::Synced;
        self.retry_in = None;
        self.batches_received = 0;
        self.chunks_received = 0;
        matches
    }

    /// Forget all progress, as at the start of a new session.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

// ---------------------------------------------------------------------------
// Authority
// ---------------------------------------------------------------------------

/// How a full-sync request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequestOutcome {
    Started,
    Queued,
    /// The peer is already being served or waiting in the queue.
    AlreadyPending,
    Failed,
}

/// A finished outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFinished {
    pub target: PeerId,
    pub batches: u16,
    pub chunk_count: u32,
}

/// Per-transfer iteration state. Owned by exactly one transfer.
#[derive(Debug)]
struct BatchTransfer {
    target: PeerId,
    batches: VecDeque<Vec<ChunkCoord>>,
    next_index: u16,
    total_batches: u16,
    /// Chunks actually sent so far.
    chunks_sent: u32,
    wait: Duration,
}

#[derive(Debug)]
pub struct AuthoritySync {
    config: SyncConfig,
    in_flight: AtomicBool,
    transfer: Option<BatchTransfer>,
    queue: VecDeque<PeerId>,
    completed: u64,
}

impl AuthoritySync {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            in_flight: AtomicBool::new(false),
            transfer: None,
            queue: VecDeque::new(),
            completed: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn current_target(&self) -> Option<PeerId> {
        self.transfer.as_ref().map(|t| t.target)
    }

    /// Peers waiting for a transfer, in service order.
    pub fn queued(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.queue.iter().copied()
    }

    pub fn completed_transfers(&self) -> u64 {
        self.completed
    }

    /// Start a transfer to `target`, listing the chunks to send now.
    pub fn begin(&mut self, target: PeerId, world: &WorldStore) -> Result<(), SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let current = self.current_target().unwrap_or(target);
            return Err(SyncError::TransferInFlight(current));
        }

        let plan = plan_full_sync(world, self.config.batch_size);
        let Ok(total_batches) = u16::try_from(plan.batches.len()) else {
            self.in_flight.store(false, Ordering::Release);
            return Err(SyncError::TooManyBatches(plan.batches.len()));
        };
        info!(
            peer = %target,
            chunks = plan.chunk_count,
            batches = total_batches,
            "starting full sync"
        );
        self.transfer = Some(BatchTransfer {
            target,
            batches: plan.batches.into(),
            next_index: 0,
            total_batches,
            chunks_sent: 0,
            wait: Duration::ZERO,
        });
        Ok(())
    }

    /// Serve `target` now if idle, otherwise queue it once.
    pub fn request_sync(&mut self, target: PeerId, world: &WorldStore) -> SyncRequestOutcome {
        if self.current_target() == Some(target) || self.queue.contains(&target) {
            debug!(peer = %target, "full sync already pending for peer");
            return SyncRequestOutcome::AlreadyPending;
        }
        match self.begin(target, world) {
            Ok(()) => SyncRequestOutcome::Started,
            Err(SyncError::TransferInFlight(current)) => {
                self.queue.push_back(target);
                debug!(
                    peer = %target,
                    serving = %current,
                    queued = self.queue.len(),
                    "full sync queued"
                );
                SyncRequestOutcome::Queued
            }
            Err(e) => {
                warn!(peer = %target, error = %e, "could not start full sync");
                SyncRequestOutcome::Failed
            }
        }
    }

    /// Drop a departed peer from the queue. An in-flight transfer to it runs
    /// to completion.
    pub fn forget_peer(&mut self, peer: PeerId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|p| *p != peer);
        before != self.queue.len()
    }

    /// Send the next batch when its delay has elapsed. After the last batch
    /// the completion message goes out, the guard is released, and the next
    /// queued peer (if any) is started.
    pub fn update(
        &mut self,
        dt: Duration,
        world: &WorldStore,
        bus: &mut dyn MessageBus,
    ) -> Option<TransferFinished> {
        let transfer = self.transfer.as_mut()?;
        transfer.wait = transfer.wait.saturating_sub(dt);
        if !transfer.wait.is_zero() {
            return None;
        }

        if let Some(coords) = transfer.batches.pop_front() {
            let chunks = encode_sync_batch(world, &coords);
            let count = chunks.len();
            transfer.chunks_sent += count as u32;
            send_message(
                bus,
                transfer.target,
                &FarmMessage::SyncBatch {
                    batch_index: transfer.next_index,
                    total_batches: transfer.total_batches,
                    chunks,
                },
            );
            debug!(
                peer = %transfer.target,
                batch = transfer.next_index as u32 + 1,
                total = transfer.total_batches,
                chunks = count,
                "sync batch sent"
            );
            transfer.next_index += 1;
            transfer.wait = self.config.batch_delay();
            if !transfer.batches.is_empty() {
                return None;
            }
        }

        let finished = TransferFinished {
            target: transfer.target,
            batches: transfer.total_batches,
            chunk_count: transfer.chunks_sent,
        };
        send_message(
            bus,
            finished.target,
            &FarmMessage::SyncComplete {
                chunk_count: finished.chunk_count,
            },
        );
        self.transfer = None;
        self.in_flight.store(false, Ordering::Release);
        self.completed += 1;
        info!(
            peer = %finished.target,
            chunks = finished.chunk_count,
            batches = finished.batches,
            "full sync finished"
        );

        while let Some(next) = self.queue.pop_front() {
            match self.begin(next, world) {
                Ok(()) => break,
                Err(e) => warn!(peer = %next, error = %e, "could not start queued full sync"),
            }
        }
        Some(finished)
    }

    /// Abandon the current transfer and the queue.
    pub fn cancel_all(&mut self) {
        if let Some(t) = self.transfer.take() {
            debug!(peer = %t.target, "full sync abandoned");
        }
        self.queue.clear();
        self.in_flight.store(false, Ordering::Release);
    }
}
