//! One peer's view of a shared farming world.
//!
//! [`PeerSession`] owns the world store and every per-peer controller and
//! is driven by the host application:
//!
//! 1. [`start`](PeerSession::start) once the transport is up,
//! 2. [`handle_message`](PeerSession::handle_message) for each received message,
//! 3. [`update`](PeerSession::update) once per frame,
//! 4. [`on_day_changed`](PeerSession::on_day_changed) on each day boundary,
//! 5. [`shutdown`](PeerSession::shutdown) when leaving.
//!
//! Session events are buffered on the [`EventBus`] and delivered at the end
//! of every `update`.

use crate::authority::AuthorityProvider;
use crate::message::FarmMessage;
use crate::replicate::{DeltaOutcome, TileMutation, apply_delta, apply_local};
use crate::sync::{AuthoritySync, FollowerSync, SyncError, SyncRequestOutcome, SyncState};
use crate::transport::{MessageBus, broadcast_message};
use furrow_core::catalog::Catalog;
use furrow_core::chunk::TileError;
use furrow_core::config::{ConfigError, WorldConfig};
use furrow_core::coord::TilePos;
use furrow_core::event::{EventBus, WorldEvent};
use furrow_core::growth::{GrowthReport, GrowthScheduler};
use furrow_core::id::PeerId;
use furrow_core::loading::{LoadingController, VisualSpawner};
use furrow_core::snapshot::{RestoreSummary, SnapshotError, WorldSnapshot};
use furrow_core::world::WorldStore;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

pub struct PeerSession<A: AuthorityProvider> {
    local: PeerId,
    authority: A,
    world: WorldStore,
    catalog: Catalog,
    loading: LoadingController,
    growth: GrowthScheduler,
    follower: FollowerSync,
    host: AuthoritySync,
    events: EventBus,
    peers: BTreeSet<PeerId>,
    day: u32,
}

impl<A: AuthorityProvider> PeerSession<A> {
    /// Build the world store (every chunk of every active section) and the
    /// controllers around it.
    pub fn new(
        local: PeerId,
        authority: A,
        config: &WorldConfig,
        catalog: Catalog,
    ) -> Result<Self, ConfigError> {
        let world = WorldStore::new(config)?;
        info!(peer = %local, chunks = world.chunk_count(), "peer session created");
        Ok(Self {
            local,
            authority,
            world,
            catalog,
            loading: LoadingController::new(config.loading.clone()),
            growth: GrowthScheduler::new(),
            follower: FollowerSync::new(config.sync.clone()),
            host: AuthoritySync::new(config.sync.clone()),
            events: EventBus::default(),
            peers: BTreeSet::new(),
            day: 0,
        })
    }

    // -- Accessors --

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Change authority state through the provider, then call
    /// [`on_authority_changed`](Self::on_authority_changed).
    pub fn authority_mut(&mut self) -> &mut A {
        &mut self.authority
    }

    pub fn is_authority(&self) -> bool {
        self.authority.is_local_peer_authority()
    }

    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn loading(&self) -> &LoadingController {
        &self.loading
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn sync_state(&self) -> SyncState {
        self.follower.state()
    }

    pub fn authority_sync(&self) -> &AuthoritySync {
        &self.host
    }

    pub fn peers(&self) -> &BTreeSet<PeerId> {
        &self.peers
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    // -- Lifecycle --

    /// Begin the session: the authority is synced by definition, a follower
    /// asks the authority for a full sync.
    pub fn start(&mut self, bus: &mut dyn MessageBus) {
        match self.follower.request(&self.authority, bus) {
            Ok(_) => {}
            Err(SyncError::NoAuthority) => debug!("authority not known at start, will retry"),
            Err(e) => warn!(error = %e, "full sync request failed"),
        }
        info!(peer = %self.local, authority = self.is_authority(), "peer session started");
    }

    /// Destroy all visuals and drop pending sync work and events.
    pub fn shutdown(&mut self, spawner: &mut dyn VisualSpawner) {
        let unloaded = self.loading.shutdown(&mut self.world, spawner);
        self.host.cancel_all();
        self.follower.reset();
        self.events.clear();
        self.peers.clear();
        info!(peer = %self.local, chunks = unloaded.len(), "peer session shut down");
    }

    // -- Membership and authority --

    /// A peer joined. The authority pushes it a full sync right away; the
    /// joiner's own request will find it already pending.
    pub fn on_peer_joined(&mut self, peer: PeerId) {
        if peer == self.local || !self.peers.insert(peer) {
            return;
        }
        self.events.emit(WorldEvent::PeerJoined { peer });
        if self.is_authority() {
            let outcome = self.host.request_sync(peer, &self.world);
            debug!(%peer, ?outcome, "full sync pushed to joining peer");
        }
    }

    pub fn on_peer_left(&mut self, peer: PeerId) {
        if !self.peers.remove(&peer) {
            return;
        }
        self.host.forget_peer(peer);
        self.events.emit(WorldEvent::PeerLeft { peer });
    }

    /// Re-read the provider after authority moved.
    pub fn on_authority_changed(&mut self, bus: &mut dyn MessageBus) {
        let authority = self.authority.authority_peer();
        self.events.emit(WorldEvent::AuthorityChanged { authority });
        if !self.is_authority() {
            self.host.cancel_all();
        }
        if let Err(e) = self.follower.request(&self.authority, bus) {
            debug!(error = %e, "full sync request after authority change failed");
        }
        info!(authority = ?authority, local = self.is_authority(), "authority changed");
    }

    /// Serve a full sync to `peer` from the authority.
    pub fn push_full_sync(&mut self, peer: PeerId) -> Result<SyncRequestOutcome, SyncError> {
        if !self.is_authority() {
            return Err(SyncError::NotAuthority);
        }
        Ok(self.host.request_sync(peer, &self.world))
    }

    // -- Mutation and messages --

    /// Apply a local tile mutation and broadcast it to the other peers.
    pub fn mutate(
        &mut self,
        mutation: &TileMutation,
        bus: &mut dyn MessageBus,
    ) -> Result<FarmMessage, TileError> {
        let delta = apply_local(&mut self.world, &self.catalog, mutation)?;
        broadcast_message(bus, &delta);
        trace!(pos = %mutation.pos(), opcode = ?delta.opcode(), "mutation broadcast");
        Ok(delta)
    }

    /// Process one received message. Malformed or inapplicable messages are
    /// logged and dropped.
    pub fn handle_message(&mut self, from: PeerId, payload: &[u8]) {
        if from == self.local {
            return;
        }
        let message = match FarmMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %from, bytes = payload.len(), error = %e, "rejected malformed message");
                return;
            }
        };

        match message {
            FarmMessage::SyncRequest => {
                if self.is_authority() {
                    let outcome = self.host.request_sync(from, &self.world);
                    debug!(peer = %from, ?outcome, "full sync requested");
                } else {
                    debug!(peer = %from, "ignoring sync request, not authority");
                }
            }
            FarmMessage::SyncBatch {
                batch_index,
                total_batches,
                chunks,
            } => {
                if !self.from_authority(from) {
                    warn!(peer = %from, "ignoring sync batch from non-authority");
                    return;
                }
                self.follower
                    .on_batch(batch_index, total_batches, &chunks, &mut self.world);
            }
            FarmMessage::SyncComplete { chunk_count } => {
                if !self.from_authority(from) {
                    warn!(peer = %from, "ignoring sync completion from non-authority");
                    return;
                }
                self.follower.on_complete(chunk_count);
                self.events.emit(WorldEvent::SyncCompleted { chunk_count });
            }
            delta => match apply_delta(&mut self.world, &delta) {
                Ok(DeltaOutcome::Applied(pos)) => {
                    trace!(peer = %from, %pos, opcode = ?delta.opcode(), "delta applied")
                }
                Ok(DeltaOutcome::AlreadyApplied(pos)) => {
                    debug!(peer = %from, %pos, opcode = ?delta.opcode(), "duplicate delta ignored")
                }
                Ok(DeltaOutcome::NotADelta) => {}
                Err(e) => {
                    warn!(peer = %from, opcode = ?delta.opcode(), error = %e, "delta rejected")
                }
            },
        }
    }

    fn from_authority(&self, peer: PeerId) -> bool {
        self.authority.authority_peer() == Some(peer)
    }

    // -- Per-frame work --

    /// Advance sync retries and transfers, poll chunk loading, refresh the
    /// visuals of changed active chunks, then deliver buffered events.
    pub fn update(
        &mut self,
        dt: Duration,
        local_pos: TilePos,
        bus: &mut dyn MessageBus,
        spawner: &mut dyn VisualSpawner,
    ) {
        self.follower.update(dt, &self.authority, bus);
        if self.is_authority() {
            if let Some(finished) = self.host.update(dt, &self.world, bus) {
                debug!(peer = %finished.target, chunks = finished.chunk_count, "outbound sync done");
            }
        }

        self.loading
            .update(dt, local_pos, &mut self.world, &self.catalog, spawner);
        for &chunk in &self.loading.newly_activated {
            self.events.emit(WorldEvent::ChunkActivated { chunk });
        }
        for &chunk in &self.loading.newly_deactivated {
            self.events.emit(WorldEvent::ChunkDeactivated { chunk });
        }

        for coord in self.world.take_dirty_chunks() {
            if self.loading.newly_activated.contains(&coord) {
                continue;
            }
            self.loading
                .refresh_chunk(coord, &self.world, &self.catalog, spawner);
        }

        self.events.deliver();
    }

    /// Day boundary: the authority runs growth and broadcasts each stage
    /// advance, then every peer reloads its active chunks.
    pub fn on_day_changed(
        &mut self,
        day: u32,
        bus: &mut dyn MessageBus,
        spawner: &mut dyn VisualSpawner,
    ) -> Option<GrowthReport> {
        self.day = day;
        self.events.emit(WorldEvent::DayChanged { day });

        let is_authority = self.is_authority();
        let report = self
            .growth
            .on_day_changed(day, is_authority, &mut self.world, &self.catalog);
        if let Some(report) = &report {
            for advance in &report.advances {
                broadcast_message(
                    bus,
                    &FarmMessage::CropStageUpdated {
                        pos: advance.pos,
                        stage: advance.stage,
                        total_age: advance.total_age,
                    },
                );
            }
        }

        self.loading.reload_all(&self.world, &self.catalog, spawner);
        self.world.take_dirty_chunks();
        report
    }

    // -- Saves --

    pub fn capture_snapshot(&self) -> Result<WorldSnapshot, SnapshotError> {
        WorldSnapshot::capture(&self.world, self.day)
    }

    /// Replace the world with a saved one and resync visuals.
    pub fn restore_snapshot(
        &mut self,
        snapshot: &WorldSnapshot,
        spawner: &mut dyn VisualSpawner,
    ) -> Result<RestoreSummary, SnapshotError> {
        let summary = snapshot.restore(&mut self.world)?;
        self.day = snapshot.header.day;
        self.loading.reload_all(&self.world, &self.catalog, spawner);
        self.world.take_dirty_chunks();
        Ok(summary)
    }
}
