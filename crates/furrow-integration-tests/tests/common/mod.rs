//! Shared harness: peers wired together through one loopback hub.

#![allow(dead_code)]

use furrow_core::catalog::Catalog;
use furrow_core::config::WorldConfig;
use furrow_core::coord::TilePos;
use furrow_core::growth::GrowthReport;
use furrow_core::id::PeerId;
use furrow_core::test_utils::RecordingSpawner;
use furrow_net::authority::ElectedAuthority;
use furrow_net::message::FarmMessage;
use furrow_net::replicate::TileMutation;
use furrow_net::session::PeerSession;
use furrow_net::transport::{Envelope, LoopbackBus, LoopbackHub};
use std::time::Duration;

pub struct Peer {
    pub session: PeerSession<ElectedAuthority>,
    pub bus: LoopbackBus,
    pub spawner: RecordingSpawner,
    /// Where this peer's player stands.
    pub pos: TilePos,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.session.local_peer()
    }

    /// Handle every queued message; returns how many there were.
    pub fn pump(&mut self) -> usize {
        let envelopes = self.bus.drain();
        let count = envelopes.len();
        for envelope in envelopes {
            self.session.handle_message(envelope.from, &envelope.payload);
        }
        count
    }

    /// Take queued messages without handling them, decoded.
    pub fn intercept(&mut self) -> Vec<(Envelope, FarmMessage)> {
        self.bus
            .drain()
            .into_iter()
            .map(|e| {
                let message = FarmMessage::decode(&e.payload).unwrap();
                (e, message)
            })
            .collect()
    }

    pub fn mutate(&mut self, mutation: TileMutation) -> FarmMessage {
        self.session.mutate(&mutation, &mut self.bus).unwrap()
    }

    pub fn new_day(&mut self, day: u32) -> Option<GrowthReport> {
        self.session
            .on_day_changed(day, &mut self.bus, &mut self.spawner)
    }

    pub fn update(&mut self, dt: Duration) {
        self.session
            .update(dt, self.pos, &mut self.bus, &mut self.spawner);
    }
}

pub fn peer(
    hub: &LoopbackHub,
    id: PeerId,
    authority: PeerId,
    config: &WorldConfig,
    catalog: &Catalog,
) -> Peer {
    Peer {
        session: PeerSession::new(
            id,
            ElectedAuthority::with_authority(id, authority),
            config,
            catalog.clone(),
        )
        .unwrap(),
        bus: hub.connect(id),
        spawner: RecordingSpawner::default(),
        pos: TilePos::new(0, 0),
    }
}

/// Deliver messages until every inbox is empty, ticking each peer with
/// `dt` between rounds so paced transfers make progress.
pub fn settle(peers: &mut [Peer], dt: Duration) {
    for _ in 0..200 {
        let mut moved = 0;
        for p in peers.iter_mut() {
            moved += p.pump();
        }
        for p in peers.iter_mut() {
            p.update(dt);
        }
        let busy = peers
            .iter()
            .any(|p| p.session.authority_sync().is_in_flight());
        if moved == 0 && !busy {
            return;
        }
    }
    panic!("peers did not settle");
}

pub fn assert_converged(peers: &[Peer]) {
    let expected = peers[0].session.world().state_hash();
    for p in &peers[1..] {
        assert_eq!(
            p.session.world().state_hash(),
            expected,
            "{} diverged from {}",
            p.id(),
            peers[0].id()
        );
    }
}
