//! Message bus abstraction and an in-process loopback implementation.
//!
//! The session only needs three send primitives; the concrete transport
//! (sockets, a game engine's RPC layer, ...) lives outside this crate.
//! Delivery is assumed reliable and FIFO per sender.

use crate::message::FarmMessage;
use furrow_core::id::PeerId;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("{0} is not known to the bus")]
    UnknownPeer(PeerId),
    #[error("{0} is disconnected")]
    Disconnected(PeerId),
}

/// Send primitives used by the replication layer.
pub trait MessageBus {
    /// The peer this bus sends on behalf of.
    fn local_peer(&self) -> PeerId;

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), SendError>;

    /// Send to every connected peer except the local one.
    fn send_to_others(&mut self, payload: &[u8]) -> Result<(), SendError>;

    /// Send to every connected peer, the local one included.
    fn send_to_all(&mut self, payload: &[u8]) -> Result<(), SendError>;
}

/// Encode and send one message to `peer`. Send failures are logged and
/// dropped; a disconnected peer simply misses the message.
pub fn send_message(bus: &mut dyn MessageBus, peer: PeerId, message: &FarmMessage) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(opcode = ?message.opcode(), error = %e, "failed to encode message");
            return;
        }
    };
    if let Err(e) = bus.send_to(peer, &payload) {
        debug!(%peer, opcode = ?message.opcode(), error = %e, "send failed, dropping");
    }
}

/// Encode and send one message to every other peer.
pub fn broadcast_message(bus: &mut dyn MessageBus, message: &FarmMessage) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(opcode = ?message.opcode(), error = %e, "failed to encode message");
            return;
        }
    };
    if let Err(e) = bus.send_to_others(&payload) {
        debug!(opcode = ?message.opcode(), error = %e, "broadcast failed, dropping");
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: PeerId,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct HubState {
    inboxes: BTreeMap<PeerId, VecDeque<Envelope>>,
    connected: BTreeMap<PeerId, bool>,
    delivered: u64,
}

impl HubState {
    fn deliver(&mut self, from: PeerId, to: PeerId, payload: &[u8]) -> Result<(), SendError> {
        match self.connected.get(&to) {
            None => return Err(SendError::UnknownPeer(to)),
            Some(false) => return Err(SendError::Disconnected(to)),
            Some(true) => {}
        }
        self.inboxes.entry(to).or_default().push_back(Envelope {
            from,
            payload: payload.to_vec(),
        });
        self.delivered += 1;
        Ok(())
    }

    fn live_peers(&self) -> Vec<PeerId> {
        self.connected
            .iter()
            .filter(|(_, live)| **live)
            .map(|(peer, _)| *peer)
            .collect()
    }
}

/// Shared in-memory switchboard connecting several [`LoopbackBus`]es in
/// one process. Used by tests and the headless demo.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` and return its bus endpoint.
    pub fn connect(&self, peer: PeerId) -> LoopbackBus {
        let mut state = self.state.borrow_mut();
        state.connected.insert(peer, true);
        state.inboxes.entry(peer).or_default();
        LoopbackBus {
            local: peer,
            hub: self.clone(),
        }
    }

    /// Mark `peer` disconnected and drop its undelivered messages.
    pub fn disconnect(&self, peer: PeerId) {
        let mut state = self.state.borrow_mut();
        if let Some(live) = state.connected.get_mut(&peer) {
            *live = false;
        }
        if let Some(inbox) = state.inboxes.get_mut(&peer) {
            inbox.clear();
        }
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.state.borrow().connected.get(&peer).copied().unwrap_or(false)
    }

    /// Messages waiting for `peer`.
    pub fn pending(&self, peer: PeerId) -> usize {
        self.state
            .borrow()
            .inboxes
            .get(&peer)
            .map_or(0, VecDeque::len)
    }

    /// Total messages delivered since creation.
    pub fn delivered(&self) -> u64 {
        self.state.borrow().delivered
    }
}

/// One peer's endpoint on a [`LoopbackHub`].
#[derive(Debug, Clone)]
pub struct LoopbackBus {
    local: PeerId,
    hub: LoopbackHub,
}

impl LoopbackBus {
    /// Take the oldest message addressed to this peer.
    pub fn receive(&mut self) -> Option<Envelope> {
        self.hub
            .state
            .borrow_mut()
            .inboxes
            .get_mut(&self.local)
            .and_then(VecDeque::pop_front)
    }

    /// Take every message addressed to this peer, oldest first.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.hub
            .state
            .borrow_mut()
            .inboxes
            .get_mut(&self.local)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

impl MessageBus for LoopbackBus {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn send_to(&mut self, peer: PeerId, payload: &[u8]) -> Result<(), SendError> {
        self.hub.state.borrow_mut().deliver(self.local, peer, payload)
    }

    fn send_to_others(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let mut state = self.hub.state.borrow_mut();
        for peer in state.live_peers() {
            if peer != self.local {
                state.deliver(self.local, peer, payload)?;
            }
        }
        Ok(())
    }

    fn send_to_all(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let mut state = self.hub.state.borrow_mut();
        for peer in state.live_peers() {
            state.deliver(self.local, peer, payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_to_reaches_only_target() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(PeerId(1));
        let mut b = hub.connect(PeerId(2));
        let mut c = hub.connect(PeerId(3));

        a.send_to(PeerId(2), b"hi").unwrap();
        assert_eq!(
            b.receive(),
            Some(Envelope {
                from: PeerId(1),
                payload: b"hi".to_vec()
            })
        );
        assert!(c.receive().is_none());
        assert!(a.receive().is_none());
    }

    #[test]
    fn others_excludes_sender_all_includes_it() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(PeerId(1));
        let mut b = hub.connect(PeerId(2));

        a.send_to_others(b"x").unwrap();
        assert_eq!(a.drain().len(), 0);
        assert_eq!(b.drain().len(), 1);

        a.send_to_all(b"y").unwrap();
        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn fifo_per_sender() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(PeerId(1));
        let mut b = hub.connect(PeerId(2));
        for i in 0..5u8 {
            a.send_to(PeerId(2), &[i]).unwrap();
        }
        let payloads: Vec<u8> = b.drain().into_iter().map(|e| e.payload[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn disconnected_and_unknown_peers() {
        let hub = LoopbackHub::new();
        let mut a = hub.connect(PeerId(1));
        let _b = hub.connect(PeerId(2));
        hub.disconnect(PeerId(2));

        assert!(!hub.is_connected(PeerId(2)));
        assert_eq!(
            a.send_to(PeerId(2), b"z"),
            Err(SendError::Disconnected(PeerId(2)))
        );
        assert_eq!(
            a.send_to(PeerId(9), b"z"),
            Err(SendError::UnknownPeer(PeerId(9)))
        );
        // Broadcasts skip disconnected peers.
        assert!(a.send_to_others(b"z").is_ok());
        assert_eq!(hub.pending(PeerId(2)), 0);
    }
}
