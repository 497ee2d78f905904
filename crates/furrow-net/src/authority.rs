//! Who is authority in a session.
//!
//! Election itself happens outside this crate; the session only asks
//! whether the local peer is authority and which peer to request a full
//! sync from.

use furrow_core::id::PeerId;
use std::collections::BTreeSet;

pub trait AuthorityProvider {
    fn is_local_peer_authority(&self) -> bool;

    /// The current authority, if one is known yet.
    fn authority_peer(&self) -> Option<PeerId>;
}

/// Authority chosen by the host application, with a lowest-peer-id
/// election helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectedAuthority {
    local: PeerId,
    authority: Option<PeerId>,
}

impl ElectedAuthority {
    /// No authority known yet.
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            authority: None,
        }
    }

    pub fn with_authority(local: PeerId, authority: PeerId) -> Self {
        Self {
            local,
            authority: Some(authority),
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// Returns `true` if the authority changed.
    pub fn set_authority(&mut self, authority: Option<PeerId>) -> bool {
        let changed = self.authority != authority;
        self.authority = authority;
        changed
    }

    /// Elect the lowest id among `peers` and the local peer.
    pub fn elect_lowest(&mut self, peers: &BTreeSet<PeerId>) -> bool {
        let lowest = peers.iter().copied().chain([self.local]).min();
        self.set_authority(lowest)
    }
}

impl AuthorityProvider for ElectedAuthority {
    fn is_local_peer_authority(&self) -> bool {
        self.authority == Some(self.local)
    }

    fn authority_peer(&self) -> Option<PeerId> {
        self.authority
    }
}
