//! Furrow Net -- replication of farming tile state between peers.
//!
//! Every peer holds a full [`furrow_core::world::WorldStore`]. One peer is
//! the *authority*: it serves full syncs to joining peers and runs the daily
//! growth pass. Any peer may mutate tiles locally; each mutation is
//! broadcast as an absolute-value delta that other peers apply on receipt.
//!
//! # Message Flow
//!
//! ```text
//! joiner                      authority                    others
//!   |-- SyncRequest ------------->|                           |
//!   |<------------- SyncBatch 1/N-|                           |
//!   |<------------- SyncBatch N/N-|                           |
//!   |<--------- SyncComplete(cnt)-|                           |
//!   |-- Tilled / CropPlanted ...--+-------------------------->|
//!   |<--------- CropStageUpdated--+-------------------------->|
//! ```
//!
//! # Key Types
//!
//! - [`message::FarmMessage`] -- the opcode-tagged wire messages.
//! - [`transport::MessageBus`] -- send primitives the host transport provides.
//! - [`authority::AuthorityProvider`] -- who the authority is.
//! - [`sync::AuthoritySync`] / [`sync::FollowerSync`] -- paced full sync.
//! - [`replicate`] -- local mutation to delta, delta to remote mutation.
//! - [`session::PeerSession`] -- ties the above to one peer's world.

pub mod authority;
pub mod message;
pub mod replicate;
pub mod session;
pub mod sync;
pub mod transport;
