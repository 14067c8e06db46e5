//! State Management Module
//!
//! The three in-memory components the coordinator guards: browser
//! presence, the leader slot, and the shared state blob. None of them
//! lock internally.

mod election;
mod presence;
mod store;

pub use presence::{BrowserInfo, BrowserStatus, ClientRecord, PresenceRegistry, PresenceSnapshot};
pub use store::{is_writable, SharedStateStore, PROTECTED_FIELDS, RESERVED_FIELDS};
pub use election::{ClaimOutcome, ElectionState, ElectionView, LeaderElection};
