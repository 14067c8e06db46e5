//! WolfBeacon - Leader Election for Polling Browsers
//!
//! A small coordination service for browser clients that can only talk to
//! the server through periodic HTTP polling. Browsers agree on a single
//! active leader and share a mutable state blob.
//!
//! # Architecture
//!
//! Three in-memory components sit behind one lock in the [`Coordinator`]:
//!
//! - **Presence**: last-seen time and tag of every browser. Any request is
//!   an implicit heartbeat; a background sweep evicts silent browsers.
//! - **Election**: a single leader slot with heartbeat timeout failover and
//!   forced takeover. Evicting the leader vacates the slot.
//! - **Shared state**: an opaque JSON object updated by shallow merges.
//!   Election fields can never be written through it.
//!
//! This is a best-effort single-leader approximation for trusted clients,
//! not consensus. Nothing is persisted.

pub mod config;
pub mod error;
pub mod clock;
pub mod state;
pub mod coordinator;
pub mod sweeper;
pub mod api;

pub use config::BeaconConfig;
pub use coordinator::Coordinator;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::BeaconConfig;
    pub use crate::error::{Error, Result};
    pub use crate::clock::{Clock, ManualClock, Millis, SystemClock};
    pub use crate::coordinator::{ClaimResult, Coordinator, HealthReport, StateView};
    pub use crate::state::{BrowserStatus, ClaimOutcome, ElectionView, PresenceSnapshot};
    pub use crate::sweeper::Sweeper;
    pub use crate::api::HttpServer;
}
