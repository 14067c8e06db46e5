//! HTTP API Module
//!
//! Provides the JSON API browsers poll for state, leadership and presence.

mod http;

pub use http::{
    ClaimLeaderRequest, ClaimLeaderResponse, ErrorResponse, HeartbeatRequest, HttpServer,
    PresenceResponse, ResetResponse, StateQuery,
};
