//! Leader Election
//!
//! Single-slot, lease-style leader election. A browser holds leadership as
//! long as it keeps heartbeating; a leader that goes quiet for longer than
//! the leader timeout can be displaced by the next claimant, and a forced
//! claim always wins.
//!
//! This is not consensus. Correctness relies on every transition running
//! under the coordinator's single lock.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;

/// Election state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionState {
    /// No leader
    Vacant,
    /// Leadership held by a browser
    Held {
        leader_id: String,
        /// Last accepted heartbeat from the leader
        heartbeat: Millis,
    },
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Caller became leader, displacing `previous` if there was one
    Acquired { previous: Option<String> },
    /// Caller already was leader; heartbeat refreshed
    Renewed,
    /// Another browser holds a fresh lease
    Rejected { leader_id: String, reason: String },
}

impl ClaimOutcome {
    /// Whether the caller is leader after the claim
    pub fn is_success(&self) -> bool {
        !matches!(self, ClaimOutcome::Rejected { .. })
    }
}

/// Election fields as exposed to clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionView {
    pub leader_id: Option<String>,
    pub leader_heartbeat: Millis,
}

/// Owner of the leader slot
#[derive(Debug)]
pub struct LeaderElection {
    state: ElectionState,
    /// A leader silent for longer than this may be displaced
    leader_timeout_ms: Millis,
}

impl LeaderElection {
    /// Create a vacant election
    pub fn new(leader_timeout_ms: Millis) -> Self {
        Self {
            state: ElectionState::Vacant,
            leader_timeout_ms,
        }
    }

    /// Get current state
    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    /// Current leader, if any
    pub fn leader_id(&self) -> Option<&str> {
        match &self.state {
            ElectionState::Held { leader_id, .. } => Some(leader_id),
            ElectionState::Vacant => None,
        }
    }

    /// Last leader heartbeat, 0 when vacant
    pub fn leader_heartbeat(&self) -> Millis {
        match &self.state {
            ElectionState::Held { heartbeat, .. } => *heartbeat,
            ElectionState::Vacant => 0,
        }
    }

    /// Check if `id` is the current leader
    pub fn is_leader(&self, id: &str) -> bool {
        self.leader_id() == Some(id)
    }

    /// Snapshot of the election fields
    pub fn view(&self) -> ElectionView {
        ElectionView {
            leader_id: self.leader_id().map(str::to_string),
            leader_heartbeat: self.leader_heartbeat(),
        }
    }

    /// Arbitrate a leadership claim
    pub fn claim(
        &mut self,
        id: &str,
        requested_ts: Option<Millis>,
        force: bool,
        now: Millis,
    ) -> ClaimOutcome {
        let ts = requested_ts.unwrap_or(now);

        match &self.state {
            ElectionState::Held { leader_id, .. } if leader_id == id => {
                self.refresh(id, ts);
                ClaimOutcome::Renewed
            }
            ElectionState::Held { leader_id, heartbeat } if !force => {
                let silent_for = now.saturating_sub(*heartbeat);
                if silent_for > self.leader_timeout_ms {
                    let previous = leader_id.clone();
                    tracing::info!(
                        "Leader {} silent for {}ms, {} takes over",
                        previous,
                        silent_for,
                        id
                    );
                    self.install(id, ts);
                    ClaimOutcome::Acquired { previous: Some(previous) }
                } else {
                    let reason = format!(
                        "Another browser is the active leader ({}, last heartbeat {}ms ago)",
                        leader_id, silent_for
                    );
                    tracing::debug!("Rejected claim from {}: {}", id, reason);
                    ClaimOutcome::Rejected {
                        leader_id: leader_id.clone(),
                        reason,
                    }
                }
            }
            ElectionState::Held { leader_id, .. } => {
                let previous = leader_id.clone();
                tracing::warn!("Forced takeover: {} replaces leader {}", id, previous);
                self.install(id, ts);
                ClaimOutcome::Acquired { previous: Some(previous) }
            }
            ElectionState::Vacant => {
                tracing::info!("{} claimed vacant leadership", id);
                self.install(id, ts);
                ClaimOutcome::Acquired { previous: None }
            }
        }
    }

    /// Refresh the leader's heartbeat. No-op unless `id` is the leader.
    /// The heartbeat never moves backwards for the same leader.
    pub fn refresh(&mut self, id: &str, ts: Millis) -> bool {
        match &mut self.state {
            ElectionState::Held { leader_id, heartbeat } if leader_id.as_str() == id => {
                *heartbeat = (*heartbeat).max(ts);
                true
            }
            _ => false,
        }
    }

    /// React to presence eviction. Returns true if leadership was cleared.
    pub fn on_evicted(&mut self, evicted: &[String]) -> bool {
        let leader_gone = self
            .leader_id()
            .is_some_and(|leader| evicted.iter().any(|id| id == leader));

        if leader_gone {
            tracing::warn!(
                "Leader {} evicted for inactivity, leadership vacant",
                self.leader_id().unwrap_or_default()
            );
            self.state = ElectionState::Vacant;
        }

        leader_gone
    }

    /// Drop leadership unconditionally
    pub fn reset(&mut self) {
        self.state = ElectionState::Vacant;
    }

    fn install(&mut self, id: &str, heartbeat: Millis) {
        self.state = ElectionState::Held {
            leader_id: id.to_string(),
            heartbeat,
        };
    }
}
