//! Browser Coordinator
//!
//! Owns presence, election and shared state behind a single lock so that
//! claim arbitration, heartbeat refresh and presence updates always see a
//! consistent view. Every operation here is a bounded in-memory
//! computation; nothing awaits while the lock is held except the lock
//! itself.

use std::sync::Arc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::clock::{Clock, Millis, SystemClock};
use crate::config::BeaconConfig;
use crate::error::{Error, Result};
use crate::state::{
    ClaimOutcome, ElectionView, LeaderElection, PresenceRegistry, PresenceSnapshot,
    SharedStateStore,
};

/// Everything guarded by the coordinator lock
#[derive(Debug)]
struct Inner {
    presence: PresenceRegistry,
    election: LeaderElection,
    store: SharedStateStore,
}

impl Inner {
    fn snapshot(&self, now: Millis) -> PresenceSnapshot {
        self.presence.snapshot(self.election.leader_id(), now)
    }
}

/// Full view returned to a polling browser
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    #[serde(flatten)]
    pub state: Map<String, Value>,
    #[serde(flatten)]
    pub election: ElectionView,
    pub last_updated: Millis,
    pub browsers: PresenceSnapshot,
}

/// Outcome of a leadership claim plus the resulting view
#[derive(Debug, Clone)]
pub struct ClaimResult {
    pub outcome: ClaimOutcome,
    /// Leader after the claim was arbitrated
    pub leader_id: Option<String>,
    pub browsers: PresenceSnapshot,
}

/// Process health summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub browser_count: usize,
    pub leader_id: Option<String>,
    pub uptime_secs: u64,
}

/// Process-wide coordinator
pub struct Coordinator {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
    /// Browsers silent for longer than this are evicted by [`Coordinator::sweep`]
    presence_timeout_ms: Millis,
    started_at: Millis,
}

impl Coordinator {
    /// Create a coordinator using the wall clock
    pub fn new(config: &BeaconConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit time source
    pub fn with_clock(config: &BeaconConfig, clock: Arc<dyn Clock>) -> Self {
        let inner = Inner {
            presence: PresenceRegistry::new(
                config.presence.default_tag.clone(),
                config.presence.warning_after_ms,
            ),
            election: LeaderElection::new(config.election.leader_timeout_ms),
            store: SharedStateStore::new(config.state.defaults.clone()),
        };

        Self {
            inner: RwLock::new(inner),
            started_at: clock.now_ms(),
            clock,
            presence_timeout_ms: config.presence.timeout_ms,
        }
    }

    fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Current state, election fields and presence. A caller id, when
    /// given, counts as a heartbeat.
    pub async fn get_state(&self, caller_id: Option<&str>, tag: Option<&str>) -> Result<StateView> {
        let now = self.now();

        let view = |inner: &Inner| StateView {
            state: inner.store.read(),
            election: inner.election.view(),
            last_updated: inner.store.last_updated(),
            browsers: inner.snapshot(now),
        };

        match caller(caller_id) {
            Some(id) => {
                let mut inner = self.inner.write().await;
                inner.presence.touch(id, tag, now);
                Ok(view(&*inner))
            }
            None => Ok(view(&*self.inner.read().await)),
        }
    }

    /// Merge a state update. Any browser may write payload fields; only the
    /// leader's own heartbeat timestamp moves the election clock.
    pub async fn post_state(
        &self,
        caller_id: Option<&str>,
        heartbeat_ts: Option<Millis>,
        payload: &Value,
    ) -> Result<PresenceSnapshot> {
        let id = require_caller(caller_id)?;
        SharedStateStore::validate(payload)?;

        let now = self.now();
        let mut inner = self.inner.write().await;

        inner.presence.touch(id, None, now);
        if let Some(ts) = heartbeat_ts {
            inner.election.refresh(id, ts);
        }
        let written = inner.store.merge(payload, now)?;
        tracing::debug!("State update from {}: {:?}", id, written);

        Ok(inner.snapshot(now))
    }

    /// Arbitrate a leadership claim
    pub async fn claim_leader(
        &self,
        caller_id: Option<&str>,
        timestamp: Option<Millis>,
        force: bool,
        tag: Option<&str>,
    ) -> Result<ClaimResult> {
        let id = require_caller(caller_id)?;

        let now = self.now();
        let mut inner = self.inner.write().await;

        inner.presence.touch(id, tag, now);
        let outcome = inner.election.claim(id, timestamp, force, now);

        Ok(ClaimResult {
            outcome,
            leader_id: inner.election.leader_id().map(str::to_string),
            browsers: inner.snapshot(now),
        })
    }

    /// Explicit heartbeat. Renews leadership only for the current leader.
    pub async fn heartbeat(
        &self,
        caller_id: Option<&str>,
        tag: Option<&str>,
        is_leader_claim: bool,
    ) -> Result<PresenceSnapshot> {
        let id = require_caller(caller_id)?;

        let now = self.now();
        let mut inner = self.inner.write().await;

        inner.presence.touch(id, tag, now);
        if is_leader_claim && !inner.election.refresh(id, now) {
            tracing::debug!("Heartbeat from {} claims leadership it does not hold", id);
        }

        Ok(inner.snapshot(now))
    }

    /// Presence snapshot
    pub async fn browsers(&self) -> PresenceSnapshot {
        let now = self.now();
        self.inner.read().await.snapshot(now)
    }

    /// Forget every browser, vacate leadership and restore default state
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.presence.clear();
        inner.election.reset();
        inner.store.reset();
        tracing::warn!("Coordinator reset: browsers cleared, leadership vacant, state restored");
    }

    /// Health summary
    pub async fn health(&self) -> HealthReport {
        let inner = self.inner.read().await;
        HealthReport {
            status: "ok".to_string(),
            browser_count: inner.presence.len(),
            leader_id: inner.election.leader_id().map(str::to_string),
            uptime_secs: self.now().saturating_sub(self.started_at) / 1000,
        }
    }

    /// Evict stale browsers and vacate leadership if the leader was among
    /// them. Returns the evicted ids.
    pub async fn sweep(&self) -> Vec<String> {
        let now = self.now();
        let mut inner = self.inner.write().await;

        let evicted = inner.presence.sweep(now, self.presence_timeout_ms);
        if !evicted.is_empty() {
            inner.election.on_evicted(&evicted);
            tracing::info!(
                "Evicted {} inactive browser(s): {:?} ({} remaining)",
                evicted.len(),
                evicted,
                inner.presence.len()
            );
        }

        evicted
    }
}

/// A caller id counts only if it has a non-whitespace character
fn caller(caller_id: Option<&str>) -> Option<&str> {
    caller_id.filter(|id| !id.trim().is_empty())
}

fn require_caller(caller_id: Option<&str>) -> Result<&str> {
    caller(caller_id).ok_or(Error::MissingCallerId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::BrowserStatus;
    use serde_json::json;

    fn setup() -> (Coordinator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let coordinator = Coordinator::with_clock(&BeaconConfig::default(), clock.clone());
        (coordinator, clock)
    }

    #[tokio::test]
    async fn test_claim_race_and_timeout_failover() {
        let (coordinator, clock) = setup();

        let a = coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();
        assert!(a.outcome.is_success());
        assert_eq!(a.leader_id.as_deref(), Some("A"));

        clock.set(1_000);
        let b = coordinator.claim_leader(Some("B"), None, false, None).await.unwrap();
        assert!(!b.outcome.is_success());
        assert_eq!(b.leader_id.as_deref(), Some("A"));

        clock.set(8_001);
        let b = coordinator.claim_leader(Some("B"), None, false, None).await.unwrap();
        assert_eq!(b.outcome, ClaimOutcome::Acquired { previous: Some("A".into()) });
        assert_eq!(b.leader_id.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_heartbeat_blocks_failover() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("L"), None, false, None).await.unwrap();

        clock.set(4_000);
        coordinator.heartbeat(Some("L"), None, true).await.unwrap();

        clock.set(8_001);
        let other = coordinator.claim_leader(Some("X"), None, false, None).await.unwrap();
        assert!(!other.outcome.is_success());

        clock.set(12_001);
        let other = coordinator.claim_leader(Some("X"), None, false, None).await.unwrap();
        assert!(other.outcome.is_success());
    }

    #[tokio::test]
    async fn test_heartbeat_without_leader_flag_does_not_renew() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("L"), None, false, None).await.unwrap();

        clock.set(5_000);
        coordinator.heartbeat(Some("L"), None, false).await.unwrap();
        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_heartbeat, 0);

        // A non-leader claiming leadership in a heartbeat acquires nothing
        coordinator.heartbeat(Some("X"), None, true).await.unwrap();
        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_id.as_deref(), Some("L"));
    }

    #[tokio::test]
    async fn test_force_claim_always_wins() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();

        clock.set(10);
        coordinator.heartbeat(Some("A"), None, true).await.unwrap();
        let forced = coordinator.claim_leader(Some("B"), Some(10), true, None).await.unwrap();
        assert!(forced.outcome.is_success());
        assert_eq!(forced.leader_id.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_eviction_clears_leadership() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();

        clock.set(30_000);
        assert!(coordinator.sweep().await.is_empty());

        clock.set(30_001);
        assert_eq!(coordinator.sweep().await, vec!["A".to_string()]);

        assert_eq!(coordinator.browsers().await.total_count, 0);
        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_id, None);
        assert_eq!(state.election.leader_heartbeat, 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_leader_alive_through_other_traffic() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();

        clock.set(20_000);
        coordinator.get_state(Some("A"), None).await.unwrap();
        coordinator.heartbeat(Some("B"), None, false).await.unwrap();

        clock.set(40_000);
        assert!(coordinator.sweep().await.is_empty());
        assert_eq!(coordinator.health().await.leader_id.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_post_state_cannot_touch_election_fields() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();

        clock.set(100);
        let payload = json!({ "leaderId": "B", "leaderHeartbeat": 999_999, "symbol": "ETHUSDT" });
        coordinator.post_state(Some("B"), Some(500), &payload).await.unwrap();

        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_id.as_deref(), Some("A"));
        assert_eq!(state.election.leader_heartbeat, 0);
        assert_eq!(state.state["symbol"], "ETHUSDT");
        assert_eq!(state.last_updated, 100);
    }

    #[tokio::test]
    async fn test_post_state_from_leader_refreshes_heartbeat() {
        let (coordinator, clock) = setup();
        coordinator.claim_leader(Some("A"), None, false, None).await.unwrap();

        clock.set(3_000);
        coordinator.post_state(Some("A"), Some(2_900), &json!({})).await.unwrap();
        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_heartbeat, 2_900);

        coordinator.post_state(Some("A"), None, &json!({ "interval": "5m" })).await.unwrap();
        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.election.leader_heartbeat, 2_900);
    }

    #[tokio::test]
    async fn test_validation_leaves_state_untouched() {
        let (coordinator, _clock) = setup();

        let err = coordinator.post_state(None, None, &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::MissingCallerId));

        let err = coordinator.post_state(Some("A"), None, &json!([1])).await.unwrap_err();
        assert!(err.is_validation());

        assert!(coordinator.claim_leader(Some(""), None, true, None).await.is_err());
        assert!(coordinator.heartbeat(Some("  "), None, true).await.is_err());

        assert_eq!(coordinator.browsers().await.total_count, 0);
        assert_eq!(coordinator.health().await.leader_id, None);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let (coordinator, _clock) = setup();
        let pristine = coordinator.get_state(None, None).await.unwrap();

        coordinator.claim_leader(Some("A"), None, false, Some("1m")).await.unwrap();
        coordinator.post_state(Some("A"), None, &json!({ "symbol": "X", "new": 1 })).await.unwrap();

        coordinator.reset().await;
        coordinator.reset().await;

        let state = coordinator.get_state(None, None).await.unwrap();
        assert_eq!(state.state, pristine.state);
        assert_eq!(state.election, ElectionView::default());
        assert_eq!(state.last_updated, 0);
        assert_eq!(state.browsers.total_count, 0);
    }

    #[tokio::test]
    async fn test_get_state_registers_caller_with_tag() {
        let (coordinator, _clock) = setup();
        let view = coordinator.get_state(Some("A"), Some("15m")).await.unwrap();

        assert_eq!(view.browsers.total_count, 1);
        assert_eq!(view.browsers.browsers[0].tag, "15m");
        assert_eq!(view.browsers.browsers[0].status, BrowserStatus::Online);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert!(json["leaderId"].is_null());
        assert_eq!(json["leaderHeartbeat"], 0);
        assert_eq!(json["browsers"]["totalCount"], 1);
    }

    #[tokio::test]
    async fn test_get_state_ignores_blank_caller() {
        let (coordinator, _clock) = setup();

        for id in ["", "  ", "\t"] {
            let view = coordinator.get_state(Some(id), Some("1m")).await.unwrap();
            assert_eq!(view.browsers.total_count, 0);
        }
        assert_eq!(coordinator.browsers().await.total_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_claims_elect_one_leader() {
        let (coordinator, _clock) = setup();
        let coordinator = Arc::new(coordinator);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    let id = format!("browser-{}", i);
                    coordinator
                        .claim_leader(Some(id.as_str()), None, false, None)
                        .await
                        .unwrap()
                        .outcome
                        .is_success()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(coordinator.browsers().await.total_count, 16);
    }
}
