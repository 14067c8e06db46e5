//! Browser Presence Tracking
//!
//! Tracks every browser that has contacted the service, when it was last
//! seen and the tag it reported. Any request counts as proof of life.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

use crate::clock::Millis;

/// Presence status reported for a browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserStatus {
    /// Browser is the current leader
    Leader,
    /// Browser has been quiet for longer than the warning threshold
    Warning,
    /// Browser has been seen recently
    Online,
}

impl std::fmt::Display for BrowserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserStatus::Leader => write!(f, "LEADER"),
            BrowserStatus::Warning => write!(f, "WARNING"),
            BrowserStatus::Online => write!(f, "ONLINE"),
        }
    }
}

/// A single known browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Browser identifier
    pub id: String,
    /// Last contact time
    pub last_seen: Millis,
    /// Last reported tag
    pub tag: String,
}

impl ClientRecord {
    /// Time since last contact
    pub fn age(&self, now: Millis) -> Millis {
        now.saturating_sub(self.last_seen)
    }
}

/// Read-only view of one browser, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub id: String,
    pub tag: String,
    pub last_seen: Millis,
    pub age_ms: Millis,
    pub status: BrowserStatus,
}

/// Read-only view of the whole registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub total_count: usize,
    pub online_count: usize,
    pub browsers: Vec<BrowserInfo>,
}

/// Registry of known browsers
#[derive(Debug)]
pub struct PresenceRegistry {
    records: HashMap<String, ClientRecord>,
    /// Tag given to browsers that never reported one
    default_tag: String,
    /// Age after which a browser is reported as `warning`
    warning_after_ms: Millis,
}

impl PresenceRegistry {
    /// Create an empty registry
    pub fn new(default_tag: String, warning_after_ms: Millis) -> Self {
        Self {
            records: HashMap::new(),
            default_tag,
            warning_after_ms,
        }
    }

    /// Record contact from a browser, creating it on first sight
    pub fn touch(&mut self, id: &str, tag: Option<&str>, now: Millis) {
        match self.records.get_mut(id) {
            Some(record) => {
                record.last_seen = record.last_seen.max(now);
                if let Some(tag) = tag {
                    record.tag = tag.to_string();
                }
            }
            None => {
                tracing::debug!("New browser registered: {}", id);
                self.records.insert(
                    id.to_string(),
                    ClientRecord {
                        id: id.to_string(),
                        last_seen: now,
                        tag: tag.unwrap_or(&self.default_tag).to_string(),
                    },
                );
            }
        }
    }

    /// Get a browser's record
    pub fn get(&self, id: &str) -> Option<&ClientRecord> {
        self.records.get(id)
    }

    /// Check whether a browser is registered
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of registered browsers
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether no browsers are registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Classify a record. Leadership wins over staleness.
    fn status_of(&self, record: &ClientRecord, leader_id: Option<&str>, now: Millis) -> BrowserStatus {
        if leader_id == Some(record.id.as_str()) {
            BrowserStatus::Leader
        } else if record.age(now) > self.warning_after_ms {
            BrowserStatus::Warning
        } else {
            BrowserStatus::Online
        }
    }

    /// Build a snapshot of every browser, ordered by id
    pub fn snapshot(&self, leader_id: Option<&str>, now: Millis) -> PresenceSnapshot {
        let mut browsers: Vec<BrowserInfo> = self
            .records
            .values()
            .map(|record| BrowserInfo {
                id: record.id.clone(),
                tag: record.tag.clone(),
                last_seen: record.last_seen,
                age_ms: record.age(now),
                status: self.status_of(record, leader_id, now),
            })
            .collect();
        browsers.sort_by(|a, b| a.id.cmp(&b.id));

        // Stale browsers are evicted rather than reported, so every
        // registered browser counts as online.
        PresenceSnapshot {
            total_count: browsers.len(),
            online_count: browsers.len(),
            browsers,
        }
    }

    /// Remove every browser silent for longer than `timeout_ms`
    pub fn sweep(&mut self, now: Millis, timeout_ms: Millis) -> Vec<String> {
        let mut evicted: Vec<String> = self
            .records
            .values()
            .filter(|record| record.age(now) > timeout_ms)
            .map(|record| record.id.clone())
            .collect();
        evicted.sort();

        for id in &evicted {
            self.records.remove(id);
        }

        evicted
    }

    /// Forget every browser
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
