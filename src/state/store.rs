//! Shared State Store
//!
//! Holds the opaque state blob browsers share. Updates are shallow
//! per-field merges; election fields can never be written through here.

use serde_json::{Map, Value};

use crate::clock::Millis;
use crate::error::{Error, Result};

/// Fields owned by the election and never accepted from a state update
pub const PROTECTED_FIELDS: &[&str] = &["leaderId", "leaderHeartbeat"];

/// Top-level fields of the state view filled in by the coordinator
pub const RESERVED_FIELDS: &[&str] = &["lastUpdated", "browsers"];

/// Check whether a field may be written through a state update
pub fn is_writable(field: &str) -> bool {
    !PROTECTED_FIELDS.contains(&field) && !RESERVED_FIELDS.contains(&field)
}

/// Mergeable key/value state with a fixed default shape
#[derive(Debug, Clone)]
pub struct SharedStateStore {
    defaults: Map<String, Value>,
    current: Map<String, Value>,
    /// Time of the last accepted merge, 0 since start or reset
    last_updated: Millis,
}

impl SharedStateStore {
    /// Create a store initialised to `defaults`
    pub fn new(defaults: Map<String, Value>) -> Self {
        let defaults: Map<String, Value> = defaults
            .into_iter()
            .filter(|(field, _)| is_writable(field))
            .collect();

        Self {
            current: defaults.clone(),
            defaults,
            last_updated: 0,
        }
    }

    /// Check a payload is mergeable without touching the store
    pub fn validate(payload: &Value) -> Result<&Map<String, Value>> {
        match payload {
            Value::Object(fields) => Ok(fields),
            other => Err(Error::MalformedPayload(format!(
                "state update must be a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Merge every writable field of `payload` into the state.
    /// Returns the names of the fields written.
    pub fn merge(&mut self, payload: &Value, now: Millis) -> Result<Vec<String>> {
        let fields = Self::validate(payload)?;

        let mut written = Vec::with_capacity(fields.len());
        for (field, value) in fields.iter().filter(|(field, _)| is_writable(field)) {
            self.current.insert(field.clone(), value.clone());
            written.push(field.clone());
        }

        let dropped = fields.len() - written.len();
        if dropped > 0 {
            tracing::debug!("Ignored {} protected or reserved field(s) in state update", dropped);
        }

        self.last_updated = now;
        Ok(written)
    }

    /// Copy of the current state
    pub fn read(&self) -> Map<String, Value> {
        self.current.clone()
    }

    /// Time of the last accepted merge
    pub fn last_updated(&self) -> Millis {
        self.last_updated
    }

    /// Restore the default shape
    pub fn reset(&mut self) {
        self.current = self.defaults.clone();
        self.last_updated = 0;
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SharedStateStore {
        let defaults = json!({ "symbol": "BTCUSDT", "interval": "1m", "filters": {} });
        SharedStateStore::new(defaults.as_object().unwrap().clone())
    }

    #[test]
    fn test_merge_overwrites_and_adds() {
        let mut store = store();

        let written = store
            .merge(&json!({ "symbol": "ETHUSDT", "theme": "dark" }), 500)
            .unwrap();
        assert_eq!(written.len(), 2);

        let state = store.read();
        assert_eq!(state["symbol"], "ETHUSDT");
        assert_eq!(state["theme"], "dark");
        assert_eq!(state["interval"], "1m");
        assert_eq!(store.last_updated(), 500);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut store = store();
        store.merge(&json!({ "filters": { "a": 1, "b": 2 } }), 1).unwrap();
        store.merge(&json!({ "filters": { "c": 3 } }), 2).unwrap();

        assert_eq!(store.read()["filters"], json!({ "c": 3 }));
    }

    #[test]
    fn test_protected_fields_dropped() {
        let mut store = store();
        let written = store
            .merge(&json!({ "leaderId": "evil", "leaderHeartbeat": 99, "interval": "5m" }), 1)
            .unwrap();

        assert_eq!(written, vec!["interval".to_string()]);
        let state = store.read();
        assert!(!state.contains_key("leaderId"));
        assert!(!state.contains_key("leaderHeartbeat"));
    }

    #[test]
    fn test_reserved_fields_dropped() {
        let mut store = store();
        let written = store
            .merge(&json!({ "browsers": "mine", "lastUpdated": "x", "theme": "dark" }), 1)
            .unwrap();

        assert_eq!(written, vec!["theme".to_string()]);
        let state = store.read();
        assert!(!state.contains_key("browsers"));
        assert!(!state.contains_key("lastUpdated"));
    }

    #[test]
    fn test_non_object_rejected_without_mutation() {
        let mut store = store();
        let before = store.read();

        for payload in [json!([1, 2]), json!("symbol"), json!(null), json!(4)] {
            let err = store.merge(&payload, 10).unwrap_err();
            assert!(err.is_validation());
        }
        assert_eq!(store.read(), before);
        assert_eq!(store.last_updated(), 0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut store = store();
        store.merge(&json!({ "symbol": "SOLUSDT", "extra": true }), 7).unwrap();
        store.reset();

        assert_eq!(store.read(), store.defaults);
        assert_eq!(store.last_updated(), 0);
    }
}
