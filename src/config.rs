//! WolfBeacon Configuration
//!
//! This module provides configuration structures for the WolfBeacon
//! browser coordination service. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::{PROTECTED_FIELDS, RESERVED_FIELDS};

/// Main WolfBeacon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Leader election configuration
    #[serde(default)]
    pub election: ElectionConfig,

    /// Presence tracking configuration
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Shared state configuration
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS (browsers usually load the app from another origin)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// A leader silent for longer than this may be displaced by a claim
    #[serde(default = "default_leader_timeout_ms")]
    pub leader_timeout_ms: u64,
}

/// Presence tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Browsers silent for longer than this are evicted
    #[serde(default = "default_presence_timeout_ms")]
    pub timeout_ms: u64,

    /// How often the background sweep runs
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Age after which a browser is reported as `warning`
    #[serde(default = "default_warning_after_ms")]
    pub warning_after_ms: u64,

    /// Tag reported for browsers that never sent one
    #[serde(default = "default_tag")]
    pub default_tag: String,
}

/// Shared state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Default shape of the shared state, restored on reset
    #[serde(default = "default_state_defaults")]
    pub defaults: serde_json::Map<String, serde_json::Value>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

fn default_leader_timeout_ms() -> u64 {
    8_000
}

fn default_presence_timeout_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

fn default_warning_after_ms() -> u64 {
    10_000
}

fn default_tag() -> String {
    "unknown".to_string()
}

fn default_state_defaults() -> serde_json::Map<String, serde_json::Value> {
    let mut defaults = serde_json::Map::new();
    defaults.insert("symbol".into(), serde_json::json!("BTCUSDT"));
    defaults.insert("interval".into(), serde_json::json!("1m"));
    defaults.insert("filters".into(), serde_json::json!({}));
    defaults.insert("intervalSettings".into(), serde_json::json!({}));
    defaults
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_address(),
            cors_enabled: true,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            leader_timeout_ms: default_leader_timeout_ms(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_presence_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            warning_after_ms: default_warning_after_ms(),
            default_tag: default_tag(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            defaults: default_state_defaults(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BeaconConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: BeaconConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        if self.election.leader_timeout_ms == 0 {
            return Err(crate::Error::Config("election.leader_timeout_ms must be > 0".into()));
        }

        if self.presence.sweep_interval_ms == 0 {
            return Err(crate::Error::Config("presence.sweep_interval_ms must be > 0".into()));
        }

        // Eviction must never clear a leader before timeout failover could.
        if self.presence.timeout_ms <= self.election.leader_timeout_ms {
            return Err(crate::Error::Config(format!(
                "presence.timeout_ms ({}) must exceed election.leader_timeout_ms ({})",
                self.presence.timeout_ms, self.election.leader_timeout_ms
            )));
        }

        if let Some(field) = PROTECTED_FIELDS
            .iter()
            .chain(RESERVED_FIELDS)
            .find(|f| self.state.defaults.contains_key(**f))
        {
            return Err(crate::Error::Config(format!(
                "state.defaults cannot contain reserved field '{}'",
                field
            )));
        }

        Ok(())
    }

    /// Get leader timeout as Duration
    pub fn leader_timeout(&self) -> Duration {
        Duration::from_millis(self.election.leader_timeout_ms)
    }

    /// Get presence timeout as Duration
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_millis(self.presence.timeout_ms)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.presence.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[api]
bind_address = "127.0.0.1:4000"
cors_enabled = false

[election]
leader_timeout_ms = 5000

[presence]
timeout_ms = 20000
sweep_interval_ms = 2000

[state.defaults]
symbol = "ETHUSDT"
filters = { minVolume = 10 }
"#;

        let config = BeaconConfig::from_str(toml).unwrap();
        assert_eq!(config.api.bind_address, "127.0.0.1:4000");
        assert!(!config.api.cors_enabled);
        assert_eq!(config.leader_timeout(), Duration::from_secs(5));
        assert_eq!(config.presence_timeout(), Duration::from_secs(20));
        assert_eq!(config.sweep_interval(), Duration::from_secs(2));
        assert_eq!(config.presence.default_tag, "unknown");
        assert_eq!(config.state.defaults["symbol"], "ETHUSDT");
        assert_eq!(config.state.defaults["filters"]["minVolume"], 10);
        assert!(!config.state.defaults.contains_key("interval"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BeaconConfig::from_str("").unwrap();
        assert_eq!(config.election.leader_timeout_ms, 8_000);
        assert_eq!(config.presence.timeout_ms, 30_000);
        assert_eq!(config.presence.sweep_interval_ms, 10_000);
        assert_eq!(config.api.max_body_bytes, 10 * 1024);
        assert_eq!(config.state.defaults["symbol"], "BTCUSDT");
    }

    #[test]
    fn test_presence_must_outlast_election() {
        let toml = r#"
[election]
leader_timeout_ms = 30000

[presence]
timeout_ms = 30000
"#;
        let err = BeaconConfig::from_str(toml).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_defaults_reject_election_fields() {
        let toml = r#"
[state.defaults]
leaderId = "sneaky"
"#;
        assert!(BeaconConfig::from_str(toml).is_err());

        let toml = r#"
[state.defaults]
browsers = []
"#;
        assert!(BeaconConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = BeaconConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }
}
