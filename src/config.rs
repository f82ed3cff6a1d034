//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! the keepalive entity, event names, scheduler cadence, and default paths.
//! `AppConfig` is the root configuration struct containing all settings.
//! Unknown keys are ignored so a shared host configuration file can carry
//! sections this process does not read.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use const_format::formatcp;
use serde::Deserialize;

// =============================================================================
// Keepalive Identity
// =============================================================================

/// Domain under which the probe registers its entity, event, and route
pub const DOMAIN: &str = "keepalive_probe";

/// Entity holding the epoch seconds of the most recent keepalive
pub const ENTITY_NAME: &str = formatcp!("{}.last_seen", DOMAIN);

/// Event fired by the scheduler on every keepalive tick
pub const EVENT_NAME: &str = formatcp!("{}_event", DOMAIN);

/// Id of the automation injected at startup to fire `EVENT_NAME`
pub const KEEPALIVE_AUTOMATION_ID: &str = formatcp!("{}_keepalive", DOMAIN);

/// Route the probe is served on
pub const HEALTHCHECK_ENDPOINT: &str = "/healthz";

/// Probe responses must never be served from a cache
pub const CACHE_CONTROL_PROBE: &str = "no-store";

// =============================================================================
// Keepalive Timing
// =============================================================================

/// Period in seconds between keepalive events
pub const KEEPALIVE_INTERVAL_SECS: u64 = 10;

/// Interval profile: threshold = interval × multiplier (missed ticks tolerated)
pub const THRESHOLD_MULTIPLIER: u64 = 6;

/// Threshold profile default, in seconds
pub const DEFAULT_THRESHOLD_SECS: u64 = 60;

// =============================================================================
// Host Internals
// =============================================================================

/// Capacity of the broadcast channel backing the event bus
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Event type fired by the state store after every write
pub const EVENT_STATE_CHANGED: &str = "state_changed";

/// Grace period for in-flight connections on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default history file path
pub const DEFAULT_HISTORY_PATH: &str = "data/history.jsonl";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "keepalive_probe=info,tower_http=info";

/// Default HTTP bind address
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8123;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Probe behavior
    #[serde(default)]
    pub healthcheck: HealthcheckConfig,
    /// Bearer tokens accepted by the host's auth middleware
    #[serde(default)]
    pub auth: AuthConfig,
    /// Persisted state history
    #[serde(default)]
    pub history: HistoryConfig,
    /// Host automations (the keepalive automation is appended at startup)
    #[serde(default)]
    pub automation: Vec<AutomationConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }
}

/// How the staleness threshold is obtained.
///
/// `threshold` lets the operator pick the window, `interval` pins it to the
/// scheduler cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdProfile {
    /// User-settable `threshold`, default 60 seconds
    #[default]
    Threshold,
    /// `KEEPALIVE_INTERVAL_SECS × THRESHOLD_MULTIPLIER`, not user-settable
    Interval,
}

/// Probe configuration (`[healthcheck]`)
#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    /// Wrap `/healthz` in the auth middleware (default: true)
    #[serde(default = "HealthcheckConfig::default_auth_required")]
    pub auth_required: bool,
    #[serde(default)]
    pub profile: ThresholdProfile,
    /// Staleness threshold in seconds (threshold profile only)
    pub threshold: Option<NonZeroU64>,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            auth_required: Self::default_auth_required(),
            profile: ThresholdProfile::default(),
            threshold: None,
        }
    }
}

impl HealthcheckConfig {
    fn default_auth_required() -> bool {
        true
    }

    /// Effective threshold in seconds for the configured profile
    pub fn threshold_secs(&self) -> u64 {
        match self.profile {
            ThresholdProfile::Threshold => self
                .threshold
                .map(NonZeroU64::get)
                .unwrap_or(DEFAULT_THRESHOLD_SECS),
            ThresholdProfile::Interval => KEEPALIVE_INTERVAL_SECS * THRESHOLD_MULTIPLIER,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.profile == ThresholdProfile::Interval && self.threshold.is_some() {
            return Err(ConfigError::Validation(
                "healthcheck.threshold cannot be set with profile = \"interval\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// Authentication configuration (`[auth]`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Accepted bearer tokens
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// History backend configuration (`[history]`)
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_enabled")]
    pub enabled: bool,
    /// JSON Lines file holding recorded states
    #[serde(default = "HistoryConfig::default_path")]
    pub path: PathBuf,
    /// Keep at most this many records on disk (compacted at startup)
    #[serde(default = "HistoryConfig::default_max_records")]
    pub max_records: usize,
    #[serde(default)]
    pub include: EntityFilterConfig,
    #[serde(default)]
    pub exclude: EntityFilterConfig,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            path: Self::default_path(),
            max_records: Self::default_max_records(),
            include: EntityFilterConfig::default(),
            exclude: EntityFilterConfig::default(),
        }
    }
}

impl HistoryConfig {
    fn default_enabled() -> bool {
        false
    }

    fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_HISTORY_PATH)
    }

    fn default_max_records() -> usize {
        10000
    }
}

/// Entity ids and domains matched by a history include/exclude rule
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityFilterConfig {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl EntityFilterConfig {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty() && self.entities.is_empty()
    }

    pub fn matches(&self, entity_id: &str) -> bool {
        if self.entities.iter().any(|e| e == entity_id) {
            return true;
        }
        let domain = entity_id.split('.').next().unwrap_or_default();
        self.domains.iter().any(|d| d == domain)
    }
}

/// A host automation: one trigger, one action
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AutomationConfig {
    pub id: String,
    pub alias: Option<String>,
    pub trigger: TriggerConfig,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fires every `seconds` seconds
    TimePattern { seconds: NonZeroU64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    FireEvent { event_type: String },
}

impl AutomationConfig {
    /// The keepalive automation injected into the host at startup
    pub fn keepalive() -> Self {
        Self {
            id: KEEPALIVE_AUTOMATION_ID.to_string(),
            alias: Some("Keepalive probe tick".to_string()),
            trigger: TriggerConfig::TimePattern {
                seconds: NonZeroU64::new(KEEPALIVE_INTERVAL_SECS).unwrap_or(NonZeroU64::MIN),
            },
            action: ActionConfig::FireEvent {
                event_type: EVENT_NAME.to_string(),
            },
        }
    }

    /// Check if this automation fires the given event
    pub fn fires(&self, event_type: &str) -> bool {
        match &self.action {
            ActionConfig::FireEvent { event_type: fired } => fired == event_type,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable (default)
    #[default]
    Text,
    /// Structured JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.healthcheck.validate()?;

        let mut seen = std::collections::HashSet::new();
        for automation in &self.automation {
            if !seen.insert(automation.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate automation id '{}'",
                    automation.id
                )));
            }
        }

        if self.history.enabled && self.history.max_records == 0 {
            return Err(ConfigError::Validation(
                "history.max_records must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_compose_from_domain() {
        assert_eq!(ENTITY_NAME, "keepalive_probe.last_seen");
        assert_eq!(EVENT_NAME, "keepalive_probe_event");
    }

    #[test]
    fn test_shipped_default_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = AppConfig::load(path).unwrap();
        assert!(config.healthcheck.auth_required);
        assert!(config.auth.tokens.is_empty());
        assert_eq!(config.healthcheck.threshold_secs(), DEFAULT_THRESHOLD_SECS);
        assert_eq!(config.http.port, DEFAULT_HTTP_PORT);
        assert!(config.automation.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert!(config.healthcheck.auth_required);
        assert_eq!(config.healthcheck.profile, ThresholdProfile::Threshold);
        assert_eq!(config.healthcheck.threshold_secs(), 60);
        assert_eq!(config.http.port, DEFAULT_HTTP_PORT);
        assert!(!config.history.enabled);
        assert!(config.automation.is_empty());
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_threshold_profile_reads_threshold() {
        let config = AppConfig::from_toml(
            r#"
            [healthcheck]
            auth_required = false
            threshold = 120
            "#,
        )
        .unwrap();
        assert!(!config.healthcheck.auth_required);
        assert_eq!(config.healthcheck.threshold_secs(), 120);
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let err = AppConfig::from_toml("[healthcheck]\nthreshold = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let err = AppConfig::from_toml("[healthcheck]\nthreshold = -5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_interval_profile_derives_threshold() {
        let config = AppConfig::from_toml("[healthcheck]\nprofile = \"interval\"\n").unwrap();
        assert_eq!(
            config.healthcheck.threshold_secs(),
            KEEPALIVE_INTERVAL_SECS * THRESHOLD_MULTIPLIER
        );
    }

    #[test]
    fn test_interval_profile_rejects_threshold() {
        let err = AppConfig::from_toml(
            "[healthcheck]\nprofile = \"interval\"\nthreshold = 30\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = AppConfig::from_toml(
            r#"
            unrelated = "value"

            [healthcheck]
            threshold = 45
            colour = "green"

            [some_other_integration]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.healthcheck.threshold_secs(), 45);
    }

    #[test]
    fn test_automation_list_parses() {
        let config = AppConfig::from_toml(
            r#"
            [[automation]]
            id = "tick"
            trigger = { platform = "time_pattern", seconds = 5 }
            action = { type = "fire_event", event_type = "keepalive_probe_event" }
            "#,
        )
        .unwrap();
        assert_eq!(config.automation.len(), 1);
        assert!(config.automation[0].fires(EVENT_NAME));
        assert!(!config.automation[0].fires("other_event"));
    }

    #[test]
    fn test_duplicate_automation_ids_are_rejected() {
        let err = AppConfig::from_toml(
            r#"
            [[automation]]
            id = "tick"
            trigger = { platform = "time_pattern", seconds = 5 }
            action = { type = "fire_event", event_type = "a" }

            [[automation]]
            id = "tick"
            trigger = { platform = "time_pattern", seconds = 5 }
            action = { type = "fire_event", event_type = "b" }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_keepalive_automation_fires_every_interval() {
        let automation = AutomationConfig::keepalive();
        assert_eq!(automation.id, KEEPALIVE_AUTOMATION_ID);
        assert!(automation.fires(EVENT_NAME));
        let TriggerConfig::TimePattern { seconds } = automation.trigger;
        assert_eq!(seconds.get(), KEEPALIVE_INTERVAL_SECS);
    }

    #[test]
    fn test_entity_filter_matches_entity_and_domain() {
        let filter = EntityFilterConfig {
            domains: vec!["sensor".to_string()],
            entities: vec!["keepalive_probe.last_seen".to_string()],
        };
        assert!(filter.matches("sensor.temperature"));
        assert!(filter.matches("keepalive_probe.last_seen"));
        assert!(!filter.matches("light.kitchen"));
        assert!(!EntityFilterConfig::default().matches("sensor.temperature"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AppConfig::load("/nonexistent/keepalive-probe.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
