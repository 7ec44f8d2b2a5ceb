//! Configuration loading and typed config structures for the monitor.
//!
//! The configuration lives in `delineator.yaml` (path overridable with
//! `DELINEATOR_CONFIG`). Every section is optional; a missing file yields
//! the defaults. A handful of deployment-specific values can be overridden
//! from the environment without editing the file:
//!
//! - `DELINEATOR_UPSTREAM_URL` overrides `upstream.base_url`
//! - `DELINEATOR_OBSERVER_PORT` overrides `observer.port`
//! - `DELINEATOR_LOG_LEVEL` overrides `logging.level`

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DELINEATOR_CONFIG";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "delineator.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The file parsed but a value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level monitor configuration. Mirrors `delineator.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MonitorConfig {
    /// Upstream endpoints.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Stream synchronizer tuning.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Signal presentation settings.
    #[serde(default)]
    pub signal: SignalConfig,

    /// Operator event log.
    #[serde(default)]
    pub events: EventsConfig,

    /// Observer HTTP server.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load from `path` if it exists, otherwise start from the defaults.
    /// Environment overrides apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty map.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The config path to use: `DELINEATOR_CONFIG` if set, else
    /// `delineator.yaml` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
    }

    /// Override values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override values from an arbitrary key lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DELINEATOR_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(raw) = lookup("DELINEATOR_OBSERVER_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.observer.port = port,
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "ignoring invalid DELINEATOR_OBSERVER_PORT");
                }
            }
        }
        if let Some(level) = lookup("DELINEATOR_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject values that would make the monitor misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "upstream.base_url",
                reason: String::from("must not be empty"),
            });
        }
        if self.upstream.max_event_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream.max_event_bytes",
                reason: String::from("must be positive"),
            });
        }
        if self.sync.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.backoff_base_ms",
                reason: String::from("must be positive"),
            });
        }
        if self.sync.backoff_max_exponent > 16 {
            return Err(ConfigError::Invalid {
                field: "sync.backoff_max_exponent",
                reason: format!("must be at most 16, got {}", self.sync.backoff_max_exponent),
            });
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "events.capacity",
                reason: String::from("must be positive"),
            });
        }
        Ok(())
    }
}

/// Upstream endpoints. Paths are joined onto `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamConfig {
    /// Scheme, host and port of the upstream service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Node list endpoint.
    #[serde(default = "default_nodes_path")]
    pub nodes_path: String,

    /// Incident list endpoint.
    #[serde(default = "default_incidents_path")]
    pub incidents_path: String,

    /// Command submission endpoint.
    #[serde(default = "default_commands_path")]
    pub commands_path: String,

    /// Server-sent event stream.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Timeout for snapshot and command requests, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Largest accepted stream line or event, in bytes. A stream that
    /// exceeds it is dropped and reconnected.
    #[serde(default = "default_max_event_bytes")]
    pub max_event_bytes: usize,
}

impl UpstreamConfig {
    /// Join an endpoint path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Full URL of the node list endpoint.
    pub fn nodes_url(&self) -> String {
        self.url(&self.nodes_path)
    }

    /// Full URL of the incident list endpoint.
    pub fn incidents_url(&self) -> String {
        self.url(&self.incidents_path)
    }

    /// Full URL of the command endpoint.
    pub fn commands_url(&self) -> String {
        self.url(&self.commands_path)
    }

    /// Full URL of the event stream.
    pub fn stream_url(&self) -> String {
        self.url(&self.stream_path)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            nodes_path: default_nodes_path(),
            incidents_path: default_incidents_path(),
            commands_path: default_commands_path(),
            stream_path: default_stream_path(),
            request_timeout_ms: default_request_timeout_ms(),
            max_event_bytes: default_max_event_bytes(),
        }
    }
}

/// Stream synchronizer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Reconnect delay unit: the wait is `base * 2^retry`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the retry exponent.
    #[serde(default = "default_backoff_max_exponent")]
    pub backoff_max_exponent: u32,

    /// Drop the connection after this long without any message.
    /// Zero disables the watchdog.
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_exponent: default_backoff_max_exponent(),
            idle_timeout_ms: 0,
        }
    }
}

/// Signal presentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignalConfig {
    /// Add a random offset in `[0, 1)` Hz to red blink frequencies so
    /// adjacent lights do not pulse in lockstep.
    #[serde(default = "default_true")]
    pub red_blink_jitter: bool,

    /// Seed for the jitter generator. Unset means seeded from the OS.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            red_blink_jitter: true,
            jitter_seed: None,
        }
    }
}

/// Operator event log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventsConfig {
    /// Maximum number of retained entries.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Observer HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether to serve the observer API at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,

    /// Capacity of the change notification channel.
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_observer_host(),
            port: default_observer_port(),
            change_buffer: default_change_buffer(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_base_url() -> String {
    String::from("http://127.0.0.1:8000")
}

fn default_nodes_path() -> String {
    String::from("/api/nodes")
}

fn default_incidents_path() -> String {
    String::from("/api/incidents")
}

fn default_commands_path() -> String {
    String::from("/api/commands")
}

fn default_stream_path() -> String {
    String::from("/stream")
}

const fn default_request_timeout_ms() -> u64 {
    5_000
}

const fn default_max_event_bytes() -> usize {
    1_048_576
}

const fn default_backoff_base_ms() -> u64 {
    500
}

const fn default_backoff_max_exponent() -> u32 {
    6
}

const fn default_event_capacity() -> usize {
    100
}

fn default_observer_host() -> String {
    String::from("0.0.0.0")
}

const fn default_observer_port() -> u16 {
    8080
}

const fn default_change_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.backoff_base_ms, 500);
        assert_eq!(config.sync.backoff_max_exponent, 6);
        assert_eq!(config.sync.idle_timeout_ms, 0);
        assert_eq!(config.events.capacity, 100);
        assert!(config.signal.red_blink_jitter);
        assert_eq!(config.observer.port, 8080);
        assert_eq!(config.upstream.max_event_bytes, 1_048_576);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
upstream:
  base_url: "http://gateway.local:9000/"
  stream_path: "events"
  request_timeout_ms: 2000
  max_event_bytes: 65536

sync:
  backoff_base_ms: 250
  backoff_max_exponent: 4
  idle_timeout_ms: 30000

signal:
  red_blink_jitter: false
  jitter_seed: 7

events:
  capacity: 50

observer:
  enabled: false
  port: 9100

logging:
  level: "debug"
  json: true
"#;
        let config = MonitorConfig::parse_without_env(yaml).unwrap();
        assert_eq!(
            config.upstream.stream_url(),
            "http://gateway.local:9000/events"
        );
        assert_eq!(
            config.upstream.nodes_url(),
            "http://gateway.local:9000/api/nodes"
        );
        assert_eq!(config.upstream.request_timeout_ms, 2000);
        assert_eq!(config.upstream.max_event_bytes, 65_536);
        assert_eq!(config.sync.backoff_base_ms, 250);
        assert_eq!(config.sync.idle_timeout_ms, 30_000);
        assert_eq!(config.signal.jitter_seed, Some(7));
        assert!(!config.signal.red_blink_jitter);
        assert_eq!(config.events.capacity, 50);
        assert!(!config.observer.enabled);
        assert_eq!(config.observer.host, "0.0.0.0");
        assert!(config.logging.json);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = MonitorConfig::parse_without_env("logging:\n  level: warn\n").unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.upstream, UpstreamConfig::default());
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn empty_document_is_default() {
        let config = MonitorConfig::parse_without_env("  \n").unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = MonitorConfig::parse_without_env("sync: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let result = MonitorConfig::parse_without_env("events:\n  capacity: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "events.capacity",
                ..
            })
        ));
        let result = MonitorConfig::parse_without_env("sync:\n  backoff_base_ms: 0\n");
        assert!(result.is_err());
        let result = MonitorConfig::parse_without_env("upstream:\n  max_event_bytes: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "upstream.max_event_bytes",
                ..
            })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: BTreeMap<&str, &str> = [
            ("DELINEATOR_UPSTREAM_URL", "http://10.0.0.5:8000"),
            ("DELINEATOR_OBSERVER_PORT", "9999"),
            ("DELINEATOR_LOG_LEVEL", "trace"),
        ]
        .into_iter()
        .collect();
        let mut config = MonitorConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| (*v).to_owned()));
        assert_eq!(config.upstream.base_url, "http://10.0.0.5:8000");
        assert_eq!(config.observer.port, 9999);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = MonitorConfig::default();
        config.apply_overrides_from(|key| {
            (key == "DELINEATOR_OBSERVER_PORT").then(|| String::from("not-a-port"))
        });
        assert_eq!(config.observer.port, 8080);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = MonitorConfig::from_file(Path::new("/nonexistent/delineator.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
