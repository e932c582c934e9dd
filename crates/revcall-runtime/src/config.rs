//! Engine configuration.
//!
//! Every section has serde defaults, so an empty `revcall.toml` (or none
//! at all) yields a working configuration. Durations are milliseconds.

use crate::handshake::SdkIdentity;
use crate::retry::ExponentialBackoff;
use revcall_core::{Version, VersionParseError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name searched for by [`EngineConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "revcall.toml";

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for one registered processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address of the runtime's reverse-call endpoint.
    #[serde(default = "default_address")]
    pub address: String,
    /// Address of the runtime's handshake endpoint. No handshake is
    /// performed when unset.
    #[serde(default)]
    pub handshake_address: Option<String>,
    #[serde(default)]
    pub reverse_call: ReverseCallConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Timing and concurrency of a single reverse-call connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseCallConfig {
    /// Interval the server is asked to ping at.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// The connection is considered dead after this many ping intervals
    /// without any inbound message.
    #[serde(default = "default_ping_timeout_multiplier")]
    pub ping_timeout_multiplier: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Maximum concurrently running handler invocations. Requests in the
    /// same partition are always handled one at a time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Capacity of the queue in front of the single outbound writer.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// How long in-flight handlers may run after processing stops.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

/// Identity presented during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    #[serde(default = "default_handshake_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sdk_identifier")]
    pub sdk_identifier: String,
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,
    #[serde(default = "default_contracts_version")]
    pub contracts_version: String,
}

/// Backoff between registration attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Retry forever when unset.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

// Default value functions
fn default_address() -> String { "127.0.0.1:50053".to_string() }
fn default_ping_interval_ms() -> u64 { 5_000 }
fn default_ping_timeout_multiplier() -> u32 { 3 }
fn default_connect_timeout_ms() -> u64 { 5_000 }
fn default_max_concurrency() -> usize { 1 }
fn default_outbound_buffer() -> usize { 64 }
fn default_drain_timeout_ms() -> u64 { 30_000 }
fn default_handshake_timeout_ms() -> u64 { 5_000 }
fn default_sdk_identifier() -> String { "revcall-rust".to_string() }
fn default_sdk_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_contracts_version() -> String { "1.0.0".to_string() }
fn default_initial_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            handshake_address: None,
            reverse_call: ReverseCallConfig::default(),
            handshake: HandshakeConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ReverseCallConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_multiplier: default_ping_timeout_multiplier(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            outbound_buffer: default_outbound_buffer(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_handshake_timeout_ms(),
            sdk_identifier: default_sdk_identifier(),
            sdk_version: default_sdk_version(),
            contracts_version: default_contracts_version(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: None,
        }
    }
}

impl ReverseCallConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Silence tolerated on a connected stream before giving up on it.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_interval() * self.ping_timeout_multiplier.max(1)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer.max(1)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl HandshakeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse the configured versions into the identity sent to the runtime.
    pub fn identity(&self) -> Result<SdkIdentity, VersionParseError> {
        Ok(SdkIdentity {
            sdk_identifier: self.sdk_identifier.clone(),
            sdk_version: self.sdk_version.parse::<Version>()?,
            contracts_version: self.contracts_version.parse::<Version>()?,
        })
    }
}

impl RetryConfig {
    /// The exponential backoff policy this configuration describes.
    pub fn policy(&self) -> ExponentialBackoff {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_multiplier(self.multiplier);
        match self.max_retries {
            Some(max) => policy.with_max_retries(max),
            None => policy,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from the given file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `revcall.toml` from the current or a parent directory, falling
    /// back to defaults when there is none.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::current_dir().ok().and_then(|dir| find_config_file(&dir)) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.handshake.identity()?;
        if self.reverse_call.ping_interval_ms == 0 {
            return Err(ConfigError::Invalid("ping_interval_ms must be positive".into()));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid("retry multiplier must be at least 1.0".into()));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry initial_delay_ms exceeds max_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Find `revcall.toml` in `start` or one of its parents.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{FailureHistory, RetryPolicy};

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config.address, "127.0.0.1:50053");
        assert!(config.handshake_address.is_none());
        assert_eq!(config.reverse_call, ReverseCallConfig::default());
        assert_eq!(config.reverse_call.ping_timeout(), Duration::from_secs(15));
        assert_eq!(config.retry.max_retries, None);
    }

    #[test]
    fn test_partial_sections_keep_remaining_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            address = "10.0.0.5:50053"

            [reverse_call]
            ping_interval_ms = 1000
            max_concurrency = 8

            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.address, "10.0.0.5:50053");
        assert_eq!(config.reverse_call.ping_interval(), Duration::from_secs(1));
        assert_eq!(config.reverse_call.max_concurrency(), 8);
        assert_eq!(config.reverse_call.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, Some(5));
        assert_eq!(config.retry.initial_delay_ms, 1_000);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = ReverseCallConfig {
            ping_timeout_multiplier: 0,
            max_concurrency: 0,
            outbound_buffer: 0,
            ..ReverseCallConfig::default()
        };
        assert_eq!(config.ping_timeout(), config.ping_interval());
        assert_eq!(config.max_concurrency(), 1);
        assert_eq!(config.outbound_buffer(), 1);
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let err = EngineConfig::from_toml(
            r#"
            [handshake]
            contracts_version = "one"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVersion(_)));
    }

    #[test]
    fn test_invalid_retry_is_rejected() {
        let err = EngineConfig::from_toml(
            r#"
            [retry]
            multiplier = 0.5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_retry_config_builds_policy() {
        let retry = RetryConfig {
            initial_delay_ms: 100,
            max_delay_ms: 250,
            multiplier: 2.0,
            max_retries: Some(3),
        };
        let policy = retry.policy();
        let mut history = FailureHistory::new();
        let mut delays = Vec::new();
        for _ in 0..4 {
            history.record(crate::error::AttemptError::Connect(
                revcall_core::TransportError::Closed,
            ));
            delays.push(policy.next_retry(&history));
        }
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(100)),
                Some(Duration::from_millis(200)),
                Some(Duration::from_millis(250)),
                None,
            ]
        );
    }

    #[test]
    fn test_load_and_find_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "address = \"192.168.1.2:9000\"\n",
        )
        .unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));
        let config = EngineConfig::load(&found).unwrap();
        assert_eq!(config.address, "192.168.1.2:9000");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/revcall.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig {
            handshake_address: Some("127.0.0.1:50055".to_string()),
            ..EngineConfig::default()
        };
        let text = config.to_toml().unwrap();
        let back = EngineConfig::from_toml(&text).unwrap();
        assert_eq!(back.handshake_address, config.handshake_address);
        assert_eq!(back.retry, config.retry);
    }
}
