//! Configuration management for the noise peer.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/noise-peer/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use noise_channel::{HandshakeOptions, KeyPair, ProtocolName, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address used by `listen` and `connect` when none is configured.
pub const DEFAULT_ADDR: &str = "127.0.0.1:14912";

/// Delay between outgoing demo messages, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Log level outside the tracing levels.
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    /// Protocol name the engine cannot build.
    #[error("unsupported protocol {name}: {reason}")]
    InvalidProtocol { name: String, reason: String },

    /// Handshake budget of zero.
    #[error("max_operations must be greater than 0, got {0}")]
    InvalidMaxOperations(usize),

    /// Pre-shared key that is not 32 bytes of hex.
    #[error("psk must be 32 bytes of hex: {0}")]
    InvalidPsk(String),

    /// Peer address that does not parse as a socket address.
    #[error("addr must be a socket address (host:port), got {0}")]
    InvalidAddress(String),

    /// Message interval of zero.
    #[error("interval_ms must be greater than 0, got {0}")]
    InvalidInterval(u64),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Length of a Noise pre-shared key.
const PSK_LENGTH: usize = 32;

/// Main configuration structure for the noise peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Noise protocol name components.
    pub protocol: ProtocolName,

    /// Handshake limits.
    pub handshake: HandshakeConfig,

    /// Context bound into the handshake and the channel.
    pub session: SessionSettings,

    /// Network and demo message settings.
    pub peer: PeerConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Handshake limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Maximum write/read operations per handshake attempt.
    pub max_operations: usize,
}

/// Prologue, PSK and associated data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SessionSettings {
    /// Prologue text mixed into the handshake transcript.
    pub prologue: Option<String>,

    /// Pre-shared key as 64 hex characters, for `pskN` patterns.
    pub psk: Option<String>,

    /// Associated data text bound to every encrypted message.
    pub associated_data: String,
}

/// Network and demo message settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PeerConfig {
    /// Address to listen on or connect to.
    pub addr: String,

    /// Delay between outgoing messages in milliseconds.
    pub interval_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_operations: HandshakeOptions::default().max_operations,
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("noise-peer")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - NOISE_PEER_ADDR: Override the listen/connect address
    /// - NOISE_PEER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns the `(setting, value)` pairs that were applied so they can be
    /// logged once tracing is installed.
    pub fn apply_env_overrides(&mut self) -> Vec<(&'static str, String)> {
        let mut applied = Vec::new();

        if let Ok(addr) = std::env::var("NOISE_PEER_ADDR") {
            if !addr.is_empty() {
                self.peer.addr = addr.clone();
                applied.push(("addr", addr));
            }
        }

        if let Ok(level) = std::env::var("NOISE_PEER_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level.clone();
                applied.push(("log_level", level));
            }
        }

        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        if let Err(err) = self.protocol.params() {
            return Err(ConfigError::InvalidProtocol {
                name: self.protocol.to_string(),
                reason: err.to_string(),
            });
        }

        if self.handshake.max_operations == 0 {
            return Err(ConfigError::InvalidMaxOperations(
                self.handshake.max_operations,
            ));
        }

        self.psk_bytes()?;

        if self.peer.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::InvalidAddress(self.peer.addr.clone()));
        }

        if self.peer.interval_ms == 0 {
            return Err(ConfigError::InvalidInterval(self.peer.interval_ms));
        }

        Ok(())
    }

    /// Decodes the configured pre-shared key.
    pub fn psk_bytes(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(psk) = &self.session.psk else {
            return Ok(None);
        };
        let bytes = hex::decode(psk).map_err(|e| ConfigError::InvalidPsk(e.to_string()))?;
        if bytes.len() != PSK_LENGTH {
            return Err(ConfigError::InvalidPsk(format!(
                "expected {} bytes, got {}",
                PSK_LENGTH,
                bytes.len()
            )));
        }
        Ok(Some(bytes))
    }

    /// Builds the session configuration for one handshake.
    ///
    /// A `remote_public_key` makes the local side the initiator.
    pub fn session_config(
        &self,
        key_pair: KeyPair,
        remote_public_key: Option<Vec<u8>>,
    ) -> Result<SessionConfig, ConfigError> {
        let mut session = SessionConfig::new(key_pair)
            .protocol(self.protocol.clone())
            .associated_data(self.session.associated_data.as_bytes().to_vec());

        if let Some(remote) = remote_public_key {
            session = session.initiator(remote);
        }
        if let Some(prologue) = &self.session.prologue {
            session = session.prologue(prologue.as_bytes().to_vec());
        }
        if let Some(psk) = self.psk_bytes()? {
            session = session.psk(psk);
        }

        Ok(session)
    }

    /// Handshake options derived from the configuration.
    pub fn handshake_options(&self) -> HandshakeOptions {
        HandshakeOptions::default().max_operations(self.handshake.max_operations)
    }

    /// Delay between outgoing demo messages.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.peer.interval_ms)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Writes the default configuration to `path`.
    ///
    /// An existing file is only replaced when `force` is set.
    pub fn init_file<P: AsRef<Path>>(path: P, force: bool) -> Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            anyhow::bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }

        Self::default().save(path)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
