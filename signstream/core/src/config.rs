//! TOML Configuration File Support
//!
//! Configuration for the signstream service, loaded from
//! `~/.config/signstream/signstream.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied with [`ConfigOverrides`])
//! 2. Environment variables (`SIGNSTREAM_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8000"
//! stream_base_url = "ws://localhost:8000/avatar/stream"
//!
//! [animation]
//! fps = 30
//! width = 400
//! height = 600
//!
//! [stream]
//! idle_timeout_secs = 30
//! cache_max_age_secs = 3600
//! cleanup_interval_secs = 300
//!
//! [limits]
//! max_text_length = 1000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::{DEFAULT_FPS, DEFAULT_STREAM_BASE_URL};
use crate::render::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::stream::StreamConfig;

/// Default listen address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default maximum request text length in characters
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 1000;

/// Highest accepted playback rate
pub const MAX_FPS: u32 = 120;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address the HTTP server listens on
    pub bind_address: Option<String>,

    /// Base URL stream ids are appended to
    pub stream_base_url: Option<String>,
}

/// Animation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationToml {
    /// Playback rate
    pub fps: Option<u32>,

    /// Canvas width in pixels
    pub width: Option<u32>,

    /// Canvas height in pixels
    pub height: Option<u32>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Seconds of client silence before a keepalive ping
    pub idle_timeout_secs: Option<u64>,

    /// Seconds a cached animation is kept
    pub cache_max_age_secs: Option<u64>,

    /// Seconds between cache expiry sweeps
    pub cleanup_interval_secs: Option<u64>,
}

/// Limits section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsToml {
    /// Maximum request text length in characters
    pub max_text_length: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Animation configuration section
    pub animation: AnimationToml,

    /// Stream configuration section
    pub stream: StreamToml,

    /// Limits configuration section
    pub limits: LimitsToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved service configuration
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on
    pub bind_address: SocketAddr,

    /// Base URL stream ids are appended to
    pub stream_base_url: String,

    /// Playback rate
    pub fps: u32,

    /// Canvas width in pixels
    pub width: u32,

    /// Canvas height in pixels
    pub height: u32,

    /// Stream manager timings
    pub stream: StreamConfig,

    /// Maximum request text length in characters
    pub max_text_length: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    pub(crate) source: ConfigSource,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            stream_base_url: DEFAULT_STREAM_BASE_URL.to_string(),
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            stream: StreamConfig::default(),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ServiceConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Short stream timings for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            stream: StreamConfig::for_testing(),
            ..Self::default()
        }
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(ConfigError::ValidationError(format!(
                "animation.fps must be between 1 and {MAX_FPS}, got {}",
                self.fps
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "animation resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        for (name, value) in [
            ("stream.idle_timeout_secs", self.stream.idle_timeout),
            ("stream.cache_max_age_secs", self.stream.cache_max_age),
            ("stream.cleanup_interval_secs", self.stream.cleanup_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!("{name} must be non-zero")));
            }
        }
        if self.max_text_length == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_text_length must be non-zero".to_string(),
            ));
        }
        if self.stream_base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.stream_base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/signstream/signstream.toml` or
/// `~/.config/signstream/signstream.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("signstream").join("signstream.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resulting values are out of range. A missing config file is not an error.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path plus the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the resulting values are out of range.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ServiceConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServiceConfig, ConfigError> {
    let mut config = ServiceConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ServiceToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ServiceConfig, toml: &ServiceToml) -> Result<(), ConfigError> {
    // Server settings
    if let Some(ref addr) = toml.server.bind_address {
        config.bind_address = addr.parse().map_err(|_| {
            ConfigError::ValidationError(format!("server.bind_address is not a socket address: {addr}"))
        })?;
    }
    if let Some(ref url) = toml.server.stream_base_url {
        config.stream_base_url = url.clone();
    }

    // Animation settings
    if let Some(fps) = toml.animation.fps {
        config.fps = fps;
    }
    if let Some(width) = toml.animation.width {
        config.width = width;
    }
    if let Some(height) = toml.animation.height {
        config.height = height;
    }

    // Stream settings
    if let Some(secs) = toml.stream.idle_timeout_secs {
        config.stream.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.stream.cache_max_age_secs {
        config.stream.cache_max_age = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.stream.cleanup_interval_secs {
        config.stream.cleanup_interval = Duration::from_secs(secs);
    }

    // Limits
    if let Some(length) = toml.limits.max_text_length {
        config.max_text_length = length;
    }

    Ok(())
}

/// Parse one environment value, warning about garbage
fn env_value<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ServiceConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(addr) = env_value::<SocketAddr>(&env, "SIGNSTREAM_BIND") {
        config.bind_address = addr;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("SIGNSTREAM_STREAM_BASE_URL") {
        config.stream_base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(fps) = env_value::<u32>(&env, "SIGNSTREAM_FPS") {
        config.fps = fps;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_value::<u64>(&env, "SIGNSTREAM_IDLE_TIMEOUT_SECS") {
        config.stream.idle_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_value::<u64>(&env, "SIGNSTREAM_CACHE_MAX_AGE_SECS") {
        config.stream.cache_max_age = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env_value::<u64>(&env, "SIGNSTREAM_CLEANUP_INTERVAL_SECS") {
        config.stream.cleanup_interval = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(length) = env_value::<usize>(&env, "SIGNSTREAM_MAX_TEXT_LENGTH") {
        config.max_text_length = length;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub bind_address: Option<SocketAddr>,

    /// Stream base URL override
    pub stream_base_url: Option<String>,

    /// Playback rate override
    pub fps: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Set stream base URL override
    #[must_use]
    pub fn with_stream_base_url(mut self, url: String) -> Self {
        self.stream_base_url = Some(url);
        self
    }

    /// Set playback rate override
    #[must_use]
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if an override is out of range.
    pub fn apply(&self, config: &mut ServiceConfig) -> Result<(), ConfigError> {
        if self.bind_address.is_some() || self.stream_base_url.is_some() || self.fps.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(addr) = self.bind_address {
            config.bind_address = addr;
        }
        if let Some(ref url) = self.stream_base_url {
            config.stream_base_url = url.clone();
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();

        assert_eq!(config.bind_address.to_string(), DEFAULT_BIND_ADDRESS);
        assert_eq!(config.stream_base_url, "ws://localhost:8000/avatar/stream");
        assert_eq!(config.fps, 30);
        assert_eq!((config.width, config.height), (400, 600));
        assert_eq!(config.stream.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.stream.cache_max_age, Duration::from_secs(3600));
        assert_eq!(config.stream.cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.max_text_length, 1000);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("signstream/signstream.toml"));
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_config_with_env(Some(PathBuf::from("/nonexistent/signstream.toml")), no_env).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[server]
bind_address = "127.0.0.1:9000"
stream_base_url = "wss://avatar.example/stream"

[animation]
fps = 24
width = 320
height = 480

[stream]
idle_timeout_secs = 10
cache_max_age_secs = 600
cleanup_interval_secs = 60

[limits]
max_text_length = 500
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.stream_base_url, "wss://avatar.example/stream");
        assert_eq!(config.fps, 24);
        assert_eq!((config.width, config.height), (320, 480));
        assert_eq!(config.stream.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.stream.cache_max_age, Duration::from_secs(600));
        assert_eq!(config.stream.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.max_text_length, 500);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = write_toml("[animation]\nfps = 60\n");
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.fps, 60);
        assert_eq!(config.width, 400);
        assert_eq!(config.stream.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let file = write_toml("[animation\nfps = ");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let file = write_toml("[server]\nbind_address = \"not-an-address\"\n");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        for content in [
            "[animation]\nfps = 0\n",
            "[animation]\nfps = 500\n",
            "[animation]\nwidth = 0\n",
            "[stream]\nidle_timeout_secs = 0\n",
            "[limits]\nmax_text_length = 0\n",
        ] {
            let file = write_toml(content);
            let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "{content:?} was accepted"
            );
        }
    }

    // =========================================================================
    // Environment Override Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[animation]\nfps = 24\n[limits]\nmax_text_length = 500\n");
        let env: HashMap<&str, &str> = HashMap::from([
            ("SIGNSTREAM_FPS", "48"),
            ("SIGNSTREAM_BIND", "127.0.0.1:8123"),
            ("SIGNSTREAM_IDLE_TIMEOUT_SECS", "5"),
        ]);

        let config = load_config_with_env(Some(file.path().to_path_buf()), |key| {
            env.get(key).map(|v| (*v).to_string())
        })
        .unwrap();

        assert_eq!(config.fps, 48);
        assert_eq!(config.bind_address.port(), 8123);
        assert_eq!(config.stream.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_text_length, 500);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let config = load_config_with_env(None, |key| {
            (key == "SIGNSTREAM_FPS").then(|| "fast".to_string())
        })
        .unwrap();

        assert_eq!(config.fps, 30);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // CLI Override Tests
    // =========================================================================

    #[test]
    fn test_cli_overrides() {
        let mut config = ServiceConfig::default();
        let overrides = ConfigOverrides::new()
            .with_bind_address("127.0.0.1:7000".parse().unwrap())
            .with_stream_base_url("ws://example/stream".to_string());

        overrides.apply(&mut config).unwrap();

        assert_eq!(config.bind_address.port(), 7000);
        assert_eq!(config.stream_base_url, "ws://example/stream");
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ServiceConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_invalid_cli_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = ConfigOverrides::new().with_fps(0).apply(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
