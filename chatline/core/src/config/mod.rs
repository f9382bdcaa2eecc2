//! TOML Configuration File Support
//!
//! Centralized configuration loading for chatline, supporting a TOML file at
//! `~/.config/chatline/chatline.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:11434"
//! request_timeout_secs = 30
//! connect_timeout_secs = 5
//!
//! [streaming]
//! batch_size = 5
//! flush_interval_ms = 32
//! stall_timeout_secs = 30
//! watchdog_interval_ms = 1000
//! read_timeout_secs = 120
//! filter_think_tags = true
//!
//! [gate]
//! max_concurrent_requests = 3
//! short_ttl_secs = 30
//! long_ttl_secs = 300
//! max_cache_entries = 50
//!
//! [chat]
//! default_model = "llama3.2"
//! data_dir = "/home/me/.local/share/chatline"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{base_url_from_parts, DEFAULT_BASE_URL};
use crate::gate::GateConfig;
use crate::streaming::StreamConfig;

/// Directory name under the platform config and data dirs
pub const APP_DIR: &str = "chatline";

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

/// Tracks where the configuration came from (the highest layer that set
/// anything)
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

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Inference server base URL
    pub base_url: Option<String>,
    /// Bound on request/response calls, in seconds
    pub request_timeout_secs: Option<u64>,
    /// TCP connect timeout, in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// `[streaming]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Fragments per UI batch
    pub batch_size: Option<usize>,
    /// Maximum delay before pending fragments are flushed, in milliseconds
    pub flush_interval_ms: Option<u64>,
    /// Silence that force-completes a started stream, in seconds
    pub stall_timeout_secs: Option<u64>,
    /// Watchdog polling period, in milliseconds
    pub watchdog_interval_ms: Option<u64>,
    /// Bound on waiting for the first byte, in seconds
    pub read_timeout_secs: Option<u64>,
    /// Hide `<think>` tag fragments
    pub filter_think_tags: Option<bool>,
}

/// `[gate]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateToml {
    /// Requests in flight at once
    pub max_concurrent_requests: Option<usize>,
    /// Cache TTL for volatile endpoints, in seconds
    pub short_ttl_secs: Option<u64>,
    /// Cache TTL for near-static endpoints, in seconds
    pub long_ttl_secs: Option<u64>,
    /// Cache size cap
    pub max_cache_entries: Option<usize>,
}

/// `[chat]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Model used when none was picked before
    pub default_model: Option<String>,
    /// Where conversations and app state are stored
    pub data_dir: Option<PathBuf>,
}

/// Root of the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatlineToml {
    /// Server settings
    pub server: ServerToml,
    /// Streaming pipeline settings
    pub streaming: StreamingToml,
    /// Request gate settings
    pub gate: GateToml,
    /// Chat settings
    pub chat: ChatToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully-resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Inference server base URL
    pub base_url: String,
    /// Bound on request/response calls
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Streaming pipeline tuning
    pub stream: StreamConfig,
    /// Request gate tuning
    pub gate: GateConfig,
    /// Model used when none was picked before
    pub default_model: Option<String>,
    /// Data directory override
    pub data_dir: Option<PathBuf>,
    /// Highest layer that set a value
    source: ConfigSource,
    /// File the configuration was read from
    config_file_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            stream: StreamConfig::default(),
            gate: GateConfig::default(),
            default_model: None,
            data_dir: None,
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl ClientConfig {
    /// Set the server URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the streaming tuning
    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Set the gate tuning
    #[must_use]
    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Set the data directory
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Where the configuration came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// The file the configuration was read from, if any
    #[must_use]
    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Data directory: the configured one, else `$XDG_DATA_HOME/chatline`
    #[must_use]
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join(APP_DIR)))
    }

    /// Check the values make sense together
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return invalid(format!(
                "server.base_url must start with http:// or https:// (got {:?})",
                self.base_url
            ));
        }
        if self.stream.throttle.batch_size == 0 {
            return invalid("streaming.batch_size must be at least 1".into());
        }
        if self.stream.throttle.flush_interval.is_zero() {
            return invalid("streaming.flush_interval_ms must be positive".into());
        }
        if self.stream.watchdog_interval.is_zero() {
            return invalid("streaming.watchdog_interval_ms must be positive".into());
        }
        if self.stream.watchdog_interval > self.stream.stall_timeout {
            return invalid(
                "streaming.watchdog_interval_ms must not exceed streaming.stall_timeout_secs"
                    .into(),
            );
        }
        if self.gate.max_concurrent == 0 {
            return invalid("gate.max_concurrent_requests must be at least 1".into());
        }
        if self.gate.max_cache_entries == 0 {
            return invalid("gate.max_cache_entries must be at least 1".into());
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chatline/chatline.toml` or
/// `~/.config/chatline/chatline.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR).join("chatline.toml"))
}

/// Load configuration from the default file and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the result
/// fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// See [`load_config_from_path`].
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChatlineToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
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
fn apply_toml_config(config: &mut ClientConfig, toml: &ChatlineToml) {
    // Server
    if let Some(ref url) = toml.server.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.server.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    // Streaming
    if let Some(size) = toml.streaming.batch_size {
        config.stream.throttle.batch_size = size;
    }
    if let Some(ms) = toml.streaming.flush_interval_ms {
        config.stream.throttle.flush_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.streaming.stall_timeout_secs {
        config.stream.stall_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = toml.streaming.watchdog_interval_ms {
        config.stream.watchdog_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.streaming.read_timeout_secs {
        config.stream.read_timeout = Duration::from_secs(secs);
    }
    if let Some(filter) = toml.streaming.filter_think_tags {
        config.stream.parser.filter_think_tags = filter;
    }

    // Gate
    if let Some(n) = toml.gate.max_concurrent_requests {
        config.gate.max_concurrent = n;
    }
    if let Some(secs) = toml.gate.short_ttl_secs {
        config.gate.short_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.gate.long_ttl_secs {
        config.gate.long_ttl = Duration::from_secs(secs);
    }
    if let Some(n) = toml.gate.max_cache_entries {
        config.gate.max_cache_entries = n;
    }

    // Chat
    if toml.chat.default_model.is_some() {
        config.default_model = toml.chat.default_model.clone();
    }
    if toml.chat.data_dir.is_some() {
        config.data_dir = toml.chat.data_dir.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = |key: &str| env(key).and_then(|v| v.trim().parse::<u64>().ok());

    // Server address: a full URL wins over host/port
    if let Some(url) = env("OLLAMA_API_URL").filter(|u| !u.trim().is_empty()) {
        config.base_url = url.trim().trim_end_matches('/').to_string();
        config.source = ConfigSource::Env;
    } else if let Some(host) = env("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
        let port = env("OLLAMA_PORT")
            .and_then(|p| p.trim().parse::<u16>().ok())
            .unwrap_or(11434);
        config.base_url = base_url_from_parts(&host, port);
        config.source = ConfigSource::Env;
    }

    if let Some(secs) = parsed("CHATLINE_REQUEST_TIMEOUT") {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("CHATLINE_STALL_TIMEOUT") {
        config.stream.stall_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(n) = parsed("CHATLINE_MAX_CONCURRENT") {
        config.gate.max_concurrent = usize::try_from(n).unwrap_or(usize::MAX);
        config.source = ConfigSource::Env;
    }
    if let Some(value) = env("CHATLINE_FILTER_THINK") {
        config.stream.parser.filter_think_tags =
            value != "0" && !value.eq_ignore_ascii_case("false");
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("CHATLINE_MODEL").filter(|m| !m.trim().is_empty()) {
        config.default_model = Some(model);
        config.source = ConfigSource::Env;
    }
    if let Some(dir) = env("CHATLINE_DATA_DIR").filter(|d| !d.trim().is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
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
    /// Server URL override
    pub base_url: Option<String>,
    /// Default model override
    pub default_model: Option<String>,
    /// Data directory override
    pub data_dir: Option<PathBuf>,
    /// Concurrency limit override
    pub max_concurrent: Option<usize>,
    /// Stall timeout override (seconds)
    pub stall_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set default model override
    #[must_use]
    pub fn with_default_model(mut self, model: String) -> Self {
        self.default_model = Some(model);
        self
    }

    /// Set data directory override
    #[must_use]
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.data_dir = Some(dir);
        self
    }

    /// Set concurrency limit override
    #[must_use]
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = Some(n);
        self
    }

    /// Set stall timeout override
    #[must_use]
    pub fn with_stall_timeout_secs(mut self, secs: u64) -> Self {
        self.stall_timeout_secs = Some(secs);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the overridden config is
    /// invalid.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if self.base_url.is_some()
            || self.default_model.is_some()
            || self.data_dir.is_some()
            || self.max_concurrent.is_some()
            || self.stall_timeout_secs.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ref model) = self.default_model {
            config.default_model = Some(model.clone());
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(n) = self.max_concurrent {
            config.gate.max_concurrent = n;
        }
        if let Some(secs) = self.stall_timeout_secs {
            config.stream.stall_timeout = Duration::from_secs(secs);
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

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.stream.throttle.batch_size, 5);
        assert_eq!(config.stream.stall_timeout, Duration::from_secs(30));
        assert_eq!(config.gate.max_concurrent, 3);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("chatline/chatline.toml"));
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_config_with_env(Some(PathBuf::from("/nonexistent/chatline.toml")), no_env)
                .unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path().is_none());
    }

    // =========================================================================
    // TOML
    // =========================================================================

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[server]
base_url = "http://gpu-box:11434/"
request_timeout_secs = 10

[streaming]
batch_size = 8
flush_interval_ms = 50
stall_timeout_secs = 20
filter_think_tags = false

[gate]
max_concurrent_requests = 2
long_ttl_secs = 600

[chat]
default_model = "qwen2.5"
"#,
        );
        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.base_url, "http://gpu-box:11434");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.stream.throttle.batch_size, 8);
        assert_eq!(config.stream.throttle.flush_interval, Duration::from_millis(50));
        assert_eq!(config.stream.stall_timeout, Duration::from_secs(20));
        assert!(!config.stream.parser.filter_think_tags);
        assert_eq!(config.gate.max_concurrent, 2);
        assert_eq!(config.gate.long_ttl, Duration::from_secs(600));
        assert_eq!(config.gate.short_ttl, Duration::from_secs(30));
        assert_eq!(config.default_model.as_deref(), Some("qwen2.5"));
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path(), Some(file.path()));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_toml("[streaming\nbatch_size = ");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_toml("[gate]\nmax_concurrent_requests = 0\n");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let file = write_toml("[server]\nbase_url = \"localhost:11434\"\n");
        let err = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    // =========================================================================
    // Environment
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[chat]\ndefault_model = \"from-file\"\n");
        let env = env_of(&[
            ("OLLAMA_API_URL", "http://10.1.1.1:8080/"),
            ("CHATLINE_MODEL", "from-env"),
            ("CHATLINE_MAX_CONCURRENT", "5"),
            ("CHATLINE_FILTER_THINK", "false"),
        ]);
        let config = load_config_with_env(Some(file.path().to_path_buf()), env).unwrap();

        assert_eq!(config.base_url, "http://10.1.1.1:8080");
        assert_eq!(config.default_model.as_deref(), Some("from-env"));
        assert_eq!(config.gate.max_concurrent, 5);
        assert!(!config.stream.parser.filter_think_tags);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_env_host_and_port() {
        let env = env_of(&[("OLLAMA_HOST", "gpu-box"), ("OLLAMA_PORT", "9999")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.base_url, "http://gpu-box:9999");
    }

    #[test]
    fn test_unparseable_env_is_ignored() {
        let env = env_of(&[("CHATLINE_STALL_TIMEOUT", "soon")]);
        let config = load_config_with_env(None, env).unwrap();
        assert_eq!(config.stream.stall_timeout, Duration::from_secs(30));
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // CLI Overrides
    // =========================================================================

    #[test]
    fn test_cli_overrides_win() {
        let env = env_of(&[("CHATLINE_MODEL", "from-env")]);
        let mut config = load_config_with_env(None, env).unwrap();

        ConfigOverrides::new()
            .with_default_model("from-cli".to_string())
            .with_base_url("http://remote:11434/".to_string())
            .with_stall_timeout_secs(5)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.default_model.as_deref(), Some("from-cli"));
        assert_eq!(config.base_url, "http://remote:11434");
        assert_eq!(config.stream.stall_timeout, Duration::from_secs(5));
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_override_validation() {
        let mut config = ClientConfig::default();
        let err = ConfigOverrides::new()
            .with_max_concurrent(0)
            .apply(&mut config)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_data_dir_resolution() {
        let config = ClientConfig::default().with_data_dir("/tmp/chatline-test");
        assert_eq!(
            config.resolved_data_dir(),
            Some(PathBuf::from("/tmp/chatline-test"))
        );
    }
}
