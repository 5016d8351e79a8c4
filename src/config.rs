//! Configuration management for AgentChat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! Runtime values (target, region, session id) are opaque strings handed to
//! the channel untouched.

use crate::error::{AgentChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for AgentChat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote agent runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Stream timeouts and buffering limits
    #[serde(default)]
    pub stream: StreamConfig,
    /// Automatic retry behavior for retryable failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Chat input handling
    #[serde(default)]
    pub chat: ChatConfig,
    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote agent runtime configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Invocation endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Opaque identifier of the hosted agent to invoke
    #[serde(default)]
    pub target: String,

    /// Opaque region/locale string forwarded with every request
    #[serde(default = "default_region")]
    pub region: String,

    /// Fixed session id; a fresh one is generated per session when unset
    #[serde(default)]
    pub session_id: Option<String>,

    /// Optional bearer token attached to every request
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:8080/invocations".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            target: String::new(),
            region: default_region(),
            session_id: None,
            auth_token: None,
        }
    }
}

// Hand-written so the token never shows up in debug logs.
impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("endpoint", &self.endpoint)
            .field("target", &self.target)
            .field("region", &self.region)
            .field("session_id", &self.session_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Stream timeout and buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Upper bound for opening an exchange (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Upper bound for waiting on each raw fragment (seconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Largest carry-over the chunk decoder may hold before giving up
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_buffer_bytes() -> usize {
    1024 * 1024
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

impl StreamConfig {
    /// Timeout applied to the channel-open call
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Timeout applied to each fragment read
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

/// Retry configuration for network and api failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per exchange, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for any single backoff delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomize delays to avoid synchronized retries
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

/// Chat input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum characters kept from a user message after sanitizing
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

fn default_max_message_length() -> usize {
    4000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Optional file receiving a copy of every log line
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "agentchat=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AgentChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AgentChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(endpoint) = std::env::var("AGENTCHAT_ENDPOINT") {
            self.runtime.endpoint = endpoint;
        }

        if let Ok(target) = std::env::var("AGENTCHAT_TARGET") {
            self.runtime.target = target;
        }

        if let Ok(region) = std::env::var("AGENTCHAT_REGION") {
            self.runtime.region = region;
        }

        if let Ok(session_id) = std::env::var("AGENTCHAT_SESSION_ID") {
            self.runtime.session_id = Some(session_id);
        }

        if let Ok(token) = std::env::var("AGENTCHAT_AUTH_TOKEN") {
            self.runtime.auth_token = Some(token);
        }

        if let Ok(attempts) = std::env::var("AGENTCHAT_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.retry.max_attempts = n,
                Err(_) => tracing::warn!("Ignoring invalid AGENTCHAT_MAX_ATTEMPTS: {}", attempts),
            }
        }

        if let Ok(level) = std::env::var("AGENTCHAT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(endpoint) = &cli.endpoint {
            self.runtime.endpoint = endpoint.clone();
        }

        if let Some(session_id) = &cli.session_id {
            self.runtime.session_id = Some(session_id.clone());
        }

        if cli.verbose {
            self.logging.level = "agentchat=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range or malformed
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.runtime.endpoint).map_err(|e| {
            AgentChatError::Config(format!(
                "runtime.endpoint is not a valid URL ({}): {}",
                self.runtime.endpoint, e
            ))
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AgentChatError::Config(format!(
                "runtime.endpoint must use http or https, got {}",
                endpoint.scheme()
            ))
            .into());
        }

        if let Some(session_id) = &self.runtime.session_id {
            if session_id.trim().is_empty() {
                return Err(AgentChatError::Config(
                    "runtime.session_id cannot be blank when set".to_string(),
                )
                .into());
            }
        }

        if self.stream.connect_timeout_seconds == 0 {
            return Err(AgentChatError::Config(
                "stream.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stream.read_timeout_seconds == 0 {
            return Err(AgentChatError::Config(
                "stream.read_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.stream.max_buffer_bytes == 0 {
            return Err(AgentChatError::Config(
                "stream.max_buffer_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.retry.max_attempts == 0 {
            return Err(AgentChatError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.retry.max_attempts > 10 {
            return Err(AgentChatError::Config(
                "retry.max_attempts must be less than or equal to 10".to_string(),
            )
            .into());
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AgentChatError::Config(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            )
            .into());
        }

        if self.chat.max_message_length == 0 {
            return Err(AgentChatError::Config(
                "chat.max_message_length must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cli_with(args: &[&str]) -> crate::cli::Cli {
        use clap::Parser;
        let mut argv = vec!["agentchat"];
        argv.extend_from_slice(args);
        argv.push("chat");
        crate::cli::Cli::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.runtime.region, "us-east-1");
        assert_eq!(config.stream.connect_timeout_seconds, 30);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.chat.max_message_length, 4000);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_endpoint() {
        let mut config = Config::default();
        config.runtime.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        config.runtime.endpoint = "ftp://example.com/agent".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeouts() {
        let mut config = Config::default();
        config.stream.read_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_retry_bounds() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_blank_session_id() {
        let mut config = Config::default();
        config.runtime.session_id = Some("   ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
runtime:
  endpoint: "https://agents.example.com/invocations"
  target: "support-agent"
  region: "eu-west-1"
stream:
  read_timeout_seconds: 15
retry:
  max_attempts: 5
  jitter: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.runtime.target, "support-agent");
        assert_eq!(config.runtime.region, "eu-west-1");
        assert_eq!(config.stream.read_timeout_seconds, 15);
        assert_eq!(config.stream.connect_timeout_seconds, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.retry.jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = crate::test_utils::temp_dir();
        let path = crate::test_utils::create_test_file(
            &dir,
            "config.yaml",
            "runtime:\n  target: \"file-target\"\nchat:\n  max_message_length: 200\n",
        );
        let cli = cli_with(&[]);
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.runtime.target, "file-target");
        assert_eq!(config.chat.max_message_length, 200);
    }

    #[test]
    #[serial]
    fn test_load_invalid_yaml_fails() {
        let dir = crate::test_utils::temp_dir();
        let path = crate::test_utils::create_test_file(&dir, "config.yaml", "runtime: [unclosed");
        let cli = cli_with(&[]);
        assert!(Config::load(path.to_str().unwrap(), &cli).is_err());
    }

    #[test]
    fn test_runtime_debug_redacts_token() {
        let runtime = RuntimeConfig {
            auth_token: Some("secret-token".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", runtime);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = cli_with(&[]);
        let config = Config::load("/nonexistent/agentchat.yaml", &cli).unwrap();
        assert_eq!(config.retry.base_delay_ms, 500);
    }

    #[test]
    #[serial]
    fn test_env_and_cli_overrides() {
        std::env::set_var("AGENTCHAT_TARGET", "env-target");
        std::env::set_var("AGENTCHAT_MAX_ATTEMPTS", "4");
        let cli = cli_with(&["--endpoint", "https://cli.example.com/run", "--verbose"]);
        let config = Config::load("/nonexistent/agentchat.yaml", &cli).unwrap();
        std::env::remove_var("AGENTCHAT_TARGET");
        std::env::remove_var("AGENTCHAT_MAX_ATTEMPTS");

        assert_eq!(config.runtime.target, "env-target");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.runtime.endpoint, "https://cli.example.com/run");
        assert_eq!(config.logging.level, "agentchat=debug");
    }
}
