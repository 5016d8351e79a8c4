//! Error types for AgentChat
//!
//! This module defines the crate-level error type, using `thiserror` for
//! ergonomic error handling. Channel failures have their own enum in
//! [`crate::channel::ChannelError`] so the classifier can read stable
//! diagnostic codes from them.

use thiserror::Error;

/// Main error type for AgentChat operations
///
/// This enum covers configuration loading, input validation, conversation
/// state violations, and the I/O and serialization failures bubbling up from
/// the ambient stack.
#[derive(Error, Debug)]
pub enum AgentChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any channel call was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Channel-level failure wrapped with context
    #[error("Channel error: {0}")]
    Channel(String),

    /// A second exchange was started while one is still streaming
    #[error("An exchange is already streaming (message {0})")]
    ExchangeInProgress(String),

    /// The session has been ended and must be restarted first
    #[error("No active session")]
    NoActiveSession,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Line editor errors from the interactive front end
    #[error("Readline error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

/// Result type alias for AgentChat operations
///
/// Uses `anyhow::Error` so callers get rich context and easy propagation;
/// typed errors are recovered with `downcast_ref` where it matters.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = AgentChatError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_validation_error_display() {
        let error = AgentChatError::Validation("message is empty".to_string());
        assert_eq!(error.to_string(), "Validation error: message is empty");
    }

    #[test]
    fn test_exchange_in_progress_display() {
        let error = AgentChatError::ExchangeInProgress("msg-1".to_string());
        assert!(error.to_string().contains("msg-1"));
    }

    #[test]
    fn test_no_active_session_display() {
        assert_eq!(AgentChatError::NoActiveSession.to_string(), "No active session");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AgentChatError = io_error.into();
        assert!(matches!(error, AgentChatError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: AgentChatError = json_error.into();
        assert!(matches!(error, AgentChatError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: AgentChatError = yaml_error.into();
        assert!(matches!(error, AgentChatError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AgentChatError>();
    }
}
