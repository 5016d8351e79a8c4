//! Error classification
//!
//! Maps any failure surfaced during an exchange into an [`ErrorContext`]
//! drawn from a closed set of [`ErrorKind`]s. Classification reads the
//! failure's diagnostic code, never its prose, whenever a typed error is
//! available:
//!
//! 1. credential/authorization markers => [`ErrorKind::Authentication`]
//! 2. connectivity/timeout markers => [`ErrorKind::Network`]
//! 3. stream protocol markers => [`ErrorKind::Streaming`]
//! 4. any other structured channel error => [`ErrorKind::Api`]
//! 5. input/shape validation failures => [`ErrorKind::Validation`]
//! 6. everything else => [`ErrorKind::Unknown`]
//!
//! Only network and api failures are retryable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::channel::ChannelError;
use crate::error::AgentChatError;
use crate::stream::BufferOverflow;

const AUTH_MARKERS: &[&str] = &[
    "auth",
    "credential",
    "unauthorized",
    "forbidden",
    "accessdenied",
    "access denied",
    "signature",
    "401",
    "403",
];

const NETWORK_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connect",
    "dns",
    "unreachable",
    "reset",
];

const STREAMING_MARKERS: &[&str] = &["stream", "decode", "chunk"];

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Connectivity or timeout failure
    Network,
    /// Missing, expired or rejected credentials
    Authentication,
    /// The runtime rejected or failed the request
    Api,
    /// The event stream itself was broken
    Streaming,
    /// Input rejected before sending
    Validation,
    /// Anything not recognized
    Unknown,
}

impl ErrorKind {
    /// Whether failures of this kind may be retried automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Api)
    }

    /// Lowercase name used in logs and serialized contexts.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Api => "api",
            ErrorKind::Streaming => "streaming",
            ErrorKind::Validation => "validation",
            ErrorKind::Unknown => "unknown",
        }
    }

    fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Could not reach the agent. Check your connection and try again.",
            ErrorKind::Authentication => {
                "The agent rejected the request credentials. Sign in again and retry."
            }
            ErrorKind::Api => "The agent service returned an error.",
            ErrorKind::Streaming => "The response stream was interrupted.",
            ErrorKind::Validation => "The message could not be sent.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Failure category
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Opaque diagnostic code
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Auxiliary diagnostic data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// When the failure was classified
    pub timestamp: DateTime<Utc>,
    /// Whether automatic retry is allowed
    pub retryable: bool,
}

impl ErrorContext {
    /// Build a context of `kind`; `retryable` follows the kind.
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Utc::now(),
            retryable: kind.is_retryable(),
        }
    }

    /// Validation failure detected before any channel call.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, "ValidationError", message)
    }

    /// Attach auxiliary diagnostic data.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Classify a channel failure.
pub fn classify_channel_error(err: &ChannelError) -> ErrorContext {
    let code = err.code();
    let kind = kind_from_code(&code).unwrap_or(ErrorKind::Api);

    let mut details = json!({ "cause": err.to_string() });
    if let Some(status) = err.status() {
        details["status"] = json!(status);
    }

    ErrorContext::new(kind, code, kind.user_message()).with_details(details)
}

/// Classify an arbitrary failure.
///
/// Typed errors found anywhere in the chain are classified by their code.
/// Untyped errors fall back to scanning the message with the same marker
/// priority, ending in [`ErrorKind::Unknown`].
pub fn classify_error(err: &anyhow::Error) -> ErrorContext {
    for cause in err.chain() {
        if let Some(channel_err) = cause.downcast_ref::<ChannelError>() {
            return classify_channel_error(channel_err);
        }
        if let Some(reqwest_err) = cause.downcast_ref::<reqwest::Error>() {
            return classify_channel_error(&ChannelError::from_reqwest_ref(reqwest_err));
        }
        if let Some(overflow) = cause.downcast_ref::<BufferOverflow>() {
            return ErrorContext::new(
                ErrorKind::Streaming,
                "StreamBufferOverflow",
                ErrorKind::Streaming.user_message(),
            )
            .with_details(json!({ "cause": overflow.to_string() }));
        }
        if let Some(app_err) = cause.downcast_ref::<AgentChatError>() {
            if let Some(ctx) = classify_app_error(app_err) {
                return ctx;
            }
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ErrorContext::validation(cause.to_string()).with_details(json!({
                "cause": cause.to_string()
            }));
        }
    }

    let message = err.to_string();
    let kind = kind_from_code(&message).unwrap_or(ErrorKind::Unknown);
    let code = match kind {
        ErrorKind::Unknown => "UnknownError",
        ErrorKind::Network => "NetworkError",
        ErrorKind::Authentication => "AuthenticationError",
        ErrorKind::Streaming => "StreamingError",
        ErrorKind::Api => "ApiError",
        ErrorKind::Validation => "ValidationError",
    };
    ErrorContext::new(kind, code, kind.user_message()).with_details(json!({ "cause": message }))
}

fn classify_app_error(err: &AgentChatError) -> Option<ErrorContext> {
    match err {
        AgentChatError::Validation(msg) => Some(ErrorContext::validation(msg.clone())),
        AgentChatError::ExchangeInProgress(id) => Some(
            ErrorContext::new(
                ErrorKind::Validation,
                "ExchangeInProgress",
                "Wait for the current response to finish before sending another message.",
            )
            .with_details(json!({ "message_id": id })),
        ),
        AgentChatError::NoActiveSession => Some(ErrorContext::new(
            ErrorKind::Validation,
            "NoActiveSession",
            "Start a new session before sending messages.",
        )),
        AgentChatError::Serialization(e) => Some(ErrorContext::validation(e.to_string())),
        AgentChatError::Http(e) => Some(classify_channel_error(&ChannelError::from_reqwest_ref(e))),
        _ => None,
    }
}

/// First kind whose markers appear in `code`, in priority order.
fn kind_from_code(code: &str) -> Option<ErrorKind> {
    let lowered = code.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lowered.contains(m));

    if has_any(AUTH_MARKERS) {
        Some(ErrorKind::Authentication)
    } else if has_any(NETWORK_MARKERS) {
        Some(ErrorKind::Network)
    } else if has_any(STREAMING_MARKERS) {
        Some(ErrorKind::Streaming)
    } else {
        None
    }
}
