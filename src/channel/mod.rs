//! Channel abstraction and implementations
//!
//! A channel opens one request/response exchange with the remote agent and
//! hands back either an incrementally readable byte stream or one fully
//! buffered text payload. Concrete implementations live in submodules:
//!
//! - [`http::HttpChannel`] -- reqwest-based POST to the invocation endpoint.
//! - [`fake::FakeChannel`] -- in-process scripted channel used in tests.
//!
//! The channel never interprets the payload; framing and text extraction
//! belong to [`crate::stream`].

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fake;
pub mod http;

pub use fake::{FakeChannel, ScriptedResponse};
pub use http::HttpChannel;

/// Raw fragments read from an open exchange.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChannelError>> + Send>>;

/// Everything a channel needs to open one exchange.
///
/// `target` and `region` are pass-through configuration values; the core
/// never parses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    /// Outbound message text
    pub prompt: String,
    /// Conversation session identifier
    pub session_id: String,
    /// Opaque identifier of the hosted agent
    pub target: String,
    /// Opaque region/locale string
    pub region: String,
}

/// The two response shapes a channel can produce.
pub enum ChannelResponse {
    /// Incrementally readable stream of raw fragments
    Stream(ByteStream),
    /// Single fully-buffered text payload
    Buffered(String),
}

impl std::fmt::Debug for ChannelResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelResponse::Stream(_) => f.write_str("ChannelResponse::Stream(..)"),
            ChannelResponse::Buffered(body) => {
                write!(f, "ChannelResponse::Buffered({} bytes)", body.len())
            }
        }
    }
}

/// Failures reported by a channel.
///
/// Each variant maps to a stable diagnostic [`code`](ChannelError::code)
/// consumed by [`crate::classifier::classify_error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The exchange could not be opened
    #[error("connection failed: {0}")]
    Connect(String),

    /// Opening the exchange or reading a fragment took too long
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Reading the next fragment failed mid-stream
    #[error("read failed: {0}")]
    Read(String),

    /// The runtime answered with a non-success status
    #[error("runtime returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Credentials are missing or were rejected before sending
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// The runtime reported an error inside the stream
    #[error("runtime stream error: {0}")]
    Remote(String),

    /// The stream violated framing expectations
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl ChannelError {
    /// Stable diagnostic code for this failure.
    ///
    /// Codes follow the naming the hosted runtime uses for its exceptions
    /// so classification works the same for locally detected failures.
    pub fn code(&self) -> String {
        match self {
            ChannelError::Connect(_) => "ConnectionError".to_string(),
            ChannelError::Timeout(_) => "TimeoutError".to_string(),
            ChannelError::Read(_) => "NetworkReadError".to_string(),
            ChannelError::Status { status: 401, .. } => "UnauthorizedException".to_string(),
            ChannelError::Status { status: 403, .. } => "AccessDeniedException".to_string(),
            ChannelError::Status { status: 408, .. } => "RequestTimeoutException".to_string(),
            ChannelError::Status { status: 429, .. } => "ThrottlingException".to_string(),
            ChannelError::Status { status, .. } if *status >= 500 => {
                "ServiceUnavailableException".to_string()
            }
            ChannelError::Status { status, .. } => format!("HttpStatus{}", status),
            ChannelError::Credentials(_) => "CredentialsProviderError".to_string(),
            ChannelError::Remote(_) => "ModelStreamErrorException".to_string(),
            ChannelError::Protocol(_) => "EventStreamProtocolError".to_string(),
        }
    }

    /// HTTP status attached to this failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ChannelError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        ChannelError::from_reqwest_ref(&err)
    }
}

impl ChannelError {
    /// Map a borrowed reqwest failure onto a channel failure.
    pub fn from_reqwest_ref(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ChannelError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            ChannelError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            ChannelError::Read(err.to_string())
        } else if let Some(status) = err.status() {
            ChannelError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ChannelError::Connect(err.to_string())
        }
    }
}

/// Abstraction over the transport to the remote agent.
///
/// Implementations must release every resource tied to an exchange when the
/// returned [`ChannelResponse`] is dropped; handles are never reused across
/// exchanges.
#[async_trait::async_trait]
pub trait Channel: Send + Sync + std::fmt::Debug {
    /// Open one exchange for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError`] if the exchange cannot be opened.
    async fn open(&self, request: &ExchangeRequest) -> Result<ChannelResponse, ChannelError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
