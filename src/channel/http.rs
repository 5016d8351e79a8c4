//! HTTP channel to the hosted agent runtime
//!
//! Every exchange is one POST of `{"prompt": ...}` to the configured
//! endpoint. The runtime may reply with:
//!
//! - `text/event-stream` -- read incrementally as a [`ByteStream`]
//! - any other successful content type -- read fully into one buffered
//!   payload and fed through the same decode pipeline
//! - a non-success status -- reported as [`ChannelError::Status`]
//!
//! Session, target and region travel as headers so the body stays a plain
//! prompt object.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;

use crate::channel::{ByteStream, Channel, ChannelError, ChannelResponse, ExchangeRequest};
use crate::config::RuntimeConfig;

/// Header carrying the conversation session id.
pub const SESSION_HEADER: &str = "x-agentchat-session-id";
/// Header carrying the opaque target identifier.
pub const TARGET_HEADER: &str = "x-agentchat-target";
/// Header carrying the opaque region string.
pub const REGION_HEADER: &str = "x-agentchat-region";

/// Error bodies longer than this are truncated before being surfaced.
const MAX_ERROR_BODY: usize = 512;

/// reqwest-backed [`Channel`].
///
/// The client carries no overall request timeout: the stream controller
/// bounds the open call and each read separately so a long but healthy
/// stream is never cut off.
///
/// # Examples
///
/// ```no_run
/// use agentchat::channel::HttpChannel;
/// use agentchat::config::RuntimeConfig;
///
/// let channel = HttpChannel::new(&RuntimeConfig::default()).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpChannel {
    http_client: Arc<reqwest::Client>,
    endpoint: url::Url,
    auth_token: Option<String>,
}

impl HttpChannel {
    /// Construct a channel targeting `runtime.endpoint`.
    ///
    /// No network I/O is performed at construction time.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(runtime: &RuntimeConfig) -> crate::error::Result<Self> {
        let endpoint = url::Url::parse(&runtime.endpoint)?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("agentchat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client: Arc::new(http_client),
            endpoint,
            auth_token: runtime.auth_token.clone(),
        })
    }

    /// Endpoint every exchange is posted to
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Channel for HttpChannel {
    async fn open(&self, request: &ExchangeRequest) -> Result<ChannelResponse, ChannelError> {
        let mut req = self
            .http_client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream, application/json")
            .header(SESSION_HEADER, &request.session_id)
            .header(TARGET_HEADER, &request.target)
            .header(REGION_HEADER, &request.region)
            .json(&json!({ "prompt": request.prompt }));

        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            session_id = %request.session_id,
            "Opening HTTP exchange"
        );

        let response = req.send().await.map_err(ChannelError::from)?;
        let status = response.status();

        if !status.is_success() {
            let mut body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("Failed to read error body for status {}: {}", status, e);
                    String::new()
                }
            };
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            tracing::warn!("Runtime returned error {}: {}", status, body);
            return Err(ChannelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            let stream: ByteStream = Box::pin(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(|e| ChannelError::Read(e.to_string()))),
            );
            Ok(ChannelResponse::Stream(stream))
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| ChannelError::Read(e.to_string()))?;
            Ok(ChannelResponse::Buffered(body))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
