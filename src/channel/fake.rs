//! In-process scripted channel for unit and integration tests
//!
//! [`FakeChannel`] replays a queue of [`ScriptedResponse`]s, one per opened
//! exchange, and records every [`ExchangeRequest`] it receives so tests can
//! assert on what was (or was not) sent.
//!
//! # Example
//!
//! ```
//! use agentchat::channel::{Channel, ChannelResponse, ExchangeRequest, FakeChannel, ScriptedResponse};
//!
//! # tokio_test::block_on(async {
//! let channel = FakeChannel::new();
//! channel.push(ScriptedResponse::Buffered("data: \"hi\"\n\n".to_string()));
//!
//! let request = ExchangeRequest {
//!     prompt: "hello".to_string(),
//!     session_id: "s-1".to_string(),
//!     target: "agent".to_string(),
//!     region: "local".to_string(),
//! };
//! let response = channel.open(&request).await.unwrap();
//! assert!(matches!(response, ChannelResponse::Buffered(_)));
//! assert_eq!(channel.requests().len(), 1);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use crate::channel::{ByteStream, Channel, ChannelError, ChannelResponse, ExchangeRequest};

/// One scripted outcome for a single `open` call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Stream the given items in order, then end
    Stream(Vec<Result<Bytes, ChannelError>>),
    /// Answer with one fully-buffered payload
    Buffered(String),
    /// Fail the open call itself
    OpenError(ChannelError),
    /// Stream the given fragments, then never yield again
    Stall(Vec<Bytes>),
}

impl ScriptedResponse {
    /// Stream each string as one raw fragment.
    pub fn fragments<S: AsRef<str>>(parts: &[S]) -> Self {
        ScriptedResponse::Stream(
            parts
                .iter()
                .map(|p| Ok(Bytes::copy_from_slice(p.as_ref().as_bytes())))
                .collect(),
        )
    }

    /// Stream `body` split into raw fragments of `chunk_size` bytes.
    ///
    /// Splits land on arbitrary byte offsets, including inside multi-byte
    /// characters.
    pub fn chunked(body: &str, chunk_size: usize) -> Self {
        let size = chunk_size.max(1);
        ScriptedResponse::Stream(
            body.as_bytes()
                .chunks(size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect(),
        )
    }

    /// Stream the given fragments, then fail with `error`.
    pub fn fail_after<S: AsRef<str>>(parts: &[S], error: ChannelError) -> Self {
        let mut items: Vec<Result<Bytes, ChannelError>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_ref().as_bytes())))
            .collect();
        items.push(Err(error));
        ScriptedResponse::Stream(items)
    }

    fn into_response(self) -> Result<ChannelResponse, ChannelError> {
        match self {
            ScriptedResponse::Stream(items) => {
                let stream: ByteStream = Box::pin(stream::iter(items));
                Ok(ChannelResponse::Stream(stream))
            }
            ScriptedResponse::Buffered(body) => Ok(ChannelResponse::Buffered(body)),
            ScriptedResponse::OpenError(err) => Err(err),
            ScriptedResponse::Stall(parts) => {
                let stream: ByteStream = Box::pin(
                    stream::iter(parts.into_iter().map(Ok)).chain(stream::pending()),
                );
                Ok(ChannelResponse::Stream(stream))
            }
        }
    }
}

/// Scripted [`Channel`] used in tests.
///
/// Cloning shares the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct FakeChannel {
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<ExchangeRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeChannel {
    /// Create a channel with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel pre-loaded with `responses`, replayed in order.
    pub fn with_script(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        let channel = Self::new();
        lock(&channel.script).extend(responses);
        channel
    }

    /// Queue one more response.
    pub fn push(&self, response: ScriptedResponse) {
        lock(&self.script).push_back(response);
    }

    /// Every request opened so far, oldest first.
    pub fn requests(&self) -> Vec<ExchangeRequest> {
        lock(&self.requests).clone()
    }

    /// Number of `open` calls made so far.
    pub fn open_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait::async_trait]
impl Channel for FakeChannel {
    async fn open(&self, request: &ExchangeRequest) -> Result<ChannelResponse, ChannelError> {
        lock(&self.requests).push(request.clone());
        let next = lock(&self.script).pop_front();
        match next {
            Some(response) => response.into_response(),
            None => Err(ChannelError::Connect(
                "fake channel has no scripted response".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
