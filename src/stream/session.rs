//! Stream session controller
//!
//! Runs one request/response exchange end to end: opens the channel, feeds
//! raw fragments through [`ChunkDecoder`] and [`EventTextExtractor`], and
//! reports through a [`StreamHandler`]. Per exchange the handler sees zero
//! or more `on_fragment` calls in extraction order followed by exactly one of
//! `on_complete` or `on_error`, unless the exchange is cancelled, in which
//! case neither terminal callback fires.
//!
//! The open call and every read are bounded by the configured timeouts and
//! raced against a [`CancellationToken`]. The channel response is owned by
//! the exchange and dropped as soon as it settles.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{Channel, ChannelError, ChannelResponse, ExchangeRequest};
use crate::classifier::{classify_channel_error, classify_error, ErrorContext};
use crate::config::{Config, StreamConfig};
use crate::stream::decoder::{BufferOverflow, ChunkDecoder};
use crate::stream::extractor::EventTextExtractor;
use crate::stream::metrics::{ExchangeMetrics, ExchangeOutcome};

/// Receives the results of one exchange.
pub trait StreamHandler: Send {
    /// One extracted text fragment, in order.
    fn on_fragment(&mut self, fragment: &str);

    /// The stream ended normally after all fragments were delivered.
    fn on_complete(&mut self);

    /// The exchange failed; no further callbacks follow.
    fn on_error(&mut self, error: ErrorContext);
}

/// Push-style view of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One extracted text fragment
    Fragment(String),
    /// Normal end of stream
    Complete,
    /// Classified failure
    Error(ErrorContext),
}

/// Result of one settled exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSummary {
    /// True when the exchange completed normally
    pub success: bool,
    /// Identifier generated for the exchange's reply
    pub message_id: String,
    /// Session the exchange belonged to
    pub session_id: String,
    /// Wall time from start to settlement
    pub elapsed: Duration,
    /// Number of fragments delivered
    pub fragments: u64,
    /// True when the caller stopped the exchange
    pub cancelled: bool,
    /// Classified failure, when the exchange failed
    pub error: Option<ErrorContext>,
}

/// How the decode loop ended.
enum Settled {
    Completed,
    Failed(ErrorContext),
    Cancelled,
}

/// Drives exchanges against one channel.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use agentchat::channel::{FakeChannel, ScriptedResponse};
/// use agentchat::config::StreamConfig;
/// use agentchat::stream::{StreamEvent, StreamSession};
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() {
/// let channel = FakeChannel::with_script(vec![ScriptedResponse::fragments(&[
///     "data: {'delta': {'text': 'Hi'}}\n\n",
/// ])]);
/// let session = StreamSession::new(Arc::new(channel), &StreamConfig::default(), "agent", "local");
///
/// let events: Vec<StreamEvent> = session
///     .events("hello", "session-1", CancellationToken::new())
///     .collect()
///     .await;
/// assert_eq!(events, vec![StreamEvent::Fragment("Hi".to_string()), StreamEvent::Complete]);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamSession {
    channel: Arc<dyn Channel>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_buffer_bytes: usize,
    target: String,
    region: String,
}

impl StreamSession {
    /// Create a controller for `channel`.
    ///
    /// `target` and `region` are passed through to every request untouched.
    pub fn new(
        channel: Arc<dyn Channel>,
        stream: &StreamConfig,
        target: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            connect_timeout: stream.connect_timeout(),
            read_timeout: stream.read_timeout(),
            max_buffer_bytes: stream.max_buffer_bytes,
            target: target.into(),
            region: region.into(),
        }
    }

    /// Create a controller from the application configuration.
    pub fn from_config(channel: Arc<dyn Channel>, config: &Config) -> Self {
        Self::new(
            channel,
            &config.stream,
            config.runtime.target.clone(),
            config.runtime.region.clone(),
        )
    }

    /// Override the open and read timeouts.
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Name of the underlying channel
    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Run one exchange and report through `handler`.
    ///
    /// Returns once the exchange has settled. An empty or whitespace-only
    /// `text` fails validation without touching the channel.
    pub async fn run(
        &self,
        text: &str,
        session_id: &str,
        handler: &mut dyn StreamHandler,
        cancel: &CancellationToken,
    ) -> ExchangeSummary {
        let message_id = Uuid::new_v4().to_string();
        let mut metrics = ExchangeMetrics::start(self.channel.name());
        let mut extractor = EventTextExtractor::new();

        let prompt = text.trim();
        let settled = if prompt.is_empty() {
            metrics.finish(ExchangeOutcome::Rejected);
            Settled::Failed(ErrorContext::validation("Message cannot be empty"))
        } else {
            let request = ExchangeRequest {
                prompt: prompt.to_string(),
                session_id: session_id.to_string(),
                target: self.target.clone(),
                region: self.region.clone(),
            };
            tracing::debug!(
                message_id = %message_id,
                session_id = %session_id,
                channel = self.channel.name(),
                "Starting exchange"
            );
            self.drive(&request, handler, &mut extractor, &mut metrics, cancel)
                .await
        };

        let mut summary = ExchangeSummary {
            success: false,
            message_id,
            session_id: session_id.to_string(),
            elapsed: metrics.elapsed(),
            fragments: metrics.fragments(),
            cancelled: false,
            error: None,
        };

        match settled {
            Settled::Completed => {
                handler.on_complete();
                metrics.finish_with(ExchangeOutcome::Complete, extractor.malformed_count());
                summary.success = true;
                tracing::debug!(
                    message_id = %summary.message_id,
                    fragments = summary.fragments,
                    "Exchange complete"
                );
            }
            Settled::Failed(error) => {
                tracing::warn!(
                    message_id = %summary.message_id,
                    kind = %error.kind,
                    code = %error.code,
                    "Exchange failed"
                );
                handler.on_error(error.clone());
                metrics.finish_with(ExchangeOutcome::Error, extractor.malformed_count());
                summary.error = Some(error);
            }
            Settled::Cancelled => {
                tracing::info!("Exchange {} stopped by caller", summary.message_id);
                metrics.finish_with(ExchangeOutcome::Cancelled, extractor.malformed_count());
                summary.cancelled = true;
            }
        }

        summary
    }

    /// Run one exchange on a background task and return its events.
    ///
    /// The stream yields fragments followed by exactly one `Complete` or
    /// `Error`, or simply ends if `cancel` fires. Dropping the stream stops
    /// the exchange.
    pub fn events(
        &self,
        text: impl Into<String>,
        session_id: impl Into<String>,
        cancel: CancellationToken,
    ) -> UnboundedReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.clone();
        let text = text.into();
        let session_id = session_id.into();
        let cancel = cancel.child_token();

        tokio::spawn(async move {
            let mut forwarder = EventForwarder {
                tx,
                cancel: cancel.clone(),
            };
            session
                .run(&text, &session_id, &mut forwarder, &cancel)
                .await;
        });

        UnboundedReceiverStream::new(rx)
    }

    async fn drive(
        &self,
        request: &ExchangeRequest,
        handler: &mut dyn StreamHandler,
        extractor: &mut EventTextExtractor,
        metrics: &mut ExchangeMetrics,
        cancel: &CancellationToken,
    ) -> Settled {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Settled::Cancelled,
            opened = tokio::time::timeout(self.connect_timeout, self.channel.open(request)) => opened,
        };

        let response = match opened {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Settled::Failed(classify_channel_error(&err)),
            Err(_) => {
                return Settled::Failed(classify_channel_error(&ChannelError::Timeout(
                    self.connect_timeout,
                )))
            }
        };

        let mut decoder = ChunkDecoder::with_max_buffer_bytes(self.max_buffer_bytes);

        match response {
            ChannelResponse::Buffered(body) => {
                tracing::debug!("Decoding buffered payload of {} bytes", body.len());
                let records = match decoder.push_str(&body) {
                    Ok(records) => records,
                    Err(overflow) => return overflow_error(overflow),
                };
                if !deliver(&records, handler, extractor, metrics, cancel) {
                    return Settled::Cancelled;
                }
            }
            ChannelResponse::Stream(mut stream) => loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Settled::Cancelled,
                    next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
                };

                let bytes = match next {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(Some(Err(err))) => return Settled::Failed(classify_channel_error(&err)),
                    Ok(None) => break,
                    Err(_) => {
                        return Settled::Failed(classify_channel_error(&ChannelError::Timeout(
                            self.read_timeout,
                        )))
                    }
                };

                let records = match decoder.push(&bytes) {
                    Ok(records) => records,
                    Err(overflow) => return overflow_error(overflow),
                };
                if !deliver(&records, handler, extractor, metrics, cancel) {
                    return Settled::Cancelled;
                }
            },
        }

        if let Some(last) = decoder.finish() {
            if !deliver(&[last], handler, extractor, metrics, cancel) {
                return Settled::Cancelled;
            }
        }

        Settled::Completed
    }
}

/// Extract and hand over fragments; false once cancellation was requested.
fn deliver(
    records: &[String],
    handler: &mut dyn StreamHandler,
    extractor: &mut EventTextExtractor,
    metrics: &mut ExchangeMetrics,
    cancel: &CancellationToken,
) -> bool {
    for record in records {
        if cancel.is_cancelled() {
            return false;
        }
        if let Some(fragment) = extractor.extract(record) {
            handler.on_fragment(&fragment);
            metrics.record_fragment();
        }
    }
    !cancel.is_cancelled()
}

fn overflow_error(overflow: BufferOverflow) -> Settled {
    Settled::Failed(classify_error(&anyhow::Error::new(overflow)))
}

/// Forwards callbacks into an unbounded channel.
struct EventForwarder {
    tx: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
}

impl EventForwarder {
    fn send(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            // Receiver dropped: nobody is listening any more.
            self.cancel.cancel();
        }
    }
}

impl StreamHandler for EventForwarder {
    fn on_fragment(&mut self, fragment: &str) {
        self.send(StreamEvent::Fragment(fragment.to_string()));
    }

    fn on_complete(&mut self) {
        self.send(StreamEvent::Complete);
    }

    fn on_error(&mut self, error: ErrorContext) {
        self.send(StreamEvent::Error(error));
    }
}

/// Handler that records every callback, for tests and simple callers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingHandler {
    /// Every callback in the order received
    pub events: Vec<StreamEvent>,
}

impl RecordingHandler {
    /// Fragments received so far
    pub fn fragments(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Fragment(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `on_complete` calls
    pub fn completions(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Complete))
            .count()
    }

    /// Every error received
    pub fn errors(&self) -> Vec<ErrorContext> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Error(ctx) => Some(ctx.clone()),
                _ => None,
            })
            .collect()
    }
}

impl StreamHandler for RecordingHandler {
    fn on_fragment(&mut self, fragment: &str) {
        self.events.push(StreamEvent::Fragment(fragment.to_string()));
    }

    fn on_complete(&mut self) {
        self.events.push(StreamEvent::Complete);
    }

    fn on_error(&mut self, error: ErrorContext) {
        self.events.push(StreamEvent::Error(error));
    }
}
