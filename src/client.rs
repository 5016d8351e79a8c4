//! Chat client
//!
//! [`ChatClient`] ties a [`ConversationStore`] to a [`StreamSession`] for
//! the lifetime of one conversation. It applies stream callbacks to the
//! store, retries retryable failures with backoff, and rolls back or
//! finalizes the reply placeholder when an exchange fails.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{Channel, HttpChannel};
use crate::classifier::{ErrorContext, ErrorKind};
use crate::config::Config;
use crate::conversation::{ConversationStore, StoreEvent};
use crate::error::{AgentChatError, Result};
use crate::retry::RetryPolicy;
use crate::stream::{ExchangeSummary, RecordingHandler, StreamHandler, StreamSession};

/// Stops the exchange currently in flight.
///
/// Cheap to clone and safe to use from another task, e.g. a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    /// Request the in-flight exchange to stop.
    ///
    /// Does nothing when no exchange is running.
    pub fn stop(&self) {
        self.lock().cancel();
    }

    /// Whether the current exchange was asked to stop
    pub fn is_stopped(&self) -> bool {
        self.lock().is_cancelled()
    }

    /// Install a fresh token for a new exchange.
    fn arm(&self) -> CancellationToken {
        let fresh = CancellationToken::new();
        *self.lock() = fresh.clone();
        fresh
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Applies stream callbacks to the reply placeholder.
struct StoreWriter<'a> {
    store: &'a mut ConversationStore,
    message_id: &'a str,
    started: Instant,
    first_fragment: Option<Duration>,
    delivered: bool,
    error: Option<ErrorContext>,
}

impl StreamHandler for StoreWriter<'_> {
    fn on_fragment(&mut self, fragment: &str) {
        if self.first_fragment.is_none() {
            self.first_fragment = Some(self.started.elapsed());
        }
        if self.store.append_to_message(self.message_id, fragment) {
            self.delivered = true;
        }
    }

    fn on_complete(&mut self) {
        self.store.complete_message(self.message_id);
    }

    fn on_error(&mut self, error: ErrorContext) {
        self.error = Some(error);
    }
}

/// One conversation with the remote agent.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use agentchat::channel::{FakeChannel, ScriptedResponse};
/// use agentchat::client::ChatClient;
/// use agentchat::config::Config;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let channel = FakeChannel::with_script(vec![ScriptedResponse::fragments(&[
///     "data: {'contentBlockDelta': {'delta': {'text': 'Hi'}}}\n\n",
/// ])]);
/// let mut client = ChatClient::new(Arc::new(channel), &Config::default());
///
/// let summary = client.send_message("hello").await?;
/// assert!(summary.success);
/// assert_eq!(client.store().messages()[1].content, "Hi");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChatClient {
    store: ConversationStore,
    session: StreamSession,
    retry: RetryPolicy,
    stop: StopHandle,
}

impl ChatClient {
    /// Create a client over `channel`.
    ///
    /// Uses the configured session id or generates a new one.
    pub fn new(channel: Arc<dyn Channel>, config: &Config) -> Self {
        let session_id = config
            .runtime
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            store: ConversationStore::new(session_id, config.chat.max_message_length),
            session: StreamSession::from_config(channel, config),
            retry: RetryPolicy::from(&config.retry),
            stop: StopHandle::default(),
        }
    }

    /// Create a client talking HTTP to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP channel cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let channel = HttpChannel::new(&config.runtime)?;
        Ok(Self::new(Arc::new(channel), config))
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the stream controller.
    pub fn with_session(mut self, session: StreamSession) -> Self {
        self.session = session;
        self
    }

    /// Read-only view of the conversation
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Receive store change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Handle that stops the exchange in flight.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Dismiss the current error.
    pub fn clear_error(&mut self) {
        self.store.clear_error();
    }

    /// Drop the conversation and start over with a new session id.
    pub fn start_new_session(&mut self) -> String {
        let session_id = Uuid::new_v4().to_string();
        tracing::info!("Starting new session {}", session_id);
        self.store.start_new_session(session_id.clone());
        session_id
    }

    /// End the session; sending requires a new session afterwards.
    pub fn end_session(&mut self) {
        tracing::info!("Ending session {}", self.store.session().id);
        self.store.end_session();
    }

    /// Send one user message and stream the reply into the conversation.
    ///
    /// Exchange failures are reported through the returned summary and the
    /// store's error overlay, not as `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentChatError::ExchangeInProgress`] while a reply is still
    /// streaming and [`AgentChatError::NoActiveSession`] after
    /// [`end_session`](Self::end_session).
    pub async fn send_message(&mut self, text: &str) -> Result<ExchangeSummary> {
        self.ensure_ready()?;

        let Some(user) = self.store.add_user_message(text) else {
            // Rejected by the controller; the channel is never opened.
            let mut rejected = RecordingHandler::default();
            let session_id = self.store.session().id.clone();
            let summary = self
                .session
                .run(text, &session_id, &mut rejected, &CancellationToken::new())
                .await;
            if let Some(error) = &summary.error {
                self.store.set_error(error.clone());
            }
            return Ok(summary);
        };

        self.exchange(&user.content).await
    }

    /// Re-run the exchange for the most recent user message.
    ///
    /// The user message is not duplicated. Returns `None` when there is
    /// nothing to retry.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send_message`](Self::send_message).
    pub async fn retry_last_message(&mut self) -> Result<Option<ExchangeSummary>> {
        self.ensure_ready()?;

        let Some(text) = self.store.retry_last_message() else {
            return Ok(None);
        };
        tracing::info!("Retrying last message");
        self.exchange(&text).await.map(Some)
    }

    fn ensure_ready(&self) -> std::result::Result<(), AgentChatError> {
        if !self.store.session().is_active {
            return Err(AgentChatError::NoActiveSession);
        }
        if let Some(id) = self.store.streaming_message_id() {
            return Err(AgentChatError::ExchangeInProgress(id.to_string()));
        }
        Ok(())
    }

    async fn exchange(&mut self, prompt: &str) -> Result<ExchangeSummary> {
        self.store.clear_error();
        self.store.set_connecting();
        let placeholder = self.store.add_agent_message("", true)?;
        let cancel = self.stop.arm();
        let session_id = self.store.session().id.clone();

        let mut attempt = 1;
        loop {
            let mut writer = StoreWriter {
                store: &mut self.store,
                message_id: &placeholder.id,
                started: Instant::now(),
                first_fragment: None,
                delivered: false,
                error: None,
            };
            let mut summary = self
                .session
                .run(prompt, &session_id, &mut writer, &cancel)
                .await;
            let StoreWriter {
                first_fragment,
                delivered,
                error,
                ..
            } = writer;
            summary.message_id = placeholder.id.clone();

            if summary.cancelled {
                self.store.stop_streaming();
                if delivered {
                    self.store.record_connect_success(first_fragment);
                }
                return Ok(summary);
            }

            if summary.success {
                self.store
                    .record_connect_success(first_fragment.or(Some(summary.elapsed)));
                return Ok(summary);
            }

            let error = error
                .or_else(|| summary.error.clone())
                .unwrap_or_else(|| {
                    ErrorContext::new(ErrorKind::Unknown, "UnknownError", "exchange failed")
                });

            if self.retry.should_retry(&error, attempt, delivered) {
                self.store.record_connect_failure();
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    code = %error.code,
                    "Exchange failed, retrying in {:?}",
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.store.stop_streaming();
                        summary.cancelled = true;
                        return Ok(summary);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                continue;
            }

            if error.kind != ErrorKind::Validation {
                self.store.record_connect_failure();
            }
            if delivered {
                self.store.complete_message(&placeholder.id);
            } else {
                self.store.remove_message(&placeholder.id);
            }
            self.store.set_error(error);
            return Ok(summary);
        }
    }
}
