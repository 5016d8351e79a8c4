//! Conversation state machine
//!
//! [`ConversationStore`] is the single mutation authority for messages,
//! streaming status, error overlay, connection status and session
//! bookkeeping. Readers get borrowed views or a serializable
//! [`ConversationSnapshot`]; observers subscribe to [`StoreEvent`]s.
//!
//! Per exchange the status moves `idle -> connecting -> streaming ->
//! complete -> idle`, with `error` reachable from connecting or streaming
//! and left again only through [`ConversationStore::clear_error`] or
//! [`ConversationStore::retry_last_message`]. At most one message is
//! streaming at any time.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::classifier::ErrorContext;
use crate::conversation::types::{
    ConnectionStatus, ConversationSnapshot, Message, Sender, Session, StreamState,
    StreamingStatus,
};
use crate::error::AgentChatError;

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 256;

/// Change notifications emitted after each successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A message was appended to the conversation
    MessageAdded(Message),
    /// A fragment was appended to a streaming message
    MessageAppended {
        /// Message that grew
        id: String,
        /// Text that was appended
        fragment: String,
    },
    /// A message was finalized
    MessageCompleted(Message),
    /// A message was rolled back
    MessageRemoved(String),
    /// The streaming overlay changed
    StatusChanged(StreamingStatus),
    /// The error overlay was set or cleared
    ErrorChanged(Option<ErrorContext>),
    /// Connection health changed
    ConnectionChanged(ConnectionStatus),
    /// Session bookkeeping changed
    SessionChanged(Session),
    /// The conversation was emptied
    Cleared,
}

/// Session-lifetime conversation state.
///
/// # Examples
///
/// ```
/// use agentchat::conversation::ConversationStore;
///
/// let mut store = ConversationStore::new("session-1", 4000);
/// store.add_user_message("  hello   there ").unwrap();
/// let reply = store.add_agent_message("", true).unwrap();
/// assert!(store.append_to_message(&reply.id, "Hi"));
/// store.complete_message(&reply.id);
///
/// assert_eq!(store.messages()[0].content, "hello there");
/// assert_eq!(store.messages()[1].content, "Hi");
/// assert!(!store.is_streaming());
/// ```
#[derive(Debug)]
pub struct ConversationStore {
    messages: Vec<Message>,
    status: StreamingStatus,
    error: Option<ErrorContext>,
    connection: ConnectionStatus,
    session: Session,
    streaming_id: Option<String>,
    max_message_length: usize,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    /// Create an empty store for `session_id`.
    ///
    /// User messages longer than `max_message_length` characters are cut.
    pub fn new(session_id: impl Into<String>, max_message_length: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            messages: Vec::new(),
            status: StreamingStatus::default(),
            error: None,
            connection: ConnectionStatus::default(),
            session: Session::new(session_id),
            streaming_id: None,
            max_message_length,
            events,
        }
    }

    /// Receive every future [`StoreEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Messages in chronological order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up one message
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Current streaming overlay
    pub fn status(&self) -> &StreamingStatus {
        &self.status
    }

    /// Current error, if any
    pub fn error(&self) -> Option<&ErrorContext> {
        self.error.as_ref()
    }

    /// Connection health
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    /// Session bookkeeping
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Id of the message currently streaming
    pub fn streaming_message_id(&self) -> Option<&str> {
        self.streaming_id.as_deref()
    }

    /// Whether a message is currently streaming
    pub fn is_streaming(&self) -> bool {
        self.streaming_id.is_some()
    }

    /// Owned copy of the whole state.
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            status: self.status.clone(),
            error: self.error.clone(),
            connection: self.connection.clone(),
            session: self.session.clone(),
        }
    }

    /// Trim, collapse whitespace runs and cap the length of outbound text.
    ///
    /// Returns `None` when nothing is left.
    pub fn sanitize(&self, text: &str) -> Option<String> {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let capped: String = collapsed.chars().take(self.max_message_length).collect();
        let capped = capped.trim_end();
        if capped.is_empty() {
            None
        } else {
            Some(capped.to_string())
        }
    }

    /// Append a finished user message.
    ///
    /// Returns `None` and leaves the conversation untouched when the text is
    /// empty after sanitizing.
    pub fn add_user_message(&mut self, text: &str) -> Option<Message> {
        let content = self.sanitize(text)?;
        let message = Message::user(content);
        self.messages.push(message.clone());
        self.emit(StoreEvent::MessageAdded(message.clone()));
        self.touch(true);
        Some(message)
    }

    /// Append an agent message.
    ///
    /// With `streaming` set the message becomes the current streaming
    /// message and the status moves to streaming.
    ///
    /// # Errors
    ///
    /// Returns [`AgentChatError::ExchangeInProgress`] when `streaming` is
    /// requested while another message is still streaming.
    pub fn add_agent_message(
        &mut self,
        initial: &str,
        streaming: bool,
    ) -> Result<Message, AgentChatError> {
        if streaming {
            if let Some(current) = &self.streaming_id {
                return Err(AgentChatError::ExchangeInProgress(current.clone()));
            }
        }

        let message = Message::agent(initial, streaming);
        self.messages.push(message.clone());
        self.emit(StoreEvent::MessageAdded(message.clone()));

        if streaming {
            self.streaming_id = Some(message.id.clone());
            self.set_status(StreamingStatus {
                state: StreamState::Streaming,
                message_id: Some(message.id.clone()),
                progress: 0,
                error: None,
            });
        }

        self.touch(true);
        Ok(message)
    }

    /// Append `fragment` to a streaming message.
    ///
    /// Returns false, changing nothing, when the id is unknown or the
    /// message is already complete.
    pub fn append_to_message(&mut self, id: &str, fragment: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            tracing::debug!("Ignoring fragment for unknown message {}", id);
            return false;
        };
        if !message.is_streaming {
            tracing::debug!("Ignoring fragment for finalized message {}", id);
            return false;
        }

        message.content.push_str(fragment);
        self.emit(StoreEvent::MessageAppended {
            id: id.to_string(),
            fragment: fragment.to_string(),
        });
        self.touch(false);
        true
    }

    /// Finalize a message.
    ///
    /// Completing the current streaming message moves the status through
    /// complete back to idle. Completing an already final message changes
    /// nothing. Returns false when the id is unknown.
    pub fn complete_message(&mut self, id: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if message.is_complete && !message.is_streaming {
            return true;
        }

        message.is_streaming = false;
        message.is_complete = true;
        let completed = message.clone();
        self.emit(StoreEvent::MessageCompleted(completed));

        if self.streaming_id.as_deref() == Some(id) {
            self.streaming_id = None;
            self.set_status(StreamingStatus {
                state: StreamState::Complete,
                message_id: Some(id.to_string()),
                progress: 100,
                error: None,
            });
            self.set_status(StreamingStatus::default());
        }

        self.touch(true);
        true
    }

    /// Delete a message; used to roll back an empty placeholder.
    pub fn remove_message(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        let removed = self.messages.remove(index);
        if self.streaming_id.as_deref() == Some(id) {
            self.streaming_id = None;
        }
        self.emit(StoreEvent::MessageRemoved(removed.id.clone()));
        self.touch(true);
        Some(removed)
    }

    /// Mark the start of an exchange.
    pub fn set_connecting(&mut self) {
        self.set_status(StreamingStatus {
            state: StreamState::Connecting,
            message_id: None,
            progress: 0,
            error: None,
        });
    }

    /// Set the error overlay.
    ///
    /// Any placeholder message is left in place; rolling it back is up to
    /// the caller.
    pub fn set_error(&mut self, error: ErrorContext) {
        let message_id = self
            .streaming_id
            .clone()
            .or_else(|| self.status.message_id.clone());
        self.error = Some(error.clone());
        self.emit(StoreEvent::ErrorChanged(Some(error.clone())));
        self.set_status(StreamingStatus {
            state: StreamState::Error,
            message_id,
            progress: self.status.progress,
            error: Some(error),
        });
    }

    /// Dismiss the error overlay.
    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.emit(StoreEvent::ErrorChanged(None));
        }
        if self.status.state == StreamState::Error {
            self.set_status(StreamingStatus::default());
        }
    }

    /// Text of the most recent user message, with the error cleared.
    ///
    /// The conversation itself is not changed.
    pub fn retry_last_message(&mut self) -> Option<String> {
        let text = self
            .messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .map(|m| m.content.clone())?;
        self.clear_error();
        Some(text)
    }

    /// Finalize the streaming message with whatever it holds so far.
    ///
    /// Returns the id of the message that was stopped.
    pub fn stop_streaming(&mut self) -> Option<String> {
        let id = self.streaming_id.clone()?;
        self.complete_message(&id);
        Some(id)
    }

    /// Record a successful connection.
    pub fn record_connect_success(&mut self, latency: Option<Duration>) {
        self.connection.is_connected = true;
        self.connection.last_connected = Some(Utc::now());
        self.connection.connection_attempts = 0;
        if latency.is_some() {
            self.connection.latency = latency;
        }
        self.emit(StoreEvent::ConnectionChanged(self.connection.clone()));
    }

    /// Record a failed connection attempt.
    pub fn record_connect_failure(&mut self) {
        self.connection.is_connected = false;
        self.connection.connection_attempts += 1;
        self.emit(StoreEvent::ConnectionChanged(self.connection.clone()));
    }

    /// Drop the conversation and begin a new session.
    pub fn start_new_session(&mut self, session_id: impl Into<String>) {
        self.reset();
        self.session = Session::new(session_id);
        self.emit(StoreEvent::SessionChanged(self.session.clone()));
    }

    /// End the session: disconnect and clear the conversation.
    pub fn end_session(&mut self) {
        self.reset();
        self.connection.is_connected = false;
        self.emit(StoreEvent::ConnectionChanged(self.connection.clone()));
        self.session.is_active = false;
        self.session.last_activity = Utc::now();
        self.emit(StoreEvent::SessionChanged(self.session.clone()));
    }

    /// Conversation rendered as plain text, one block per message.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                format!(
                    "[{}] {}: {}",
                    m.timestamp.format("%H:%M:%S"),
                    m.sender,
                    m.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.streaming_id = None;
        self.error = None;
        self.status = StreamingStatus::default();
        self.session.message_count = 0;
        self.emit(StoreEvent::Cleared);
    }

    fn set_status(&mut self, status: StreamingStatus) {
        self.status = status;
        self.emit(StoreEvent::StatusChanged(self.status.clone()));
    }

    fn touch(&mut self, notify: bool) {
        self.session.last_activity = Utc::now();
        self.session.message_count = self.messages.len();
        if notify {
            self.emit(StoreEvent::SessionChanged(self.session.clone()));
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
