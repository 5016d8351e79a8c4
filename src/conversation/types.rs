//! Conversation data model
//!
//! Plain serializable values. Everything here is handed out as a snapshot;
//! [`super::ConversationStore`] is the only place these are mutated.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::ErrorContext;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person at the keyboard
    User,
    /// The remote agent
    Agent,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => f.write_str("user"),
            Sender::Agent => f.write_str("agent"),
        }
    }
}

/// One conversational turn.
///
/// `content` only grows while `is_streaming` is true and is frozen once
/// `is_complete` flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique, immutable identifier
    pub id: String,
    /// Message text
    pub content: String,
    /// Author
    pub sender: Sender,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// True until an incrementally produced message is finalized
    pub is_streaming: bool,
    /// True once the message is final
    pub is_complete: bool,
}

impl Message {
    /// A finished user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            is_streaming: false,
            is_complete: true,
        }
    }

    /// An agent message, either still streaming or already final.
    pub fn agent(content: impl Into<String>, streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::Agent,
            timestamp: Utc::now(),
            is_streaming: streaming,
            is_complete: !streaming,
        }
    }
}

/// Phase of the in-flight exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Opening the exchange
    Connecting,
    /// Fragments are arriving
    Streaming,
    /// The exchange just finished
    Complete,
    /// The exchange failed
    Error,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Connecting => "connecting",
            StreamState::Streaming => "streaming",
            StreamState::Complete => "complete",
            StreamState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Transient overlay describing the in-flight exchange.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamingStatus {
    /// Current phase
    pub state: StreamState,
    /// Streaming message this status refers to
    pub message_id: Option<String>,
    /// Advisory progress, 0 to 100
    pub progress: u8,
    /// Present only in the error state
    pub error: Option<ErrorContext>,
}

/// One conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier sent with every exchange
    pub id: String,
    /// When the session started
    pub start_time: DateTime<Utc>,
    /// Updated on every message mutation
    pub last_activity: DateTime<Utc>,
    /// Messages currently in the conversation
    pub message_count: usize,
    /// False once the session has been ended
    pub is_active: bool,
}

impl Session {
    /// A fresh, active session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            start_time: now,
            last_activity: now,
            message_count: 0,
            is_active: true,
        }
    }
}

/// Connection health as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the last exchange reached the runtime
    pub is_connected: bool,
    /// When a connection last succeeded
    pub last_connected: Option<DateTime<Utc>>,
    /// Failed attempts since the last success
    pub connection_attempts: u32,
    /// Last measured latency, advisory
    #[serde(default, with = "latency_millis")]
    pub latency: Option<Duration>,
}

/// Serializable copy of the whole conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Messages in chronological order
    pub messages: Vec<Message>,
    /// Streaming overlay
    pub status: StreamingStatus,
    /// Current error, if any
    pub error: Option<ErrorContext>,
    /// Connection health
    pub connection: ConnectionStatus,
    /// Session bookkeeping
    pub session: Session,
}

mod latency_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
