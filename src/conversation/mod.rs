//! Conversation state
//!
//! [`types`] holds the serializable data model and [`store`] the state
//! machine that owns and mutates it.

pub mod store;
pub mod types;

pub use store::{ConversationStore, StoreEvent};
pub use types::{
    ConnectionStatus, ConversationSnapshot, Message, Sender, Session, StreamState,
    StreamingStatus,
};
