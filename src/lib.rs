//! AgentChat - streaming chat client library for hosted AI agents
//!
//! This library turns a server-sent, partially malformed event stream into
//! incrementally rendered chat messages with ordered delivery, error
//! classification and retry.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `channel`: Transport abstraction (HTTP, scripted fake)
//! - `stream`: Chunk decoder, event text extractor and stream session controller
//! - `conversation`: Message/session data model and the conversation state machine
//! - `classifier`: Maps failures to a closed set of error kinds
//! - `retry`: Exponential backoff policy
//! - `client`: Ties conversation state to the stream controller
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use agentchat::{ChatClient, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let mut client = ChatClient::from_config(&config)?;
//!     let summary = client.send_message("Hello").await?;
//!     println!("{}", client.store().transcript());
//!     assert!(summary.success);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod retry;
pub mod stream;

// Re-export commonly used types
pub use classifier::{classify_error, ErrorContext, ErrorKind};
pub use client::{ChatClient, StopHandle};
pub use config::Config;
pub use conversation::{ConversationStore, Message, StoreEvent};
pub use error::{AgentChatError, Result};
pub use stream::{ChunkDecoder, EventTextExtractor, ExchangeSummary, StreamSession};

#[cfg(test)]
pub mod test_utils;
