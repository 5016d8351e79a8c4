//! Command-line interface definition for AgentChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing an interactive chat command and a one-shot send command.

use clap::{Parser, Subcommand};

/// AgentChat - streaming chat with a hosted AI agent
///
/// Messages are sent to the configured agent runtime and the reply is
/// rendered incrementally as the event stream arrives.
#[derive(Parser, Debug, Clone)]
#[command(name = "agentchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the runtime endpoint URL
    #[arg(long, env = "AGENTCHAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Use a fixed session id instead of generating one
    #[arg(long)]
    pub session_id: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for AgentChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Send a single message and stream the reply to stdout
    Send {
        /// Message text to send
        #[arg(short, long)]
        prompt: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
