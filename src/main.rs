//! AgentChat - streaming chat client for hosted AI agents
//!
#![doc = "AgentChat - streaming chat client for hosted AI agents"]
#![doc = "Main entry point for the AgentChat application."]

use anyhow::Result;

use agentchat::cli::{Cli, Commands};
use agentchat::commands;
use agentchat::config::Config;
use agentchat::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Logging level and format come from the loaded configuration
    init_logging(&config.logging)?;

    // Validate configuration
    config.validate()?;

    tracing::debug!(
        endpoint = %config.runtime.endpoint,
        target = %config.runtime.target,
        "Configuration loaded"
    );

    // Execute command
    match cli.command {
        Commands::Chat => {
            // Moves `config` into the handler (match arms are exclusive)
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Send { prompt } => {
            tracing::debug!("Sending prompt of {} chars", prompt.chars().count());
            commands::send::run_send(config, prompt).await?;
            Ok(())
        }
    }
}
