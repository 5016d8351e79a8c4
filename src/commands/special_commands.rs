//! Special commands parser for interactive chat mode
//!
//! Special commands act on the local conversation instead of being sent to
//! the agent. They allow users to:
//! - Retry the last message after a failure
//! - Dismiss the current error
//! - Start a new session
//! - Inspect status and history
//! - Exit the session
//!
//! Commands are prefixed with `/` and are case-insensitive.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Resend the most recent user message
    Retry,

    /// Dismiss the current error
    ClearError,

    /// Drop the conversation and start a new session
    NewSession,

    /// Display streaming, connection and session status
    ShowStatus,

    /// Print the conversation transcript
    ///
    /// With `json` set, prints the full snapshot as JSON instead.
    History { json: bool },

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent to the agent.
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` if input starts with "/" but is
/// not a valid command, and `CommandError::UnsupportedArgument` if a
/// command receives an invalid argument.
///
/// # Examples
///
/// ```
/// use agentchat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/retry").unwrap(), SpecialCommand::Retry);
/// assert_eq!(parse_special_command("hello agent").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // If input doesn't start with "/", it's not a command (except exit/quit)
    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    match lower.as_str() {
        "/retry" | "/r" => Ok(SpecialCommand::Retry),
        "/clear" => Ok(SpecialCommand::ClearError),
        "/new" | "/reset" => Ok(SpecialCommand::NewSession),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/history" => Ok(SpecialCommand::History { json: false }),
        "/history json" => Ok(SpecialCommand::History { json: true }),
        input if input.starts_with("/history ") => {
            let arg = input[9..].trim();
            Err(CommandError::UnsupportedArgument {
                command: "/history".to_string(),
                arg: arg.to_string(),
            })
        }
        "/help" | "/?" => Ok(SpecialCommand::Help),

        // Exit commands
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        // Unknown command starting with "/"
        input if input.starts_with('/') => {
            let cmd = input.split_whitespace().next().unwrap_or(input);
            Err(CommandError::UnknownCommand(cmd.to_string()))
        }

        _ => Ok(SpecialCommand::None),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

CONVERSATION:
  /retry          - Resend your last message (after an error)
  /r              - Same as /retry
  /clear          - Dismiss the current error
  /new            - Start a new session (clears the conversation)
  /reset          - Same as /new

SESSION INFORMATION:
  /status         - Show streaming, connection and session status
  /history        - Show the conversation transcript
  /history json   - Dump the full conversation state as JSON
  /help           - Show this help message
  /?              - Same as /help

SESSION CONTROL:
  Ctrl-C          - Stop the reply that is streaming
  exit            - Exit interactive mode
  quit            - Same as exit

NOTES:
  - Commands are case-insensitive
  - Regular text (not starting with /) is sent to the agent
"#
    );
}
