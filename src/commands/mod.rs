/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level command modules:

- `chat`: interactive chat mode
- `send`: send a single message and print the reply

Both render replies live by listening to conversation store events while
the exchange runs.
*/

use std::io::Write;

use colored::Colorize;

use crate::classifier::{ErrorContext, ErrorKind};
use crate::client::ChatClient;
use crate::config::Config;
use crate::conversation::{ConversationStore, Sender, StoreEvent};
use crate::error::{AgentChatError, Result};
use crate::stream::ExchangeSummary;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

// Special commands parser for the interactive loop
pub mod special_commands;

/// What to run against the client.
#[derive(Debug, Clone, Copy)]
enum Exchange<'a> {
    Send(&'a str),
    Retry,
}

/// Reply the renderer is printing.
#[derive(Debug, Clone)]
struct Reply {
    id: String,
    /// Bytes of the reply already written
    printed: usize,
    finished: bool,
}

/// Writes store events to a terminal.
///
/// Once events are missed the live view stops and [`Renderer::catch_up`]
/// prints the rest from the store, which always holds the full reply.
#[derive(Debug, Clone)]
struct Renderer {
    /// Label agent replies with a colored prefix
    show_prefix: bool,
    reply: Option<Reply>,
    lagged: bool,
}

impl Renderer {
    fn new(show_prefix: bool) -> Self {
        Self {
            show_prefix,
            reply: None,
            lagged: false,
        }
    }

    fn receive<W: Write>(
        &mut self,
        received: std::result::Result<StoreEvent, RecvError>,
        out: &mut W,
    ) -> std::io::Result<()> {
        match received {
            Ok(event) => self.render(&event, out),
            Err(RecvError::Lagged(missed)) => {
                self.mark_lagged(missed);
                Ok(())
            }
            Err(RecvError::Closed) => Ok(()),
        }
    }

    /// Render everything already queued on `events`.
    fn drain<W: Write>(
        &mut self,
        events: &mut broadcast::Receiver<StoreEvent>,
        out: &mut W,
    ) -> std::io::Result<()> {
        loop {
            match events.try_recv() {
                Ok(event) => self.render(&event, out)?,
                Err(TryRecvError::Lagged(missed)) => self.mark_lagged(missed),
                Err(_) => return Ok(()),
            }
        }
    }

    fn mark_lagged(&mut self, missed: u64) {
        if !self.lagged {
            tracing::debug!(
                "Renderer missed {} store events, catching up from the store",
                missed
            );
        }
        self.lagged = true;
    }

    fn render<W: Write>(&mut self, event: &StoreEvent, out: &mut W) -> std::io::Result<()> {
        if self.lagged {
            return Ok(());
        }
        match event {
            StoreEvent::MessageAdded(message) if message.sender == Sender::Agent => {
                self.write_prefix(out)?;
                write!(out, "{}", message.content)?;
                self.reply = Some(Reply {
                    id: message.id.clone(),
                    printed: message.content.len(),
                    finished: false,
                });
            }
            StoreEvent::MessageAppended { id, fragment } => {
                write!(out, "{}", fragment)?;
                if let Some(reply) = self.reply.as_mut().filter(|r| &r.id == id) {
                    reply.printed += fragment.len();
                }
            }
            StoreEvent::MessageCompleted(message) if message.sender == Sender::Agent => {
                writeln!(out)?;
                self.finish(&message.id);
            }
            StoreEvent::MessageRemoved(id) => {
                if self.show_prefix {
                    writeln!(out)?;
                }
                self.finish(id);
            }
            _ => {}
        }
        out.flush()
    }

    /// Print what the live view missed, using agent messages from index
    /// `since` on. Does nothing unless events were missed.
    fn catch_up<W: Write>(
        &mut self,
        store: &ConversationStore,
        since: usize,
        out: &mut W,
    ) -> std::io::Result<()> {
        if !self.lagged {
            return Ok(());
        }

        let messages = store.messages();
        let replies = messages
            .get(since..)
            .unwrap_or_default()
            .iter()
            .filter(|m| m.sender == Sender::Agent);

        for message in replies {
            match &self.reply {
                Some(reply) if reply.id == message.id => {
                    if reply.finished {
                        continue;
                    }
                    write!(out, "{}", message.content.get(reply.printed..).unwrap_or(""))?;
                }
                _ => {
                    self.write_prefix(out)?;
                    write!(out, "{}", message.content)?;
                }
            }
            writeln!(out)?;
        }

        // A rolled-back placeholder whose removal was missed.
        if let Some(reply) = &self.reply {
            if !reply.finished && store.message(&reply.id).is_none() && self.show_prefix {
                writeln!(out)?;
            }
        }

        self.reply = None;
        self.lagged = false;
        out.flush()
    }

    fn write_prefix<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.show_prefix {
            write!(out, "{} ", "agent>".cyan().bold())?;
        }
        Ok(())
    }

    fn finish(&mut self, id: &str) {
        if let Some(reply) = self.reply.as_mut().filter(|r| r.id == id) {
            reply.finished = true;
        }
    }
}

/// Run one exchange while rendering its events; Ctrl-C stops the reply.
async fn run_exchange(
    client: &mut ChatClient,
    exchange: Exchange<'_>,
    show_prefix: bool,
) -> Result<Option<ExchangeSummary>> {
    let mut events = client.subscribe();
    let since = client.store().messages().len();
    let stop = client.stop_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ctrl-C received, stopping reply");
            stop.stop();
        }
    });

    let mut renderer = Renderer::new(show_prefix);
    let mut stdout = std::io::stdout();
    let result = {
        let work = async {
            match exchange {
                Exchange::Send(text) => client.send_message(text).await.map(Some),
                Exchange::Retry => client.retry_last_message().await,
            }
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => break result,
                received = events.recv() => renderer.receive(received, &mut stdout)?,
            }
        }
    };
    watcher.abort();

    renderer.drain(&mut events, &mut stdout)?;
    renderer.catch_up(client.store(), since, &mut stdout)?;

    result
}

fn print_error(error: &ErrorContext) {
    eprintln!(
        "{}",
        format!("Error [{}]: {}", error.code, error.message).red()
    );
    match error.kind {
        ErrorKind::Validation => {}
        _ if error.retryable => eprintln!("{}", "Type '/retry' to try again".yellow()),
        _ => eprintln!(
            "{}",
            "Fix the problem, then type '/retry' to resend".yellow()
        ),
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Creates a `ChatClient` for the configured runtime and runs a
    //! readline-based interactive loop. Replies stream to the terminal as
    //! fragments arrive.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Examples
    ///
    /// ```
    /// use agentchat::commands::chat;
    /// use agentchat::config::Config;
    ///
    /// // In application code:
    /// // chat::run_chat(Config::default()).await?;
    /// ```
    pub async fn run_chat(config: Config) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let mut client = ChatClient::from_config(&config)?;
                let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&config, client.store());

        loop {
            let prompt = format!("{} ", "you>".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::Retry => {
                            match run_exchange(&mut client, Exchange::Retry, true).await? {
                                Some(summary) => report(&client, &summary),
                                None => println!("Nothing to retry\n"),
                            }
                            continue;
                        }
                        SpecialCommand::ClearError => {
                            client.clear_error();
                            println!("Error cleared\n");
                            continue;
                        }
                        SpecialCommand::NewSession => {
                            let session_id = client.start_new_session();
                            println!("Started new session {}\n", session_id.cyan());
                            continue;
                        }
                        SpecialCommand::ShowStatus => {
                            print_status_display(client.store());
                            continue;
                        }
                        SpecialCommand::History { json } => {
                            if json {
                                let snapshot = client.store().snapshot();
                                println!("{}\n", serde_json::to_string_pretty(&snapshot)?);
                            } else {
                                println!("{}\n", client.store().transcript());
                            }
                            continue;
                        }
                        SpecialCommand::Help => {
                            print_help();
                            continue;
                        }
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            // Regular message for the agent
                        }
                    }

                    rl.add_history_entry(trimmed)?;

                    if let Some(summary) =
                        run_exchange(&mut client, Exchange::Send(trimmed), true).await?
                    {
                        report(&client, &summary);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        client.end_session();
        println!("Goodbye!");
        Ok(())
    }

    fn report(client: &ChatClient, summary: &ExchangeSummary) {
        if summary.cancelled {
            println!("{}", "(stopped)".dimmed());
        }
        if let Some(error) = client.store().error() {
            print_error(error);
        }
        println!();
    }

    /// Display welcome banner at the start of interactive chat mode
    fn print_welcome_banner(config: &Config, store: &ConversationStore) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║            AgentChat Interactive Mode - Welcome!             ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Endpoint: {}", config.runtime.endpoint.cyan());
        println!("Session:  {}\n", store.session().id.cyan());
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    /// Display detailed status information about the current session
    ///
    /// This is called when the user types '/status' command.
    fn print_status_display(store: &ConversationStore) {
        let status = store.status();
        let connection = store.connection();
        let session = store.session();

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    AgentChat Session Status                  ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Session:           {}", session.id);
        println!(
            "Started:           {}",
            session.start_time.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("Messages:          {}", session.message_count);
        println!("Stream State:      {}", status.state);
        println!(
            "Connected:         {}",
            if connection.is_connected {
                "yes".green()
            } else {
                "no".red()
            }
        );
        println!("Failed Attempts:   {}", connection.connection_attempts);
        if let Some(latency) = connection.latency {
            println!("Latency:           {} ms", latency.as_millis());
        }
        if let Some(error) = store.error() {
            println!("Last Error:        {} ({})", error.code.red(), error.kind);
        }
        println!();
    }
}

// Single message handler
pub mod send {
    //! Send one message and print the reply to stdout.

    use super::*;

    /// Send `prompt` and stream the reply to stdout
    ///
    /// # Errors
    ///
    /// Returns error if the message is rejected or the exchange fails; the
    /// process then exits non-zero.
    pub async fn run_send(config: Config, prompt: String) -> Result<()> {
        tracing::info!("Sending single message");

        let mut client = ChatClient::from_config(&config)?;
        
        let summary = run_exchange(&mut client, Exchange::Send(&prompt), false).await?;

        if let Some(error) = summary.and_then(|s| s.error) {
            print_error(&error);
            let err = match error.kind {
                ErrorKind::Validation => AgentChatError::Validation(error.message.clone()),
                _ => AgentChatError::Channel(error.to_string()),
            };
            return Err(err.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    fn render_all(mut renderer: Renderer, events: &[StoreEvent]) -> String {
        let mut out = Vec::new();
        for event in events {
            renderer.render(event, &mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_renderer_prints_fragments_only() {
        let reply = Message::agent("", true);
        let mut done = reply.clone();
        done.is_streaming = false;
        done.is_complete = true;

        let output = render_all(
            Renderer::new(false),
            &[
                StoreEvent::MessageAdded(Message::user("hi")),
                StoreEvent::MessageAdded(reply.clone()),
                StoreEvent::MessageAppended {
                    id: reply.id.clone(),
                    fragment: "Hel".to_string(),
                },
                StoreEvent::MessageAppended {
                    id: reply.id.clone(),
                    fragment: "lo".to_string(),
                },
                StoreEvent::MessageCompleted(done),
            ],
        );

        assert_eq!(output, "Hello\n");
    }

    #[test]
    fn test_plain_renderer_ignores_status_events() {
        let output = render_all(
            Renderer::new(false),
            &[
                StoreEvent::Cleared,
                StoreEvent::ErrorChanged(None),
                StoreEvent::MessageRemoved("x".to_string()),
            ],
        );
        assert!(output.is_empty());
    }

    fn lagging_store() -> (ConversationStore, broadcast::Receiver<StoreEvent>, String) {
        let mut store = ConversationStore::new("session-1", 4000);
        let events = store.subscribe();
        store.add_user_message("hi");
        let reply = store.add_agent_message("", true).unwrap();
        (store, events, reply.id)
    }

    #[test]
    fn test_missed_events_are_recovered_from_store() {
        let (mut store, mut events, id) = lagging_store();
        for _ in 0..400 {
            store.append_to_message(&id, "ab");
        }
        store.complete_message(&id);

        let mut renderer = Renderer::new(false);
        let mut out = Vec::new();
        renderer.drain(&mut events, &mut out).unwrap();
        assert!(renderer.lagged);
        renderer.catch_up(&store, 0, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", "ab".repeat(400)));
    }

    #[test]
    fn test_catch_up_continues_after_live_fragments() {
        let (mut store, mut events, id) = lagging_store();
        let mut renderer = Renderer::new(false);
        let mut out = Vec::new();

        for _ in 0..10 {
            store.append_to_message(&id, "x");
        }
        renderer.drain(&mut events, &mut out).unwrap();
        assert_eq!(out, b"xxxxxxxxxx");

        for _ in 0..300 {
            store.append_to_message(&id, "y");
        }
        store.complete_message(&id);
        renderer.drain(&mut events, &mut out).unwrap();
        renderer.catch_up(&store, 0, &mut out).unwrap();

        let expected = format!("{}{}\n", "x".repeat(10), "y".repeat(300));
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_catch_up_without_lag_prints_nothing() {
        let (mut store, mut events, id) = lagging_store();
        store.append_to_message(&id, "done");
        store.complete_message(&id);

        let mut renderer = Renderer::new(false);
        let mut out = Vec::new();
        renderer.drain(&mut events, &mut out).unwrap();
        renderer.catch_up(&store, 0, &mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "done\n");
    }
}
