//! Interactive chat loop

use std::io::Write;

use anyhow::{Context, Result};
use console::style;
use convo_agent::ConversationAgent;
use convo_core::prompts::{self, PREDEFINED_PROMPTS};
use convo_core::utils::truncate;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

const HELP_MESSAGE: &str = "
Available commands:
- 'quit' : Exit the application
- 'history' : Display conversation history
- 'prompt' : Display current system prompt
- 'set_prompt' : Set a new system prompt
- 'use_prompt <type>' : Use a predefined prompt (types: teacher, french, coder, writer)
- 'list_prompts' : Display available predefined prompts
- 'reset' : Reset the conversation
- 'list_sessions' : List all available sessions
- 'switch_session <session_id>' : Switch to another session
- 'help' : Display this help message
";

/// One line of REPL input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Help,
    History,
    Prompt,
    SetPrompt,
    UsePrompt(String),
    ListPrompts,
    Reset,
    ListSessions,
    SwitchSession(String),
    Chat(String),
    Empty,
}

/// Classify a line. Keywords are case-insensitive; anything that is not a
/// command, including a keyword missing its argument, is a chat message.
pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }

    let mut parts = line.split_whitespace();
    let keyword = parts.next().unwrap_or_default().to_lowercase();
    let argument = parts.next();
    let single = parts.next().is_none() && argument.is_none();

    match (keyword.as_str(), argument) {
        ("quit", _) if single => ReplCommand::Quit,
        ("help", _) if single => ReplCommand::Help,
        ("history", _) if single => ReplCommand::History,
        ("prompt", _) if single => ReplCommand::Prompt,
        ("set_prompt", _) if single => ReplCommand::SetPrompt,
        ("list_prompts", _) if single => ReplCommand::ListPrompts,
        ("reset", _) if single => ReplCommand::Reset,
        ("list_sessions", _) if single => ReplCommand::ListSessions,
        ("use_prompt", Some(kind)) => ReplCommand::UsePrompt(kind.to_lowercase()),
        ("switch_session", Some(id)) => ReplCommand::SwitchSession(id.to_string()),
        _ => ReplCommand::Chat(line.to_string()),
    }
}

/// REPL state: the agent and the session currently talked to
pub struct Repl<'a> {
    agent: &'a ConversationAgent,
    session_id: String,
}

impl<'a> Repl<'a> {
    pub fn new(agent: &'a ConversationAgent, session_id: impl Into<String>) -> Self {
        Self {
            agent,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Read commands until `quit` or end of input.
    ///
    /// A failed chat turn ends the loop with its error.
    pub async fn run<R, W>(&mut self, mut input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(
            out,
            "Agent initialized (session: {}). Type 'help' to see available commands.",
            self.session_id
        )?;

        loop {
            write!(out, "\n[{}] You: ", style(&self.session_id).cyan())?;
            out.flush()?;

            let Some(line) = read_line(&mut input).await? else {
                writeln!(out)?;
                break;
            };

            match parse_command(&line) {
                ReplCommand::Quit => break,
                ReplCommand::Empty => continue,
                ReplCommand::SetPrompt => {
                    write!(out, "Enter new system prompt: ")?;
                    out.flush()?;
                    let prompt = read_line(&mut input).await?.unwrap_or_default();
                    self.agent
                        .set_system_prompt(&self.session_id, prompt.trim())
                        .await?;
                    writeln!(out, "System prompt updated.")?;
                }
                command => self.execute(command, out).await?,
            }
        }

        info!(session_id = %self.session_id, "REPL finished");
        Ok(())
    }

    async fn execute<W: Write>(&mut self, command: ReplCommand, out: &mut W) -> Result<()> {
        match command {
            ReplCommand::Help => writeln!(out, "{}", HELP_MESSAGE)?,
            ReplCommand::History => {
                for entry in self.agent.history(&self.session_id).await? {
                    writeln!(out, "{}: {}", entry.role, entry.content)?;
                }
            }
            ReplCommand::Prompt => {
                let prompt = self.agent.resolve_system_prompt(&self.session_id).await?;
                writeln!(out, "\nCurrent system prompt:\n{}", prompt)?;
            }
            ReplCommand::UsePrompt(kind) => {
                if prompts::get(&kind).is_some() {
                    self.agent
                        .use_predefined_prompt(&self.session_id, &kind)
                        .await?;
                    writeln!(out, "System prompt changed to: {}", kind)?;
                } else {
                    writeln!(
                        out,
                        "Prompt type '{}' not found. Use 'list_prompts' to see available types.",
                        kind
                    )?;
                }
            }
            ReplCommand::ListPrompts => {
                writeln!(out, "\nAvailable predefined prompts:")?;
                for (kind, text) in PREDEFINED_PROMPTS {
                    writeln!(out, "\n- {}:\n  {}", style(kind).bold(), text)?;
                }
            }
            ReplCommand::Reset => {
                self.agent.reset(&self.session_id).await?;
                writeln!(out, "Conversation reset.")?;
            }
            ReplCommand::ListSessions => {
                writeln!(out, "\nAvailable sessions:")?;
                for session in self.agent.list_sessions().await? {
                    writeln!(
                        out,
                        "- {} (Last activity: {})",
                        session.session_id,
                        session.last_updated.format("%Y-%m-%d %H:%M:%S")
                    )?;
                    let prompt = session.system_prompt.unwrap_or_default();
                    writeln!(out, "  Prompt: {}", truncate(&prompt, 50))?;
                }
            }
            ReplCommand::SwitchSession(id) => {
                self.session_id = id;
                writeln!(out, "Switched to session: {}", self.session_id)?;
            }
            ReplCommand::Chat(content) => {
                let reply = self
                    .agent
                    .chat(&self.session_id, &content)
                    .await
                    .context("Failed to process message")?;
                writeln!(out, "\n{} {}", style("Assistant:").bold().green(), reply)?;
            }
            ReplCommand::Quit | ReplCommand::Empty | ReplCommand::SetPrompt => {}
        }
        Ok(())
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let read = input.read_line(&mut line).await?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
