//! CLI entry point for convo

mod repl;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use console::style;
use convo_agent::ConversationAgent;
use convo_core::config::{Config, ConfigLoader};
use convo_core::logging::init_logging;
use convo_core::prompts;
use convo_core::session::SessionStore;
use convo_core::utils::{expand_tilde, truncate};
use convo_providers::{ChatCompletionsClient, ProviderRegistry};
use convo_server::{run_server, shutdown_signal, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::repl::Repl;

#[derive(Parser)]
#[command(name = "convo")]
#[command(about = "Chat with an LLM through persistent sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively, or send a single message
    Chat {
        /// Send one message, print the reply and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Session ID for the conversation
        #[arg(short, long, default_value = "default_user")]
        session: String,
        /// Default system prompt for sessions without one
        #[arg(long)]
        system_prompt: Option<String>,
        /// Use a predefined prompt as the default
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(prompts::keys()))]
        prompt_type: Option<String>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Run the HTTP and WebSocket API
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List stored sessions
    Sessions {
        /// Path to the database file
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Show status information
    Status,
}

/// Settings that can be overridden per invocation
#[derive(Args)]
struct Overrides {
    /// Path to the database file
    #[arg(long)]
    db_path: Option<String>,
    /// Model to use
    #[arg(short, long)]
    model: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.db_path {
            config.database.path = path;
        }
        if let Some(model) = self.model {
            config.agent.model = model;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Create config loader
    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let mut config = config_loader.load()?;
    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Chat {
            message,
            session,
            system_prompt,
            prompt_type,
            overrides,
        } => {
            overrides.apply(&mut config);
            // A predefined prompt wins over a literal one
            if let Some(prompt) = prompt_type.as_deref().and_then(prompts::get) {
                config.agent.system_prompt = Some(prompt.to_string());
            } else if let Some(prompt) = system_prompt {
                config.agent.system_prompt = Some(prompt);
            }
            run_chat(&config, message, session).await?;
        }
        Commands::Serve {
            host,
            port,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting server");
            run_serve(&config).await?;
        }
        Commands::Sessions { db_path } => {
            if let Some(path) = db_path {
                config.database.path = path;
            }
            run_sessions(&config).await?;
        }
        Commands::Status => {
            info!("Showing status");
            run_status(&config_loader, &config).await?;
        }
    }

    Ok(())
}

async fn build_agent(config: &Config) -> Result<ConversationAgent> {
    let provider = ChatCompletionsClient::from_config(&config.providers, &config.agent.model)?;
    Ok(ConversationAgent::from_config(config, Arc::new(provider)).await?)
}

/// Run a one-shot message or the interactive REPL
async fn run_chat(config: &Config, message: Option<String>, session: String) -> Result<()> {
    let agent = build_agent(config).await?;

    if let Some(message) = message {
        info!(session_id = %session, "Processing one-shot message");
        match agent.chat(&session, &message).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                error!("Error processing message: {}", e);
                anyhow::bail!("Failed to process message: {}", e);
            }
        }
        return Ok(());
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    Repl::new(&agent, session).run(stdin, &mut stdout).await
}

async fn run_serve(config: &Config) -> Result<()> {
    let agent = build_agent(config).await?;
    let state = AppState::new(Arc::new(agent));
    run_server(state, &config.server, shutdown_signal()).await
}

async fn run_sessions(config: &Config) -> Result<()> {
    let store = SessionStore::open(expand_tilde(&config.database.path)).await?;
    let sessions = store.list_sessions().await?;

    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!("{}", style("Sessions:").bold());
    for session in sessions {
        let prompt = session.system_prompt.unwrap_or_default();
        println!(
            "- {} (Last activity: {})",
            style(&session.session_id).cyan(),
            session.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Prompt: {}", truncate(&prompt, 50));
    }
    Ok(())
}

async fn run_status(loader: &ConfigLoader, config: &Config) -> Result<()> {
    println!("{}", style("convo status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    // Config info
    println!("{}", style("Configuration:").bold());
    println!("  Config file: {}", loader.config_path().display());
    println!("  Model: {}", config.agent.model);
    println!(
        "  Max tokens: {}, temperature: {}",
        config.agent.max_tokens, config.agent.temperature
    );
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!();

    // Database info
    println!("{}", style("Database:").bold());
    let db_path = expand_tilde(&config.database.path);
    println!("  Path: {}", db_path.display());
    if db_path.exists() {
        let store = SessionStore::open(&db_path).await?;
        println!("  Sessions: {}", store.list_sessions().await?.len());
        store.close().await;
    } else {
        println!("  Sessions: {}", style("no database yet").dim());
    }
    println!();

    // Provider info
    println!("{}", style("Providers:").bold());
    let registry = ProviderRegistry::new();
    let serving = registry
        .find_for_model(&config.agent.model)
        .map(|spec| spec.name.clone());
    for (name, provider) in config.providers.entries() {
        let status = if !provider.api_key.is_empty() {
            style("configured").green()
        } else if registry.find_by_name(name).is_some_and(|spec| spec.is_local) {
            style("local").dim()
        } else {
            style("not configured").red()
        };
        let marker = if serving.as_deref() == Some(name) {
            " (serves current model)"
        } else {
            ""
        };
        println!("  {}: {}{}", name, status, marker);
    }

    Ok(())
}
