//! Cowsay Chat Bot - Main Entry Point
//!
//! Joins one Twitch channel and answers `!reply` and `!asdf` until the
//! operator presses ENTER.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Input;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cowsay_chat_bot::auth::{Authenticator, TokenStore, USER_SCOPES, UserSession};
use cowsay_chat_bot::chat::{ChatSender, TwitchChat};
use cowsay_chat_bot::commands::{CommandHandler, CommandRegistry, ProcessRenderer};
use cowsay_chat_bot::config::{BotSettings, DEFAULT_CHAT_URL, TwitchConfig};
use cowsay_chat_bot::dispatcher::{DispatcherMessage, EventDispatcher};

/// Twitch chat bot with a cowsay command.
#[derive(Parser, Debug)]
#[command(name = "cowsay_bot")]
#[command(about = "Answer !reply and !asdf in a Twitch channel")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Twitch chat WebSocket endpoint.
    #[arg(long, default_value = DEFAULT_CHAT_URL)]
    chat_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let twitch_config = TwitchConfig::from_env()
        .context("Failed to load Twitch configuration from environment")?;
    let settings = Arc::new(BotSettings::from_env_with_defaults());

    info!(
        "Target channel: #{}, allow-list: {}",
        settings.target_channel,
        settings.allowed_users.join(", ")
    );

    // Authenticate
    let authenticator = Authenticator::new(&twitch_config, &USER_SCOPES);
    let store = TokenStore::new(&twitch_config.token_path);

    let session = match authenticator
        .restore(&store)
        .await
        .context("Failed to restore stored user token")?
    {
        Some(session) => session,
        None => authenticate(&authenticator, &store).await?,
    };
    info!("Authenticated as {}", session.login);

    // Connect to chat
    let (chat, events) = TwitchChat::connect(&args.chat_url, &session)
        .await
        .context("Failed to connect to Twitch chat")?;
    let chat = Arc::new(chat);

    let registry = CommandRegistry::with_defaults();
    for (name, kind) in registry.entries() {
        info!("Command {}{}: {}", settings.command_prefix, name, kind.description());
    }

    let renderer = ProcessRenderer::cowsay(&settings.cowsay_path, settings.render_timeout());
    let handler = CommandHandler::new(Arc::clone(&settings), Arc::new(renderer));
    let chat_sender: Arc<dyn ChatSender> = chat.clone();
    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&settings),
        registry,
        handler,
        chat_sender,
    ));

    let (control_tx, control_rx) = mpsc::channel::<DispatcherMessage>(1);
    let dispatcher_handle = tokio::spawn(dispatcher.run(events, control_rx));

    // Run until ENTER (or EOF) on the console
    println!("press ENTER to stop");
    wait_for_enter().await;

    // Cleanup: dispatcher, then chat, then the API client
    info!("Shutting down...");
    let _ = control_tx.send(DispatcherMessage::Shutdown).await;
    let _ = dispatcher_handle.await;
    chat.stop().await;
    authenticator.close();

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Runs the interactive authorization code flow.
async fn authenticate(authenticator: &Authenticator, store: &TokenStore) -> Result<UserSession> {
    info!("Authentication required");

    let url = authenticator.authorization_url()?;
    println!("Open this URL in a browser and authorize the bot:\n\n  {url}\n");
    println!("You will be redirected; copy the `code` parameter from the address bar.");

    let code: String = Input::new()
        .with_prompt("Enter the authorization code")
        .interact_text()?;

    let session = authenticator
        .login(&code, store)
        .await
        .context("Authentication failed")?;

    info!("Successfully signed in!");
    Ok(session)
}

/// Blocks until one line (or end of input) is read from stdin.
async fn wait_for_enter() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(_)) => debug!("Stop requested from console"),
        Ok(None) => info!("Console closed, stopping"),
        Err(e) => warn!("Failed to read console input ({}), stopping", e),
    }
}
