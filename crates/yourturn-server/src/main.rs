//! YourTurn MCP Server
//!
//! Exposes a single `your_turn` tool over MCP (stdio). When an agent calls it
//! the server:
//! - Raises a local alert (terminal bell or a sound command)
//! - Sends the question to a Telegram chat, if configured
//! - Waits for the reply, the configured timeout, or a default reply
//!
//! Usage:
//! ```bash
//! # Alert only
//! yourturn-server
//!
//! # With Telegram
//! TELEGRAM_BOT_TOKEN=123:abc TELEGRAM_CHAT_ID=456 yourturn-server
//!
//! # With a config file (env vars and flags override it)
//! yourturn-server --config ~/.yourturn/config.yaml --timeout-secs 600
//! ```
//!
//! stdout carries the JSON-RPC stream; all logs go to stderr.

mod alert;
mod config;
mod mcp;
mod message;

use anyhow::Context;
use clap::Parser;
use config::{Overrides, ServerConfig};
use mcp::McpServer;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use yourturn_session::{ResponseCollector, SessionManager};
use yourturn_telegram::TelegramChannel;

/// YourTurn Server - ask the human, resume on reply or timeout
#[derive(Parser)]
#[command(name = "yourturn-server")]
#[command(about = "MCP server that alerts you and waits for your reply", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, value_name = "FILE", env = "YOURTURN_CONFIG")]
    config: Option<String>,

    /// Telegram bot token (from @BotFather)
    #[arg(long, alias = "telegram-bot-token", value_name = "TOKEN")]
    telegram_token: Option<String>,

    /// Telegram chat ID questions are sent to
    #[arg(long, value_name = "ID")]
    telegram_chat_id: Option<String>,

    /// Seconds to wait for a reply (0 or less waits forever)
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    timeout_secs: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Warning: Invalid log level '{}' ({}), using info", level, e);
            EnvFilter::new("info")
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn load_config(cli: Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            ServerConfig::from_file(&path)?
        }
        None => ServerConfig::default(),
    };

    // Environment overrides the file, flags override both
    config.merge_env();
    config.apply_overrides(Overrides {
        telegram_token: cli.telegram_token,
        telegram_chat_id: cli.telegram_chat_id,
        timeout_secs: cli.timeout_secs,
        log_level: cli.log_level,
    });
    config.validate()?;

    Ok(config)
}

fn build_telegram(
    config: &ServerConfig,
    manager: &Arc<SessionManager>,
) -> Option<Arc<TelegramChannel>> {
    if !config.telegram.enabled {
        info!("Telegram disabled, alert only");
        return None;
    }
    if let Some(missing) = config.telegram.missing_credential() {
        if config.telegram.bot_token.is_some() || config.telegram.chat_id.is_some() {
            warn!("Incomplete Telegram configuration, missing {}", missing);
        } else {
            info!("No Telegram configuration found, alert only");
        }
        return None;
    }

    match TelegramChannel::new(config.telegram.clone(), manager.clone()) {
        Ok(channel) => Some(Arc::new(channel)),
        Err(e) => {
            warn!("Telegram disabled: {}", e.describe());
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_source = cli.config.clone();
    let config = load_config(cli)?;

    init_tracing(&config.logging.level)?;

    match config_source {
        Some(path) => info!("📁 Loaded configuration from {}", path),
        None => info!("📁 Using default configuration"),
    }

    let manager = Arc::new(SessionManager::new(config.sessions.clone()));
    manager.start().await;

    let telegram = build_telegram(&config, &manager);

    let mut collector = ResponseCollector::new(manager.clone(), config.collector.clone());
    if let Some(alert) = alert::build_alert(&config.alert) {
        collector = collector.with_alert(alert);
    }
    if let Some(channel) = &telegram {
        collector = collector.with_channel(channel.clone());
    }

    let server = Arc::new(McpServer::new(Arc::new(collector), config.tool.clone()));

    info!(
        "🚀 YourTurn MCP server ready (timeout: {}s, telegram: {})",
        config.tool.timeout_secs,
        telegram.is_some()
    );

    tokio::select! {
        result = server.run(tokio::io::stdin(), tokio::io::stdout()) => {
            if let Err(e) = result {
                warn!("MCP loop ended with error: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    if let Some(channel) = &telegram {
        channel.shutdown().await;
    }
    manager.stop().await;

    info!("YourTurn server stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
