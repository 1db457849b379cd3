//! IRC Relay - Main binary

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use ircrelay_core::{
    Message, OutboundMessage, PlainFormatter, PublicMessage, Relay, RelayConfig,
    RelayCounterpart, RelayHandle, TcpTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

/// IRC Relay - keeps one IRC connection alive for a chat bridge
#[derive(Parser)]
#[command(name = "ircrelay")]
#[command(about = "A self-healing IRC relay connection")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Test configuration and exit
    #[arg(long)]
    test_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "relay.toml")]
        output: PathBuf,
    },
    /// Show version information
    Version,
}

/// Counterpart that mirrors IRC traffic to the log
struct ConsoleCounterpart;

#[async_trait]
impl RelayCounterpart for ConsoleCounterpart {
    async fn handle_direct_message(&self, text: String, raw: Message) {
        let sender = raw.source_nick().unwrap_or("?");
        info!("[private] <{}> {}", sender, text);
    }

    async fn handle_public_message(&self, fields: PublicMessage) {
        info!("[{}] <{}> {}", fields.channel, fields.sender, fields.text);
    }

    async fn handle_channel_parted(&self, channel: String) {
        warn!("No longer in {}", channel);
    }

    async fn handle_ready(&self, nickname: String) {
        info!("Relay ready as {}", nickname);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    // Handle subcommands
    if let Some(command) = cli.command {
        match command {
            Commands::Config { output } => {
                generate_config(&output)?;
                return Ok(());
            }
            Commands::Version => {
                show_version();
                return Ok(());
            }
        }
    }

    // Load configuration
    let config = if cli.config.exists() {
        info!("Loading configuration from {:?}", cli.config);
        RelayConfig::from_file(&cli.config)?
    } else {
        info!("Configuration file not found, using defaults");
        RelayConfig::default()
    };

    // Test configuration if requested
    if cli.test_config {
        config.validate()?;
        info!("Configuration is valid");
        return Ok(());
    }

    info!("Starting IRC relay...");
    let relay = Relay::spawn(config, TcpTransport::new(), Arc::new(PlainFormatter))?;
    relay.register_counterpart(Arc::new(ConsoleCounterpart));

    let handle = relay.handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => forward_line(&handle, &line),
                    Ok(None) => {
                        // stdin closed; keep relaying until interrupted
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        }
    }

    let status = relay.status().status();
    info!("Final status: {} ({})", status.status, status.channels);
    relay.stop(Some("Relay shutting down")).await?;

    Ok(())
}

/// Relay one `<#channel> <text>` console line
fn forward_line(handle: &RelayHandle, line: &str) {
    let Some((channel, text)) = line.trim().split_once(' ') else {
        warn!("Expected '<#channel> <text>'");
        return;
    };

    match handle.send_message(OutboundMessage::new(channel, text)) {
        Ok(pending) => {
            let channel = channel.to_string();
            tokio::spawn(async move {
                if let Err(e) = pending.outcome().await {
                    warn!("Could not relay to {}: {}", channel, e);
                }
            });
        }
        Err(e) => error!("Relay is not running: {}", e),
    }
}

/// Initialize logging
fn init_logging(level: &str) -> anyhow::Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .init();

    Ok(())
}

/// Generate default configuration file
fn generate_config(output: &PathBuf) -> anyhow::Result<()> {
    let config = RelayConfig::default();
    config.to_file(output)?;
    println!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Show version information
fn show_version() {
    println!("ircrelay {}", env!("CARGO_PKG_VERSION"));
}
