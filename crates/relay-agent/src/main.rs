//! # relay-agent
//!
//! Relay server binary: loads settings, initializes logging and metrics,
//! wires both hubs behind the HTTP surface and runs until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use relay_core::{LogFormat, init_subscriber};
use relay_server::{MemoryDirectory, RelayServer, ServerConfig, StaticTokens};
use relay_settings::RelaySettings;

/// Real-time chat and notification relay.
#[derive(Parser, Debug)]
#[command(name = "relay-agent", about = "Real-time chat and notification relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.relay/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: `compact` or `json` (overrides settings).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Seed an in-memory chat, as `CHAT_ID:USER,USER,...`. Repeatable.
    #[arg(long = "chat", value_parser = parse_chat)]
    chats: Vec<SeedChat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SeedChat {
    id: i64,
    participants: Vec<i64>,
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.to_ascii_lowercase().as_str() {
        "compact" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        other => bail!("unknown log format '{other}', expected compact or json"),
    }
}

fn parse_chat(raw: &str) -> Result<SeedChat> {
    let (id, users) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected CHAT_ID:USER,USER,..."))?;
    let id = id.trim().parse().context("invalid chat id")?;
    let participants = users
        .split(',')
        .filter(|u| !u.trim().is_empty())
        .map(|u| u.trim().parse::<i64>().with_context(|| format!("invalid user id '{u}'")))
        .collect::<Result<Vec<_>>>()?;
    Ok(SeedChat { id, participants })
}

impl Cli {
    fn load_settings(&self) -> Result<RelaySettings> {
        let path = self.settings.clone().unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics = relay_server::metrics::install_recorder().context("failed to install metrics recorder")?;

    let directory = Arc::new(MemoryDirectory::new());
    for chat in &args.chats {
        directory.create_chat(chat.id, chat.participants.iter().copied());
        tracing::info!(chat_id = chat.id, participants = ?chat.participants, "seeded chat");
    }
    let tokens = StaticTokens::new(settings.auth.tokens.clone());
    if tokens.is_empty() {
        tracing::warn!("no auth tokens configured, every upgrade will be rejected");
    }

    let config = ServerConfig::from_settings(&settings);
    let server = RelayServer::new(config, directory, Arc::new(tokens), metrics);
    let addr = server.listen().await.context("failed to bind listener")?;
    tracing::info!(%addr, "relay agent ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    if !server.shutdown().await {
        tracing::warn!("shutdown timed out, some tasks were aborted");
    }
    Ok(())
}
