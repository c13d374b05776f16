use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use murmur_backend::config::BotConfig;
use murmur_backend::runtime::ChatbotRuntimeBuilder;
use murmur_backend::transport::{StdinTransport, TwitchIrcTransport};

#[derive(Debug, Parser)]
#[command(name = "murmur", version, about = "Twitch chat bot that samples chat and replies")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a configuration file with every default filled in, then exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,

    /// Read chat from stdin (`sender #channel text`) and log replies instead of connecting
    #[arg(long)]
    dry_run: bool,

    /// Seed the sampling RNG for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,murmur=debug,murmur_backend=debug")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(path) = cli.write_default_config {
        return BotConfig::default().save(&path);
    }

    let mut config = BotConfig::load(cli.config.as_deref())?;
    if cli.dry_run && config.twitch_irc.username.trim().is_empty() {
        config.twitch_irc.username = "murmur".to_string();
    }

    let builder = if cli.dry_run {
        tracing::info!("Dry run: reading chat from stdin");
        ChatbotRuntimeBuilder::new(config, Arc::new(StdinTransport::new()))
    } else {
        let transport = Arc::new(TwitchIrcTransport::new(&config.twitch_irc));
        ChatbotRuntimeBuilder::new(config, transport)
    };
    let builder = match cli.seed {
        Some(seed) => builder.with_seed(seed),
        None => builder,
    };
    let runtime = builder.build().context("failed to build chatbot runtime")?;

    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down...");
                on_signal.cancel();
            }
        });

        runtime.run(cancel).await
    })?;

    tracing::info!("Client exited");
    Ok(())
}
