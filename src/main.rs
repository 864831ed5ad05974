//! relaymq – broker daemon.
//
//  $ relaymq --config relaymq.toml
//  $ PUBLISHERS_PORT=:3000 CONSUMERS_PORT=:3001 relaymq
use std::process;
use std::sync::Arc;

use clap::Parser;
use relaymq::config::{load_or_default, Config, CONFIG_ENV};
use relaymq::logging::{default_logger, init_logging};
use relaymq::Broker;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "relaymq", version, about = "TCP message relay broker")]
struct Cli {
    /// Path to config TOML (env RELAYMQ_CONFIG overrides); defaults to
    /// `relaymq.toml` when present
    #[arg(short, long)]
    config: Option<String>,

    /// Publisher-facing address, e.g. `:3000`
    #[arg(long)]
    publishers: Option<String>,

    /// Consumer-facing address, e.g. `:3001`
    #[arg(long)]
    consumers: Option<String>,
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let named: Option<String> = std::env::var(CONFIG_ENV).ok().or_else(|| cli.config.clone());
    let mut config = load_or_default(named.as_deref())?;

    config.apply_env_overrides();
    if let Some(addr) = &cli.publishers {
        config.server.publishers_addr = addr.clone();
    }
    if let Some(addr) = &cli.consumers {
        config.server.consumers_addr = addr.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let config: Config = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[FATAL] Failed to load config: {e}");
            process::exit(1);
        }
    };

    let broker = Arc::new(Broker::from_config(&config, default_logger()));

    let signal_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C");
            signal_broker.stop();
        }
    });

    if let Err(e) = broker.start().await {
        eprintln!("[FATAL] Broker stopped: {e}");
        process::exit(1);
    }
}
