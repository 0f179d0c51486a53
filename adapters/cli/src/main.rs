#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs fog-sync sessions headlessly.
//!
//! `fog-sync demo` hosts an authority and a set of mirrors in one process,
//! connects them over in-process transports, walks every player's unit and
//! prints what each player ends up seeing. `fog-sync config` prints the
//! effective configuration.

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fog_sync_session::{SessionConfig, WorldSource};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "fog_sync=info";

#[derive(Debug, Parser)]
#[command(name = "fog-sync", about = "Fog-of-war state synchronisation", version)]
struct Cli {
    /// Session configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fetch terrain from this world-data service instead of generating it.
    #[arg(long, global = true)]
    world_url: Option<String>,

    /// Seed for generated terrain.
    #[arg(long, global = true, conflicts_with = "world_url")]
    seed: Option<u64>,

    /// Milliseconds between automatic mirror ticks; 0 ticks manually.
    #[arg(long, global = true)]
    tick_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a headless session and print every player's view.
    Demo {
        /// Player names; well-known colour names get that colour.
        #[arg(long, value_delimiter = ',', default_value = "red,blue")]
        players: Vec<String>,

        /// Ticks to advance every mirror.
        #[arg(long, default_value_t = 120)]
        ticks: u32,
    },
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_path(path)?,
            None => SessionConfig::default(),
        };
        if let Some(base_url) = &self.world_url {
            config.world = WorldSource::Http {
                base_url: base_url.clone(),
                timeout_ms: match config.world {
                    WorldSource::Http { timeout_ms, .. } => timeout_ms,
                    WorldSource::Generated { .. } => 5_000,
                },
            };
        }
        if let Some(seed) = self.seed {
            config.world = WorldSource::Generated { seed };
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    let config = cli.session_config()?;

    match cli.command {
        Command::Demo { players, ticks } => {
            let report = demo::run(&config, &players, ticks).await?;
            print!("{report}");
        }
        Command::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}
