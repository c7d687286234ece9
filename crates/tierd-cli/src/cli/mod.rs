//! CLI for the tierd background analysis scheduler.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tierd_core::config;
use tierd_core::queue::{JobStore, Priority};

use commands::{run_cancel, run_cleanup, run_config, run_enqueue, run_serve, run_status};

/// Top-level CLI for tierd.
#[derive(Debug, Parser)]
#[command(name = "tierd")]
#[command(about = "tierd: idle-aware background analysis scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the scheduler loop and the HTTP ingress until Ctrl-C.
    Serve {
        /// Address to listen on (overrides `http.bind` from config).
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Queue analysis for a user.
    Enqueue {
        /// User identifier.
        user: String,
        /// high, normal or low.
        #[arg(long, default_value = "normal")]
        priority: Priority,
    },

    /// Show job counts and all jobs.
    Status,

    /// Cancel a pending job by its ID.
    Cancel {
        /// Job identifier.
        id: i64,
    },

    /// Purge finished jobs older than N days.
    Cleanup {
        /// Retention window in days (defaults to `retention_days` from config).
        #[arg(long, value_name = "N")]
        days: Option<u32>,
    },

    /// Print the config file path and effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::Config = cli.command {
            return run_config(&cfg);
        }

        let store = JobStore::open_default()
            .await?
            .with_max_attempts(cfg.max_attempts);

        match cli.command {
            CliCommand::Serve { bind } => run_serve(store, &cfg, bind).await?,
            CliCommand::Enqueue { user, priority } => run_enqueue(&store, &user, priority).await?,
            CliCommand::Status => run_status(&store).await?,
            CliCommand::Cancel { id } => run_cancel(&store, id).await?,
            CliCommand::Cleanup { days } => {
                run_cleanup(&store, days.unwrap_or(cfg.retention_days)).await?
            }
            CliCommand::Config => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
