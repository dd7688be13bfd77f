//! CLI for the pullsync daemon.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pullsync_core::config::{self, PullsyncConfig};

use commands::{run_config, run_daemon, run_parse_status};

/// Top-level CLI for pullsync.
#[derive(Debug, Parser)]
#[command(name = "pullsync")]
#[command(about = "pullsync: mirror a remote directory to local disk through lftp", long_about = None)]
pub struct Cli {
    /// Log at debug level for every target (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the scan loops until Ctrl-C.
    Run {
        /// Config file. Defaults to ~/.config/pullsync/config.toml, created on first run.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// lftp executable.
        #[arg(long, default_value = "lftp", value_name = "PATH")]
        lftp: PathBuf,
        /// 7z-compatible extractor executable.
        #[arg(long, default_value = "7z", value_name = "PATH")]
        extractor: PathBuf,
    },

    /// Print the effective configuration with the password masked.
    Config {
        /// Config file. Defaults to ~/.config/pullsync/config.toml.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Parse a saved `jobs -v` dump and print the jobs it contains.
    ParseStatus {
        /// File holding the dump.
        file: PathBuf,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            CliCommand::Run {
                config,
                lftp,
                extractor,
            } => run_daemon(config.as_deref(), &lftp, &extractor).await?,
            CliCommand::Config { config } => run_config(config.as_deref())?,
            CliCommand::ParseStatus { file, json } => run_parse_status(&file, json)?,
        }
        Ok(())
    }
}

/// Load `path`, or the default config file (written on first use).
pub(crate) fn load_config(path: Option<&Path>) -> Result<(PullsyncConfig, PathBuf)> {
    match path {
        Some(path) => {
            let cfg = config::load_from_path(path)
                .with_context(|| format!("load config {}", path.display()))?;
            Ok((cfg, path.to_path_buf()))
        }
        None => {
            let path = config::config_path().context("locate config file")?;
            let cfg = config::load_or_init().context("load config")?;
            Ok((cfg, path))
        }
    }
}

#[cfg(test)]
mod tests;
