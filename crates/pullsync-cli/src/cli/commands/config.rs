//! `pullsync config` – print the effective configuration.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::load_config;

pub fn run_config(path: Option<&Path>) -> Result<()> {
    let (cfg, path) = load_config(path)?;
    let text = toml::to_string_pretty(&cfg.redacted()).context("serialize config")?;
    println!("# {}", path.display());
    if let Ok(log) = pullsync_core::logging::log_file_path() {
        println!("# log: {}", log.display());
    }
    print!("{}", text);
    Ok(())
}
