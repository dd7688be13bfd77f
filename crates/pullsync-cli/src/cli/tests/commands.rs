use std::path::PathBuf;

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_run_defaults() {
    let cli = parse(&["pullsync", "run"]);
    assert!(!cli.verbose);
    match cli.command {
        CliCommand::Run {
            config,
            lftp,
            extractor,
        } => {
            assert!(config.is_none());
            assert_eq!(lftp, PathBuf::from("lftp"));
            assert_eq!(extractor, PathBuf::from("7z"));
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_with_options() {
    let cli = parse(&[
        "pullsync",
        "run",
        "--config",
        "/etc/pullsync.toml",
        "--lftp",
        "/opt/lftp/bin/lftp",
        "-v",
    ]);
    assert!(cli.verbose);
    match cli.command {
        CliCommand::Run { config, lftp, .. } => {
            assert_eq!(config, Some(PathBuf::from("/etc/pullsync.toml")));
            assert_eq!(lftp, PathBuf::from("/opt/lftp/bin/lftp"));
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_config() {
    match parse(&["pullsync", "config"]).command {
        CliCommand::Config { config } => assert!(config.is_none()),
        _ => panic!("expected Config"),
    }
}

#[test]
fn cli_parse_parse_status() {
    match parse(&["pullsync", "--verbose", "parse-status", "dump.txt", "--json"]).command {
        CliCommand::ParseStatus { file, json } => {
            assert_eq!(file, PathBuf::from("dump.txt"));
            assert!(json);
        }
        _ => panic!("expected ParseStatus"),
    }
}

#[test]
fn cli_rejects_missing_subcommand_and_file() {
    assert!(Cli::try_parse_from(["pullsync"]).is_err());
    assert!(Cli::try_parse_from(["pullsync", "parse-status"]).is_err());
    assert!(Cli::try_parse_from(["pullsync", "status"]).is_err());
}

#[test]
fn config_command_reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let text = toml::to_string_pretty(&pullsync_core::config::PullsyncConfig::default()).unwrap();
    std::fs::write(&path, text).unwrap();

    let (cfg, loaded_from) = crate::cli::load_config(Some(&path)).unwrap();
    assert_eq!(loaded_from, path);
    assert_eq!(cfg.lftp.num_max_parallel_downloads, 2);

    let missing = crate::cli::load_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
    assert!(format!("{:#}", missing).contains("missing.toml"));
}
