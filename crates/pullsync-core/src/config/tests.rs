use std::path::Path;

use super::*;

const FULL: &str = r#"
    [general]
    debug = false
    verbose = true

    [lftp]
    remote_address = "box.example.net"
    remote_username = "alice"
    remote_password = "secret"
    remote_port = 2222
    remote_path = "/home/alice/done"
    local_path = "/data/incoming"
    use_ssh_key = false
    num_max_parallel_downloads = 3
    num_max_parallel_files_per_download = 5
    num_max_connections_per_root_file = 6
    num_max_connections_per_dir_file = 2
    num_max_total_connections = 0
    use_temp_file = true

    [controller]
    interval_ms_remote_scan = 30000
    interval_ms_local_scan = 10000
    interval_ms_downloading_scan = 2000
    extract_path = "/data/extracted"
    use_local_path_as_extract_path = false

    [autoqueue]
    enabled = true
    patterns_only = true
    auto_extract = false
    patterns = ["*.mkv", "linux"]
"#;

#[test]
fn default_config_is_valid() {
    let cfg = PullsyncConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.controller.max_retries, 3);
    assert_eq!(cfg.lftp.num_max_parallel_downloads, 2);
}

#[test]
fn config_toml_roundtrip() {
    let cfg = PullsyncConfig::default();
    let toml = toml::to_string_pretty(&cfg).unwrap();
    let parsed = from_toml_str(&toml, Path::new("roundtrip.toml")).unwrap();
    assert_eq!(parsed, cfg);
}

#[test]
fn config_toml_custom_values() {
    let cfg = from_toml_str(FULL, Path::new("full.toml")).unwrap();
    assert!(cfg.general.verbose);
    assert_eq!(cfg.lftp.remote_port, 2222);
    assert_eq!(cfg.lftp.num_max_total_connections, 0);
    assert_eq!(cfg.lftp.command_timeout_ms, 10_000);
    assert_eq!(cfg.controller.confirmation_grace_ms, 30_000);
    assert_eq!(cfg.autoqueue.patterns, vec!["*.mkv", "linux"]);
    assert_eq!(cfg.extract_dir(), std::path::PathBuf::from("/data/extracted"));
}

#[test]
fn extract_dir_follows_local_path_flag() {
    let mut cfg = PullsyncConfig::default();
    cfg.controller.use_local_path_as_extract_path = true;
    assert_eq!(cfg.extract_dir(), std::path::PathBuf::from(&cfg.lftp.local_path));
}

#[test]
fn zero_interval_is_rejected() {
    let data = FULL.replace("interval_ms_local_scan = 10000", "interval_ms_local_scan = 0");
    let err = from_toml_str(&data, Path::new("bad.toml")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bad config: controller.interval_ms_local_scan (0) must be greater than 0"
    );
}

#[test]
fn out_of_range_port_is_rejected() {
    let data = FULL.replace("remote_port = 2222", "remote_port = 70000");
    let err = from_toml_str(&data, Path::new("bad.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let data = FULL.replace("remote_port = 2222", "remote_port = 0");
    let err = from_toml_str(&data, Path::new("bad.toml")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bad config: lftp.remote_port (0) must be greater than 0"
    );
}

#[test]
fn unknown_section_is_rejected() {
    let data = format!("{FULL}\n[web]\nport = 8800\n");
    let err = from_toml_str(&data, Path::new("web.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn password_optional_with_ssh_key() {
    let data = FULL
        .replace("remote_password = \"secret\"", "remote_password = \"\"")
        .replace("use_ssh_key = false", "use_ssh_key = true");
    let cfg = from_toml_str(&data, Path::new("key.toml")).unwrap();
    assert!(cfg.lftp.use_ssh_key);

    let data = FULL.replace("remote_password = \"secret\"", "remote_password = \"\"");
    let err = from_toml_str(&data, Path::new("nopass.toml")).unwrap_err();
    assert_eq!(err.to_string(), "Bad config: lftp.remote_password is empty");
}

#[test]
fn redacted_masks_password() {
    let cfg = PullsyncConfig::default().redacted();
    assert_eq!(cfg.lftp.remote_password, "********");
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, FULL).unwrap();
    let cfg = load_from_path(&path).unwrap();
    assert_eq!(cfg.lftp.remote_username, "alice");

    let missing = load_from_path(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io { .. }));
}

#[test]
fn engine_parameters_follow_lftp_section() {
    let mut cfg = PullsyncConfig::default();
    cfg.lftp.num_max_total_connections = 0;
    cfg.lftp.use_temp_file = true;

    let creds = cfg.credentials();
    assert_eq!(creds.address, cfg.lftp.remote_address);
    assert_eq!(creds.port, 22);
    assert!(!creds.use_ssh_key);

    let limits = cfg.connection_limits();
    assert_eq!(limits.max_parallel_downloads, 2);
    assert_eq!(limits.max_total_connections, 0);
    assert!(limits.use_temp_file);
    assert_eq!(cfg.command_timeout(), std::time::Duration::from_secs(10));
}
