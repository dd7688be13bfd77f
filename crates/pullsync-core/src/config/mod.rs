//! Daemon configuration loaded from `~/.config/pullsync/config.toml`.
//!
//! Each section is a plain struct; bounds are checked by the free functions in
//! [`validate`] after deserialization, so a loaded config is always valid.

mod validate;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::{ConnectionLimits, RemoteCredentials};

pub use validate::{check_hostname, check_nonempty, check_positive};

/// Error returned when the configuration cannot be read or fails validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field failed its bound check.
    #[error("Bad config: {section}.{field}{detail}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        detail: String,
    },
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("locate config dir: {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    pub debug: bool,
    pub verbose: bool,
}

/// Remote server and lftp transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LftpConfig {
    pub remote_address: String,
    pub remote_username: String,
    #[serde(default)]
    pub remote_password: String,
    pub remote_port: u16,
    /// Remote directory whose entries are mirrored.
    pub remote_path: String,
    /// Local directory that receives the downloads.
    pub local_path: String,
    pub use_ssh_key: bool,
    /// Global admission cap: items downloading at once.
    pub num_max_parallel_downloads: u32,
    /// Files fetched in parallel inside one directory (mirror) job.
    pub num_max_parallel_files_per_download: u32,
    /// Connections per single-file (pget) job.
    pub num_max_connections_per_root_file: u32,
    /// Connections per file inside a mirror job.
    pub num_max_connections_per_dir_file: u32,
    /// Connection limit enforced by lftp across all jobs; 0 = unlimited.
    pub num_max_total_connections: u32,
    pub use_temp_file: bool,
    /// Timeout for one lftp command/response cycle.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

impl Default for LftpConfig {
    fn default() -> Self {
        Self {
            remote_address: "seedbox.example.com".to_string(),
            remote_username: "user".to_string(),
            remote_password: "changeme".to_string(),
            remote_port: 22,
            remote_path: "/home/user/files".to_string(),
            local_path: "/srv/downloads".to_string(),
            use_ssh_key: false,
            num_max_parallel_downloads: 2,
            num_max_parallel_files_per_download: 4,
            num_max_connections_per_root_file: 4,
            num_max_connections_per_dir_file: 4,
            num_max_total_connections: 16,
            use_temp_file: false,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

/// Scan cadence and post-download handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub interval_ms_remote_scan: u64,
    pub interval_ms_local_scan: u64,
    pub interval_ms_downloading_scan: u64,
    pub extract_path: String,
    pub use_local_path_as_extract_path: bool,
    /// Failed attempts (rejected start or unconfirmed completion) before an item is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long a vanished job may wait for the local scan to confirm it.
    #[serde(default = "default_confirmation_grace_ms")]
    pub confirmation_grace_ms: u64,
    /// Bounded wait for in-flight passes on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_confirmation_grace_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval_ms_remote_scan: 30_000,
            interval_ms_local_scan: 10_000,
            interval_ms_downloading_scan: 1_000,
            extract_path: "/srv/downloads".to_string(),
            use_local_path_as_extract_path: true,
            max_retries: default_max_retries(),
            confirmation_grace_ms: default_confirmation_grace_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoQueueConfig {
    pub enabled: bool,
    /// Only queue names matching at least one of `patterns`.
    pub patterns_only: bool,
    pub auto_extract: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for AutoQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns_only: false,
            auto_extract: true,
            patterns: Vec::new(),
        }
    }
}

/// Global configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullsyncConfig {
    pub general: GeneralConfig,
    pub lftp: LftpConfig,
    pub controller: ControllerConfig,
    pub autoqueue: AutoQueueConfig,
}

impl PullsyncConfig {
    /// Checks every bounded field; returns the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.lftp;
        check_hostname("lftp", "remote_address", &l.remote_address)?;
        check_nonempty("lftp", "remote_username", &l.remote_username)?;
        if !l.use_ssh_key {
            check_nonempty("lftp", "remote_password", &l.remote_password)?;
        }
        check_positive("lftp", "remote_port", u64::from(l.remote_port))?;
        check_nonempty("lftp", "remote_path", &l.remote_path)?;
        check_nonempty("lftp", "local_path", &l.local_path)?;
        check_positive(
            "lftp",
            "num_max_parallel_downloads",
            u64::from(l.num_max_parallel_downloads),
        )?;
        check_positive(
            "lftp",
            "num_max_parallel_files_per_download",
            u64::from(l.num_max_parallel_files_per_download),
        )?;
        check_positive(
            "lftp",
            "num_max_connections_per_root_file",
            u64::from(l.num_max_connections_per_root_file),
        )?;
        check_positive(
            "lftp",
            "num_max_connections_per_dir_file",
            u64::from(l.num_max_connections_per_dir_file),
        )?;
        check_positive("lftp", "command_timeout_ms", l.command_timeout_ms)?;

        let c = &self.controller;
        check_positive("controller", "interval_ms_remote_scan", c.interval_ms_remote_scan)?;
        check_positive("controller", "interval_ms_local_scan", c.interval_ms_local_scan)?;
        check_positive(
            "controller",
            "interval_ms_downloading_scan",
            c.interval_ms_downloading_scan,
        )?;
        check_nonempty("controller", "extract_path", &c.extract_path)?;
        check_positive("controller", "max_retries", u64::from(c.max_retries))?;
        check_positive("controller", "shutdown_grace_ms", c.shutdown_grace_ms)?;
        Ok(())
    }

    /// Directory archives are extracted into.
    pub fn extract_dir(&self) -> PathBuf {
        if self.controller.use_local_path_as_extract_path {
            PathBuf::from(&self.lftp.local_path)
        } else {
            PathBuf::from(&self.controller.extract_path)
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.lftp.command_timeout_ms)
    }

    pub fn credentials(&self) -> RemoteCredentials {
        RemoteCredentials {
            address: self.lftp.remote_address.clone(),
            port: self.lftp.remote_port,
            username: self.lftp.remote_username.clone(),
            password: self.lftp.remote_password.clone(),
            use_ssh_key: self.lftp.use_ssh_key,
        }
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        let l = &self.lftp;
        ConnectionLimits {
            max_parallel_downloads: l.num_max_parallel_downloads,
            max_files_per_download: l.num_max_parallel_files_per_download,
            max_connections_per_root_file: l.num_max_connections_per_root_file,
            max_connections_per_dir_file: l.num_max_connections_per_dir_file,
            max_total_connections: l.num_max_total_connections,
            use_temp_file: l.use_temp_file,
        }
    }

    /// Copy suitable for printing: the password is masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if !cfg.lftp.remote_password.is_empty() {
            cfg.lftp.remote_password = "********".to_string();
        }
        cfg
    }
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pullsync")?;
    xdg_dirs
        .place_config_file("config.toml")
        .map_err(|source| ConfigError::Io {
            path: xdg_dirs.get_config_home(),
            source,
        })
}

/// Parse and validate a config from TOML text. `origin` is only used in error messages.
pub fn from_toml_str(data: &str, origin: &Path) -> Result<PullsyncConfig, ConfigError> {
    let cfg: PullsyncConfig = toml::from_str(data).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate the config at `path`.
pub fn load_from_path(path: &Path) -> Result<PullsyncConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml_str(&data, path)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PullsyncConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PullsyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, toml).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}

#[cfg(test)]
mod tests;
