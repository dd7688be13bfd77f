//! Remote and local listings consumed by the remote-scan and local-scan passes.

mod local;
mod remote;

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::model::ItemKind;

pub use local::FsLocalLister;
pub use remote::{parse_listing, parse_remote_output, parse_tree_sizes, LftpRemoteLister};

/// One top-level entry under the remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: ItemKind,
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, kind: ItemKind, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
        }
    }
}

/// One top-level entry under the local path. Directory sizes are summed recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("remote listing failed ({status}): {stderr}")]
    Command { status: String, stderr: String },
    #[error("remote listing timed out after {0} ms")]
    Timeout(u128),
    #[error("unreadable listing line `{0}`")]
    Malformed(String),
}

#[async_trait]
pub trait RemoteLister: Send + Sync {
    /// Entries in listing order.
    async fn list(&self) -> Result<Vec<RemoteEntry>, ListingError>;
}

#[async_trait]
pub trait LocalLister: Send + Sync {
    async fn list(&self) -> Result<Vec<LocalEntry>, ListingError>;
}

#[cfg(test)]
mod tests;
