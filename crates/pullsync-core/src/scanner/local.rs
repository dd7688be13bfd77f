//! Local listing of the download directory.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ListingError, LocalEntry, LocalLister};

pub struct FsLocalLister {
    root: PathBuf,
}

impl FsLocalLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// lftp writes in-progress files as `<name>.lftp` and keeps pget state in
/// `<name>.lftp-pget-status`.
fn is_lftp_temp(name: &str) -> bool {
    name.ends_with(".lftp") || name.ends_with(".lftp-pget-status")
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ListingError + '_ {
    move |source| ListingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl LocalLister for FsLocalLister {
    async fn list(&self) -> Result<Vec<LocalEntry>, ListingError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root)(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_error(&self.root))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_lftp_temp(&name) {
                continue;
            }
            let path = entry.path();
            let meta = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta,
                // Removed between read_dir and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&path)(e)),
            };
            let size = if meta.is_dir() {
                dir_size(&path).await?
            } else {
                meta.len()
            };
            entries.push(LocalEntry {
                name,
                is_dir: meta.is_dir(),
                size,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Sum of regular file sizes below `root`, skipping lftp temp files and not
/// following symlinks.
async fn dir_size(root: &Path) -> Result<u64, ListingError> {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(io_error(&dir)(e)),
        };
        while let Some(entry) = rd.next_entry().await.map_err(io_error(&dir))? {
            if is_lftp_temp(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let file_type = entry.file_type().await.map_err(io_error(&dir))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                match entry.metadata().await {
                    Ok(meta) => total = total.saturating_add(meta.len()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(&entry.path())(e)),
                }
            }
        }
    }
    Ok(total)
}
