//! Filesystem storage: image layout and the process lock

mod images;
mod lockfile;

pub use images::{local_time, ImageStore};
pub use lockfile::ProcessLock;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error at {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Snapshot too small ({0} bytes), likely corrupt")]
    TooSmall(usize),
}
