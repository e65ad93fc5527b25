use crate::FsError;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cooperative, file-presence-based mutual exclusion.
///
/// The lock is held exactly while the lock file exists, which makes the held
/// state visible to any process sharing the directory, including processes on
/// other hosts when the directory lives on an NFS mount. Acquisition uses
/// `O_CREAT|O_EXCL` so that create-and-check is a single atomic step.
///
/// There is no blocking and no retry: contention surfaces immediately as
/// [`FsError::Busy`] and retry policy stays with the caller.
pub struct Softlock {
    path: PathBuf,
}

impl Softlock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, FsError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(FsError::Busy),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Softlock {
    fn drop(&mut self) {
        // The workspace may have been deleted or renamed away while we held
        // the lock; cleanup past that point is best-effort.
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                debug!("could not release lock {}: {e}", self.path.display());
            }
        }
    }
}
