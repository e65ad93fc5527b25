//! Workspace synchronization and lifecycle engine for atelier.
//!
//! A workspace is a directory binding a declarative Guix environment to a
//! set of collaborating users. This crate owns the hard parts: deciding when
//! the materialized profile is stale relative to its declarative inputs,
//! serializing rebuilds and metadata writes across processes with softlocks,
//! persisting workspace metadata with atomic-replace semantics, and driving
//! the external package manager with orderly shutdown on interruption.

pub mod document;
pub mod gcroots;
pub mod identity;
pub mod layout;
pub mod manifest;
pub mod naming;
pub mod packages;
pub mod runner;
pub mod sync;
pub mod workspace;

pub use document::Metadata;
pub use identity::random_id;
pub use layout::WorkspaceLayout;
pub use packages::InstalledPackage;
pub use runner::{install_signal_handler, shutdown_requested, ExecutionFailed, Invocation};
pub use sync::{ProfileState, SyncEngine, SyncOutcome};
pub use workspace::{current_user, Workspace, WorkspaceDescription};

use atelier_fs::FsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The directory has no parseable metadata document. Never treated as
    /// an empty-but-valid workspace.
    #[error("not a valid workspace: {0}")]
    InvalidWorkspace(String),
    /// Lock contention; the caller may retry, this engine never does.
    #[error("workspace is busy")]
    Busy,
    /// The package manager reported specific packages that failed to build.
    /// The manifest itself is likely still structurally valid.
    #[error("packages failed to build: {}", .0.join(", "))]
    PackageBuildFailure(Vec<String>),
    /// The package manager could not load the manifest at all.
    #[error("the manifest cannot be loaded by the package manager")]
    BrokenManifest,
    #[error("destination '{0}' already exists")]
    DestinationExists(std::path::PathBuf),
    #[error("metadata key '{0}' is reserved")]
    ReservedKey(String),
    #[error("cannot edit manifest: {0}")]
    ManifestEdit(String),
    #[error(transparent)]
    Execution(#[from] ExecutionFailed),
    /// The calling process was interrupted; the running subprocess has been
    /// shut down before this was raised.
    #[error("operation interrupted")]
    Interrupted,
    #[error("filesystem error: {0}")]
    Fs(FsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<FsError> for CoreError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Busy => CoreError::Busy,
            other => CoreError::Fs(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_lock_maps_to_busy() {
        let err: CoreError = FsError::Busy.into();
        assert!(matches!(err, CoreError::Busy));
    }

    #[test]
    fn other_fs_errors_stay_wrapped() {
        let err: CoreError = FsError::NoRealm.into();
        assert!(matches!(err, CoreError::Fs(_)));
    }

    #[test]
    fn package_failure_lists_names() {
        let err = CoreError::PackageBuildFailure(vec!["foo".to_owned(), "bar".to_owned()]);
        assert!(err.to_string().contains("foo, bar"));
    }
}
