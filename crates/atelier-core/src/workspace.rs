//! The workspace lifecycle manager.
//!
//! A [`Workspace`] is an explicit scoped handle over a directory: opened
//! (metadata loaded), mutated (metadata edits, resynchronization,
//! permission grants) and closed (pending metadata flushed exactly once).
//! Copies share file content but never identity; moves are renames that
//! re-register path-keyed GC roots.

use crate::document::Metadata;
use crate::gcroots::ensure_gcroots;
use crate::layout::WorkspaceLayout;
use crate::naming::name_to_path;
use crate::packages::{installed_packages, InstalledPackage};
use crate::sync::{SyncEngine, SyncOutcome};
use crate::CoreError;
use atelier_fs::{acl, copy_dir, AclSnapshot, GrantScope, PermissionTarget, Rights};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct Workspace {
    directory: PathBuf,
    layout: WorkspaceLayout,
    metadata: Metadata,
}

/// Snapshot of a workspace for presentation: the CLI renders this as
/// human, YAML, or JSON output.
#[derive(Debug, Serialize)]
pub struct WorkspaceDescription {
    pub path: PathBuf,
    pub profile_path: PathBuf,
    pub metadata: Metadata,
    pub permissions: AclSnapshot,
    pub packages: Vec<InstalledPackage>,
}

impl Workspace {
    /// Open an existing workspace. The metadata document must exist and
    /// parse; any other condition is an invalid workspace, never an
    /// empty-but-valid one.
    pub fn open(directory: &Path) -> Result<Self, CoreError> {
        let directory = directory
            .canonicalize()
            .map_err(|e| CoreError::InvalidWorkspace(format!("{}: {e}", directory.display())))?;
        let layout = WorkspaceLayout::new(&directory);
        let metadata = Metadata::load(&layout.metadata_path())?;
        Ok(Self {
            directory,
            layout,
            metadata,
        })
    }

    /// Prepare a new workspace with a fresh identity. Nothing is written
    /// until [`Workspace::init`] or [`Workspace::close`].
    pub fn create(name: &str, suggested_dir: &Path) -> Result<Self, CoreError> {
        let directory = name_to_path(name, suggested_dir)?;
        let mut metadata = Metadata::new(current_user());
        if !name.is_empty() {
            metadata.set_name(name);
        }
        let layout = WorkspaceLayout::new(&directory);
        Ok(Self {
            directory,
            layout,
            metadata,
        })
    }

    /// First-time initialization: owner permissions before anything else
    /// is written (so every later file inherits them), first profile
    /// synchronization, metadata, GC roots.
    pub fn init(&mut self) -> Result<SyncOutcome, CoreError> {
        info!("initializing workspace at {}", self.directory.display());
        std::fs::create_dir_all(&self.directory)?;
        self.apply_owner_defaults()?;
        let outcome = SyncEngine::new(&self.layout).ensure_profile()?;
        self.metadata.flush(&self.layout)?;
        ensure_gcroots(&self.layout)?;
        Ok(outcome)
    }

    /// Flush pending metadata and give up the handle.
    pub fn close(mut self) -> Result<(), CoreError> {
        self.metadata.flush(&self.layout)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Synchronize the profile with its declarative inputs.
    pub fn sync(&self) -> Result<SyncOutcome, CoreError> {
        SyncEngine::new(&self.layout).ensure_profile()
    }

    /// Byte-for-byte copy into a fresh directory. The copy is a logically
    /// distinct workspace: new identity, its own permissions and profile.
    pub fn copy(&self, suggested_dest: &Path) -> Result<(Self, SyncOutcome), CoreError> {
        let dest = name_to_path(self.metadata.name().unwrap_or(""), suggested_dest)?;
        info!(
            "copying workspace {} to {}",
            self.directory.display(),
            dest.display()
        );
        std::fs::create_dir_all(&dest)?;
        copy_dir(&self.directory, &dest)?;

        let mut copy = Self::open(&dest)?;
        copy.metadata.assign_new_identity();
        copy.apply_owner_defaults()?;
        let outcome = SyncEngine::new(&copy.layout).ensure_profile()?;
        copy.metadata.flush(&copy.layout)?;
        ensure_gcroots(&copy.layout)?;
        Ok((copy, outcome))
    }

    /// Relocate the directory in place. GC-root registrations are
    /// path-keyed, so they are re-made under the new path; the stale ones
    /// dangle and the package manager drops them on its own.
    pub fn relocate(&mut self, dest: &Path) -> Result<(), CoreError> {
        if dest.exists() {
            return Err(CoreError::DestinationExists(dest.to_path_buf()));
        }
        info!(
            "moving workspace {} to {}",
            self.directory.display(),
            dest.display()
        );
        std::fs::rename(&self.directory, dest)?;
        self.directory = dest.canonicalize()?;
        self.layout = WorkspaceLayout::new(&self.directory);
        ensure_gcroots(&self.layout)?;
        Ok(())
    }

    /// Grant or revoke rights for a principal, recursively and with
    /// inheritance for files created later.
    pub fn share(
        &self,
        target: PermissionTarget,
        qualifier: Option<&str>,
        write: bool,
        remove: bool,
    ) -> Result<(), CoreError> {
        let rights = if write {
            Rights::read_write()
        } else {
            Rights::read_only()
        };
        let existing = GrantScope {
            default: false,
            recursive: true,
        };
        let inherited = GrantScope {
            default: true,
            recursive: true,
        };
        if remove {
            acl::revoke(target, qualifier, &self.directory, existing)?;
            acl::revoke(target, qualifier, &self.directory, inherited)?;
            debug!("ancestor directory rights are not revoked automatically");
        } else {
            acl::grant(target, qualifier, rights, &self.directory, existing)?;
            acl::grant(target, qualifier, rights, &self.directory, inherited)?;
            self.widen_ancestors(target, qualifier);
        }
        Ok(())
    }

    pub fn describe(&self) -> Result<WorkspaceDescription, CoreError> {
        Ok(WorkspaceDescription {
            path: self.directory.clone(),
            profile_path: self.layout.profile_path(),
            metadata: self.metadata.clone(),
            permissions: acl::get_permissions(&self.directory)?,
            packages: installed_packages(&self.layout)?,
        })
    }

    // Files created by collaborators must stay accessible to the owner;
    // the default-inheriting entry has to exist before any content.
    fn apply_owner_defaults(&self) -> Result<(), CoreError> {
        acl::grant(
            PermissionTarget::User,
            Some(&current_user()),
            Rights::read_write(),
            &self.directory,
            GrantScope {
                default: true,
                recursive: true,
            },
        )?;
        Ok(())
    }

    // Collaborators need traversal rights on every ancestor to reach the
    // workspace at all. Failing to widen an ancestor is not fatal to
    // sharing the workspace itself.
    fn widen_ancestors(&self, target: PermissionTarget, qualifier: Option<&str>) {
        for dir in self.directory.ancestors().skip(1) {
            if dir == Path::new("/") {
                continue;
            }
            if let Err(e) = acl::grant(
                target,
                qualifier,
                Rights::read_only(),
                dir,
                GrantScope::default(),
            ) {
                debug!("cannot widen ancestor {}: {e}", dir.display());
            }
        }
    }
}

/// The invoking user's name, taken from the login environment.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_owned())
}
