//! Filesystem primitives for atelier workspaces.
//!
//! This crate provides the pieces of the engine that talk to the filesystem
//! below the workspace abstraction: the crash-safe `Softlock` used to
//! serialize metadata writes and profile rebuilds across processes, mount
//! probing to distinguish local from NFS storage, the ACL translation layer
//! (POSIX `setfacl` on local mounts, NFSv4 tooling on NFS), and recursive
//! directory copying.

pub mod acl;
pub mod copy;
pub mod lock;
pub mod mount;
pub mod realm;

pub use acl::{
    get_permissions, grant, revoke, AclEntry, AclSnapshot, GrantScope, PermissionTarget, Rights,
};
pub use copy::copy_dir;
pub use lock::Softlock;
pub use mount::{is_nfs, mount_info, mount_point, MountInfo};
pub use realm::default_realm;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    /// Another process holds the lock. Never retried here; callers decide.
    #[error("lock is held by another process")]
    Busy,
    #[error("cannot set permissions on '{path}': {detail}")]
    AclWrite { path: String, detail: String },
    #[error("cannot read permissions on '{path}': {detail}")]
    AclRead { path: String, detail: String },
    #[error("no mount table entry for '{0}'")]
    UnknownMount(String),
    #[error("no default Kerberos realm configured")]
    NoRealm,
    #[error("'{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
