//! ACL abstraction over POSIX and NFSv4 permission models.
//!
//! Grants and revocations are expressed as (target, qualifier, rights) and
//! translated into `setfacl` invocations on local mounts or `nfs4_setfacl`
//! on NFS mounts, where principals must carry a Kerberos realm suffix and
//! inheritance is a flag combination instead of a separate default entry.
//!
//! Mask entries: `setfacl` recalculates the mask after every modification
//! (atelier never passes `-n`), so the mask always covers the union of the
//! granted rights. Snapshots report the union of explicit entry bits and
//! skip the mask entry itself.

use crate::{mount, realm, FsError};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub const SETFACL_PROGRAM: &str = "setfacl";
pub const GETFACL_PROGRAM: &str = "getfacl";
pub const NFS4_SETFACL_PROGRAM: &str = "nfs4_setfacl";
pub const NFS4_GETFACL_PROGRAM: &str = "nfs4_getfacl";

/// Class of principal an ACL operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTarget {
    User,
    Group,
    Other,
}

impl PermissionTarget {
    fn posix_tag(self) -> char {
        match self {
            PermissionTarget::User => 'u',
            PermissionTarget::Group => 'g',
            PermissionTarget::Other => 'o',
        }
    }
}

/// Abstract permission bits. `traverse` maps to `X` on grants so plain
/// files are not made executable by recursive operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rights {
    pub read: bool,
    pub write: bool,
    pub traverse: bool,
}

impl Rights {
    pub const READ: Self = Self {
        read: true,
        write: false,
        traverse: false,
    };

    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            traverse: true,
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            traverse: true,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            read: self.read || other.read,
            write: self.write || other.write,
            traverse: self.traverse || other.traverse,
        }
    }

    pub fn is_empty(self) -> bool {
        !(self.read || self.write || self.traverse)
    }

    /// Parse the `rwx` triple of a `getfacl` entry; `-` and unknown
    /// characters are ignored.
    pub fn parse(bits: &str) -> Self {
        let mut rights = Self::default();
        for c in bits.chars() {
            match c {
                'r' => rights.read = true,
                'w' => rights.write = true,
                'x' | 'X' => rights.traverse = true,
                _ => {}
            }
        }
        rights
    }

    fn posix_spec(self) -> String {
        let mut spec = String::new();
        if self.read {
            spec.push('r');
        }
        if self.write {
            spec.push('w');
        }
        if self.traverse {
            spec.push('X');
        }
        if spec.is_empty() {
            spec.push('-');
        }
        spec
    }

    fn nfs4_spec(self) -> String {
        let mut spec = String::new();
        if self.read {
            spec.push('R');
        }
        if self.write {
            spec.push('W');
        }
        if self.traverse {
            spec.push('X');
        }
        spec
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read {
            write!(f, "r")?;
        }
        if self.write {
            write!(f, "w")?;
        }
        if self.traverse {
            write!(f, "x")?;
        }
        Ok(())
    }
}

impl Serialize for Rights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inheritance and recursion flags for a grant or revocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantScope {
    /// Install a default (inheritable) entry; directories only.
    pub default: bool,
    /// Apply to every existing file and directory below the path.
    pub recursive: bool,
}

/// One resolved entry of a permission snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclEntry {
    pub name: String,
    pub rights: Rights,
    /// The owning user may not have their files deleted by collaborators.
    pub delete_protected: bool,
}

/// Permission view of a path: explicit entries per principal class.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AclSnapshot {
    pub owner: Option<AclEntry>,
    pub owning_group: Option<AclEntry>,
    pub users: BTreeMap<String, Rights>,
    pub groups: BTreeMap<String, Rights>,
    pub other: Rights,
}

impl AclSnapshot {
    /// Effective rights per principal. Permission classes are additive, so
    /// the world entry widens every listed principal rather than forming a
    /// disjoint bucket.
    pub fn effective(&self) -> BTreeMap<String, Rights> {
        let mut out: BTreeMap<String, Rights> = BTreeMap::new();
        let mut fold = |name: &str, rights: Rights| {
            let merged = out
                .get(name)
                .copied()
                .unwrap_or_default()
                .union(rights)
                .union(self.other);
            out.insert(name.to_owned(), merged);
        };
        if let Some(owner) = &self.owner {
            fold(&owner.name, owner.rights);
        }
        if let Some(group) = &self.owning_group {
            fold(&group.name, group.rights);
        }
        for (name, rights) in &self.users {
            fold(name, *rights);
        }
        for (name, rights) in &self.groups {
            fold(name, *rights);
        }
        out
    }
}

/// Grant `rights` to a principal on `path`.
pub fn grant(
    target: PermissionTarget,
    qualifier: Option<&str>,
    rights: Rights,
    path: &Path,
    scope: GrantScope,
) -> Result<(), FsError> {
    apply(target, qualifier, rights, path, scope, false)
}

/// Revoke a principal's rights on `path`. Named entries are deleted;
/// the implicit `other` entry is set to zero bits instead.
pub fn revoke(
    target: PermissionTarget,
    qualifier: Option<&str>,
    path: &Path,
    scope: GrantScope,
) -> Result<(), FsError> {
    apply(target, qualifier, Rights::default(), path, scope, true)
}

fn apply(
    target: PermissionTarget,
    qualifier: Option<&str>,
    rights: Rights,
    path: &Path,
    scope: GrantScope,
    remove: bool,
) -> Result<(), FsError> {
    if remove && qualifier.is_none() && target != PermissionTarget::Other {
        // Unqualified user/group means the owning entry; revoking the
        // owner is meaningless.
        return Err(FsError::AclWrite {
            path: path.display().to_string(),
            detail: "refusing to revoke the owning entry".to_owned(),
        });
    }
    let mut cmd = if is_nfs_path(path)? {
        nfs4_command(target, qualifier, rights, path, scope, remove)?
    } else {
        posix_command(target, qualifier, rights, path, scope, remove)
    };
    debug!("applying ACL change: {cmd:?}");
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(FsError::AclWrite {
            path: path.display().to_string(),
            detail: exit_detail(&cmd, &output),
        });
    }
    Ok(())
}

fn posix_command(
    target: PermissionTarget,
    qualifier: Option<&str>,
    rights: Rights,
    path: &Path,
    scope: GrantScope,
    remove: bool,
) -> Command {
    let mut cmd = Command::new(SETFACL_PROGRAM);
    if scope.recursive {
        cmd.arg("-R");
    }
    let mut spec = format!("{}:{}", target.posix_tag(), qualifier.unwrap_or(""));
    if remove && qualifier.is_some() {
        // Deleting an entry ignores permission bits.
        cmd.arg("-x");
    } else {
        cmd.arg("-m");
        let bits = if remove {
            "---".to_owned()
        } else {
            rights.posix_spec()
        };
        spec.push(':');
        spec.push_str(&bits);
    }
    if scope.default {
        spec = format!("d:{spec}");
    }
    cmd.arg(spec);
    cmd.arg(path);
    cmd
}

fn nfs4_command(
    target: PermissionTarget,
    qualifier: Option<&str>,
    rights: Rights,
    path: &Path,
    scope: GrantScope,
    remove: bool,
) -> Result<Command, FsError> {
    let principal = match (target, qualifier) {
        (PermissionTarget::Other, _) => "EVERYONE@".to_owned(),
        (_, Some(q)) if q.contains('@') => q.to_owned(),
        (_, Some(q)) => format!("{q}@{}", realm::default_realm()?),
        (_, None) => "EVERYONE@".to_owned(),
    };
    let mut flags = String::new();
    if target == PermissionTarget::Group {
        flags.push('g');
    }
    if scope.default {
        // Inheritance is expressed as directory- and file-inherit flags.
        flags.push('d');
        flags.push('f');
    }
    let mut cmd = Command::new(NFS4_SETFACL_PROGRAM);
    if scope.recursive {
        cmd.arg("-R");
    }
    if remove {
        cmd.arg("-x");
        cmd.arg(format!("A:{flags}:{principal}"));
    } else {
        cmd.arg("-a");
        cmd.arg(format!("A:{flags}:{principal}:{}", rights.nfs4_spec()));
    }
    cmd.arg(path);
    Ok(cmd)
}

/// Read the permission snapshot of `path`.
pub fn get_permissions(path: &Path) -> Result<AclSnapshot, FsError> {
    let (mut cmd, nfs) = if is_nfs_path(path)? {
        let mut c = Command::new(NFS4_GETFACL_PROGRAM);
        c.arg(path);
        (c, true)
    } else {
        let mut c = Command::new(GETFACL_PROGRAM);
        c.arg("-p").arg(path);
        (c, false)
    };
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(FsError::AclRead {
            path: path.display().to_string(),
            detail: exit_detail(&cmd, &output),
        });
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(if nfs {
        parse_nfs4_acl(&text)
    } else {
        parse_posix_acl(&text)
    })
}

fn parse_posix_acl(text: &str) -> AclSnapshot {
    let mut snapshot = AclSnapshot::default();
    let mut owner_name = String::new();
    let mut group_name = String::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("# owner:") {
            owner_name = rest.trim().to_owned();
            continue;
        }
        if let Some(rest) = line.strip_prefix("# group:") {
            group_name = rest.trim().to_owned();
            continue;
        }
        if line.is_empty() || line.starts_with('#') || line.starts_with("default:") {
            continue;
        }
        // Entries may carry an "#effective:..." annotation after the bits.
        let entry = line.split_whitespace().next().unwrap_or(line);
        let mut parts = entry.splitn(3, ':');
        let (Some(kind), Some(qualifier), Some(bits)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let rights = Rights::parse(bits);
        match (kind, qualifier.is_empty()) {
            ("user", true) => {
                snapshot.owner = Some(AclEntry {
                    name: owner_name.clone(),
                    rights,
                    delete_protected: true,
                });
            }
            ("user", false) => {
                snapshot.users.insert(qualifier.to_owned(), rights);
            }
            ("group", true) => {
                snapshot.owning_group = Some(AclEntry {
                    name: group_name.clone(),
                    rights,
                    delete_protected: false,
                });
            }
            ("group", false) => {
                snapshot.groups.insert(qualifier.to_owned(), rights);
            }
            ("other", _) => snapshot.other = rights,
            // Mask entries are skipped; see the module policy note.
            _ => {}
        }
    }
    snapshot
}

fn parse_nfs4_acl(text: &str) -> AclSnapshot {
    let mut snapshot = AclSnapshot::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(4, ':');
        let (Some(kind), Some(flags), Some(principal), Some(bits)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if kind != "A" {
            continue;
        }
        let rights = Rights::parse(bits);
        match principal {
            "OWNER@" => {
                snapshot.owner = Some(AclEntry {
                    name: principal.to_owned(),
                    rights,
                    delete_protected: true,
                });
            }
            "GROUP@" => {
                snapshot.owning_group = Some(AclEntry {
                    name: principal.to_owned(),
                    rights,
                    delete_protected: false,
                });
            }
            "EVERYONE@" => snapshot.other = snapshot.other.union(rights),
            named if flags.contains('g') => {
                let merged = snapshot
                    .groups
                    .get(named)
                    .copied()
                    .unwrap_or_default()
                    .union(rights);
                snapshot.groups.insert(named.to_owned(), merged);
            }
            named => {
                let merged = snapshot
                    .users
                    .get(named)
                    .copied()
                    .unwrap_or_default()
                    .union(rights);
                snapshot.users.insert(named.to_owned(), merged);
            }
        }
    }
    snapshot
}

fn is_nfs_path(path: &Path) -> Result<bool, FsError> {
    // A freshly chosen destination may not exist yet; probe the closest
    // existing ancestor.
    let mut probe = path;
    while !probe.exists() {
        probe = match probe.parent() {
            Some(p) => p,
            None => return Ok(false),
        };
    }
    mount::is_nfs(probe)
}

fn exit_detail(cmd: &Command, output: &std::process::Output) -> String {
    format!(
        "'{:?}' exited with {}: {}",
        cmd,
        output
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
        String::from_utf8_lossy(&output.stderr).trim()
    )
}
