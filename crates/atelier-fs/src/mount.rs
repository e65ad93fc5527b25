use crate::FsError;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

const MOUNT_TABLE: &str = "/proc/mounts";

/// One entry of the kernel mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub source: String,
    pub dest: PathBuf,
    pub kind: String,
    pub options: String,
}

/// Resolve the mount point a path lives on.
///
/// Walks up from the canonicalized path until the device id changes between
/// a directory and its parent.
pub fn mount_point(path: &Path) -> Result<PathBuf, FsError> {
    let mut current = path.canonicalize()?;
    loop {
        let parent = match current.parent() {
            Some(p) => p.to_path_buf(),
            None => return Ok(current),
        };
        let dev = current.symlink_metadata()?.dev();
        let parent_dev = parent.symlink_metadata()?.dev();
        if dev != parent_dev {
            return Ok(current);
        }
        current = parent;
    }
}

/// Mount table entry for the mount point of `path`.
///
/// When several entries share the mount point, the last one wins: later
/// mounts shadow earlier ones.
pub fn mount_info(path: &Path) -> Result<MountInfo, FsError> {
    let point = mount_point(path)?;
    let table = std::fs::read_to_string(MOUNT_TABLE)?;
    parse_mount_table(&table)
        .into_iter()
        .filter(|m| m.dest == point)
        .next_back()
        .ok_or_else(|| FsError::UnknownMount(point.display().to_string()))
}

/// Whether `path` lives on an NFS mount.
pub fn is_nfs(path: &Path) -> Result<bool, FsError> {
    Ok(mount_info(path)?.kind.starts_with("nfs"))
}

pub(crate) fn parse_mount_table(table: &str) -> Vec<MountInfo> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let dest = fields.next()?;
            let kind = fields.next()?;
            let options = fields.next()?;
            Some(MountInfo {
                source: unescape(source),
                dest: PathBuf::from(unescape(dest)),
                kind: kind.to_owned(),
                options: options.to_owned(),
            })
        })
        .collect()
}

// The kernel escapes space, tab, newline and backslash as octal (e.g. \040).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = &field[i + 1..i + 4];
            if let Ok(v) = u8::from_str_radix(oct, 8) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_a_mount_point() {
        assert_eq!(mount_point(Path::new("/")).unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn parse_basic_table() {
        let table = "proc /proc proc rw,nosuid 0 0\n\
                     srv:/export /data nfs4 rw,vers=4.2 0 0\n";
        let entries = parse_mount_table(table);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].source, "srv:/export");
        assert_eq!(entries[1].dest, PathBuf::from("/data"));
        assert_eq!(entries[1].kind, "nfs4");
    }

    #[test]
    fn parse_skips_short_lines() {
        let entries = parse_mount_table("garbage\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn unescape_decodes_octal_space() {
        assert_eq!(unescape(r"/mnt/with\040space"), "/mnt/with space");
    }

    #[test]
    fn unescape_leaves_plain_paths_alone() {
        assert_eq!(unescape("/mnt/plain"), "/mnt/plain");
    }

    #[test]
    fn nfs_kinds_match_prefix() {
        let table = "srv:/a /a nfs rw 0 0\nsrv:/b /b nfs4 rw 0 0\n/dev/sda1 /c ext4 rw 0 0\n";
        let entries = parse_mount_table(table);
        assert!(entries[0].kind.starts_with("nfs"));
        assert!(entries[1].kind.starts_with("nfs"));
        assert!(!entries[2].kind.starts_with("nfs"));
    }

    #[test]
    fn last_matching_entry_wins() {
        let table = "a /data ext4 rw 0 0\nb /data nfs4 rw 0 0\n";
        let entries = parse_mount_table(table);
        let last = entries
            .into_iter()
            .filter(|m| m.dest == PathBuf::from("/data"))
            .next_back()
            .unwrap();
        assert_eq!(last.source, "b");
    }
}
