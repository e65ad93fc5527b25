use crate::FsError;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub const RSYNC_PROGRAM: &str = "rsync";

// rsync exit code for a partial transfer; files the caller cannot read are
// skipped rather than failing the whole copy.
const PARTIAL_TRANSFER: i32 = 23;

/// Recursively copy a directory's contents, preserving symlinks, group,
/// executability and timestamps. Unreadable files are skipped.
pub fn copy_dir(source: &Path, dest: &Path) -> Result<(), FsError> {
    // A trailing slash makes rsync copy contents rather than the directory.
    let mut src = source.display().to_string();
    if !src.ends_with('/') {
        src.push('/');
    }
    let mut dst = dest.display().to_string();
    if !dst.ends_with('/') {
        dst.push('/');
    }

    let mut cmd = Command::new(RSYNC_PROGRAM);
    cmd.args([
        "--recursive",
        "--links",
        "--group",
        "--executability",
        // --sparse and --preallocate do not work on NFS
        "--times",
    ]);
    cmd.arg(&src).arg(&dst);
    debug!("copying {src} to {dst}");

    let output = cmd.output()?;
    let status = output.status.code().unwrap_or(-1);
    if status != 0 && status != PARTIAL_TRANSFER {
        return Err(FsError::CommandFailed {
            command: RSYNC_PROGRAM.to_owned(),
            status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn rsync_available() -> bool {
        Command::new(RSYNC_PROGRAM)
            .arg("--version")
            .output()
            .is_ok()
    }

    #[test]
    fn copies_files_and_symlinks() {
        if !rsync_available() {
            return;
        }
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("sub").join("data.txt"), "payload").unwrap();
        symlink("sub/data.txt", src.path().join("link")).unwrap();

        copy_dir(src.path(), dst.path()).unwrap();

        assert_eq!(
            std::fs::read_to_string(dst.path().join("sub").join("data.txt")).unwrap(),
            "payload"
        );
        let link = dst.path().join("link");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn missing_source_fails() {
        if !rsync_available() {
            return;
        }
        let dst = tempfile::tempdir().unwrap();
        let result = copy_dir(Path::new("/nonexistent/source"), dst.path());
        assert!(result.is_err());
    }
}
