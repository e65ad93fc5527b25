use super::export::{ArchiveKind, LZIP_PROGRAM, TAR_PROGRAM};
use super::{emit_workspace, require_synced, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::naming::name_to_path;
use atelier_core::{CoreError, Invocation, Workspace};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const UNZIP_PROGRAM: &str = "unzip";

pub fn run(input: &Path, dest: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let Some(kind) = detect_kind(input).map_err(CoreError::Io)? else {
        return Err(CliError::Usage(format!(
            "{} is not an archive format this tool can import",
            input.display()
        )));
    };

    // Scratch space on the destination mount; dest itself may not exist
    // yet, so anchor at its closest existing ancestor.
    let mut anchor = dest.to_path_buf();
    while !anchor.exists() {
        anchor = match anchor.parent() {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        };
    }
    let scratch = tempfile::tempdir_in(&anchor).map_err(CoreError::Io)?;
    let unpack_dir = scratch.path().join("unpack");
    std::fs::create_dir(&unpack_dir).map_err(CoreError::Io)?;
    debug!("unpacking {} into {}", input.display(), unpack_dir.display());

    match kind {
        ArchiveKind::Zip => {
            Invocation::new(UNZIP_PROGRAM)
                .arg("-q")
                .arg("-d")
                .arg(unpack_dir.display().to_string())
                .arg(input.display().to_string())
                .run()
                .map_err(CliError::Core)?;
        }
        ArchiveKind::Tar => {
            Invocation::new(TAR_PROGRAM)
                .arg(format!("--use-compress-program={LZIP_PROGRAM}"))
                .arg("-C")
                .arg(unpack_dir.display().to_string())
                .arg("-x")
                .arg("-f")
                .arg(input.display().to_string())
                .run()
                .map_err(CliError::Core)?;
        }
    }

    // The workspace is either the unpack root itself (zip of contents) or
    // a single directory below it (tarball convention).
    let mut candidates = vec![unpack_dir.clone()];
    if let Ok(entries) = std::fs::read_dir(&unpack_dir) {
        candidates.extend(entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()));
    }

    for candidate in candidates {
        let Ok(mut ws) = Workspace::open(&candidate) else {
            continue;
        };
        debug!("found workspace root at {}", candidate.display());
        let target =
            name_to_path(ws.metadata().name().unwrap_or(""), dest).map_err(CliError::Core)?;
        ws.relocate(&target).map_err(CliError::Core)?;
        let outcome = ws.sync().map_err(CliError::Core)?;
        require_synced(outcome)?;
        // Imports count as copies; they must not share the source identity.
        ws.metadata_mut().assign_new_identity();
        emit_workspace(format, &ws)?;
        ws.close().map_err(CliError::Core)?;
        return Ok(EXIT_SUCCESS);
    }

    Err(CliError::Usage(format!(
        "no valid workspace found in {}",
        input.display()
    )))
}

fn detect_kind(input: &Path) -> Result<Option<ArchiveKind>, std::io::Error> {
    let mut magic = [0u8; 4];
    let mut fd = std::fs::File::open(input)?;
    let n = fd.read(&mut magic)?;
    Ok(match &magic[..n] {
        [0x50, 0x4b, 0x03, 0x04] => Some(ArchiveKind::Zip),
        b"LZIP" => Some(ArchiveKind::Tar),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_zip_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.zip");
        std::fs::write(&path, [0x50, 0x4b, 0x03, 0x04, 0x00]).unwrap();
        assert_eq!(detect_kind(&path).unwrap(), Some(ArchiveKind::Zip));
    }

    #[test]
    fn detects_lzip_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar.lz");
        std::fs::write(&path, b"LZIP\x01rest").unwrap();
        assert_eq!(detect_kind(&path).unwrap(), Some(ArchiveKind::Tar));
    }

    #[test]
    fn unknown_magic_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"????").unwrap();
        assert_eq!(detect_kind(&path).unwrap(), None);
    }

    #[test]
    fn short_files_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny");
        std::fs::write(&path, b"PK").unwrap();
        assert_eq!(detect_kind(&path).unwrap(), None);
    }
}
