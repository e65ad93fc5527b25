use super::{CliError, EXIT_SUCCESS};
use crate::output::{emit, OutputFormat};
use atelier_core::naming::name_to_dir;
use atelier_core::{CoreError, Invocation, Workspace};
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ZIP_PROGRAM: &str = "zip";
pub const TAR_PROGRAM: &str = "tar";
pub const LZIP_PROGRAM: &str = "lzip";

/// Transient and tool-managed state never belongs in an archive; the
/// profile and binary are rebuilt from the manifest and channel pin on
/// import.
pub const EXCLUDE_PATTERNS: &[&str] = &[
    ".config/guix/current*",
    ".guix-profile*",
    ".cache/**",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchiveKind {
    Zip,
    Tar,
}

impl ArchiveKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Tar => "tar.lz",
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportResult {
    path: PathBuf,
}

pub fn run(
    directory: &Path,
    kind: ArchiveKind,
    output: &Path,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;
    if output.exists() && !output.is_dir() {
        return Err(CliError::Usage(format!(
            "output file {} exists",
            output.display()
        )));
    }
    let output = resolve_output(&ws, kind, output);

    // Build in a temp directory on the destination's own mount, so
    // publication is a single atomic rename.
    let dest_dir = output.parent().unwrap_or(Path::new("."));
    let scratch = tempfile::tempdir_in(dest_dir).map_err(CoreError::Io)?;
    let archive = scratch.path().join(format!("output.{}", kind.extension()));
    debug!("building archive in {}", archive.display());

    match kind {
        ArchiveKind::Zip => {
            let mut inv = Invocation::new(ZIP_PROGRAM).current_dir(ws.directory());
            for pattern in EXCLUDE_PATTERNS {
                inv = inv.arg("-x").arg(*pattern);
            }
            inv.arg("--quiet")
                .arg("-y") // keep symlinks as symlinks
                .arg("-r")
                .arg(archive.display().to_string())
                .arg(".")
                .run()
                .map_err(CliError::Core)?;
        }
        ArchiveKind::Tar => {
            // Tarballs include the directory name by convention.
            let base = ws
                .directory()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| ".".to_owned());
            let parent = ws.directory().parent().unwrap_or(Path::new("/"));
            let mut inv = Invocation::new(TAR_PROGRAM)
                .current_dir(parent)
                .arg(format!("--use-compress-program={LZIP_PROGRAM}"))
                // strip ownership and ACLs; they are host-specific
                .args(["--owner=0", "--group=0", "--no-acls"])
                .arg("-c")
                .arg("-f")
                .arg(archive.display().to_string());
            for pattern in EXCLUDE_PATTERNS {
                inv = inv.arg(format!("--exclude={base}/{pattern}"));
            }
            inv.arg(&base).run().map_err(CliError::Core)?;
        }
    }

    std::fs::rename(&archive, &output).map_err(CoreError::Io)?;
    emit(
        format,
        &ExportResult {
            path: output.clone(),
        },
        Some(&output.display().to_string()),
    )
    .map_err(CliError::Core)?;
    ws.close().map_err(CliError::Core)?;
    Ok(EXIT_SUCCESS)
}

// Inside an existing directory the archive is named after the workspace,
// with a random suffix on collision.
fn resolve_output(ws: &Workspace, kind: ArchiveKind, output: &Path) -> PathBuf {
    if !output.is_dir() {
        return output.to_path_buf();
    }
    let slug = name_to_dir(ws.metadata().name().unwrap_or(""));
    let mut suffix = String::new();
    loop {
        let candidate = output.join(format!("{slug}{suffix}.{}", kind.extension()));
        if !candidate.exists() {
            return candidate;
        }
        suffix = format!("_{}", rand::random::<u64>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_patterns_cover_tool_managed_state() {
        assert!(EXCLUDE_PATTERNS.iter().any(|p| p.contains(".guix-profile")));
        assert!(EXCLUDE_PATTERNS
            .iter()
            .any(|p| p.contains(".config/guix/current")));
        assert!(EXCLUDE_PATTERNS.iter().any(|p| p.contains(".cache")));
    }

    #[test]
    fn extensions_match_kind() {
        assert_eq!(ArchiveKind::Zip.extension(), "zip");
        assert_eq!(ArchiveKind::Tar.extension(), "tar.lz");
    }
}
