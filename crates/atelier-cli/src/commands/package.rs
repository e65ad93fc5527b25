use super::{emit_workspace, spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use crate::output::{emit, OutputFormat};
use atelier_core::manifest::{invert_specs, modify_manifest, unpin_channels, EMPTY_MANIFEST};
use atelier_core::packages::installed_packages;
use atelier_core::{CoreError, SyncEngine, SyncOutcome, Workspace};
use std::path::Path;
use tracing::{error, warn};

pub fn installed(directory: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;
    // The listing needs the workspace's own guix binary.
    SyncEngine::new(ws.layout())
        .ensure_guix()
        .map_err(CliError::Core)?;
    for package in installed_packages(ws.layout()).map_err(CliError::Core)? {
        emit(
            format,
            &package,
            Some(&format!("{} ({})", package.name, package.version)),
        )
        .map_err(CliError::Core)?;
    }
    ws.close().map_err(CliError::Core)?;
    Ok(EXIT_SUCCESS)
}

/// Apply `+spec`/`-spec` edits to the manifest and resynchronize. On a
/// broken manifest the previous text is restored in full; when only some
/// packages fail to build, just the added specs are rolled back.
pub fn modify(directory: &Path, specs: &[String], format: OutputFormat) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;
    let manifest_path = ws.layout().manifest_path();
    let previous = match std::fs::read_to_string(&manifest_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EMPTY_MANIFEST.to_owned(),
        Err(e) => return Err(CliError::Core(e.into())),
    };

    let edited = modify_manifest(&previous, specs).map_err(CliError::Core)?;
    replace_file(&manifest_path, &edited).map_err(CoreError::Io)?;

    let pb = (format == OutputFormat::Human).then(|| spinner("rebuilding profile..."));
    let finish = |ok: bool, msg: &str| {
        if let Some(ref pb) = pb {
            if ok {
                spin_ok(pb, msg);
            } else {
                spin_fail(pb, msg);
            }
        }
    };

    match ws.sync() {
        Ok(SyncOutcome::Fresh | SyncOutcome::Rebuilt) => {
            finish(true, "profile rebuilt");
            emit_workspace(format, &ws)?;
            ws.close().map_err(CliError::Core)?;
            Ok(EXIT_SUCCESS)
        }
        Ok(SyncOutcome::Broken) => {
            finish(false, "manifest is broken, reverting");
            error!("new manifest is not valid, reverting changes");
            replace_file(&manifest_path, &previous).map_err(CoreError::Io)?;
            resync_after_revert(&ws);
            Err(CliError::Core(CoreError::BrokenManifest))
        }
        Ok(SyncOutcome::PackageBuildFailure(packages)) => {
            finish(false, "package build failed, reverting additions");
            error!("build failed for {}, dropping the added packages", packages.join(", "));
            let inverse = invert_specs(specs);
            if !inverse.is_empty() {
                if let Ok(reverted) = modify_manifest(&edited, &inverse) {
                    replace_file(&manifest_path, &reverted).map_err(CoreError::Io)?;
                    resync_after_revert(&ws);
                }
            }
            Err(CliError::Core(CoreError::PackageBuildFailure(packages)))
        }
        Err(e) => {
            finish(false, "synchronization failed, reverting");
            replace_file(&manifest_path, &previous).map_err(CoreError::Io)?;
            resync_after_revert(&ws);
            Err(e.into())
        }
    }
}

/// Unpin the channel revisions and resynchronize, restoring the pin when
/// the upgrade fails.
pub fn upgrade(directory: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;
    let channels_path = ws.layout().channels_path();
    let previous = std::fs::read_to_string(&channels_path).map_err(|e| {
        CliError::Usage(format!(
            "no channel pin at {}: {e}",
            channels_path.display()
        ))
    })?;

    let unpinned = unpin_channels(&previous);
    replace_file(&channels_path, &unpinned).map_err(CoreError::Io)?;

    let pb = (format == OutputFormat::Human).then(|| spinner("upgrading packages..."));
    match ws.sync() {
        Ok(SyncOutcome::Fresh | SyncOutcome::Rebuilt) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "packages upgraded");
            }
            emit_workspace(format, &ws)?;
            ws.close().map_err(CliError::Core)?;
            Ok(EXIT_SUCCESS)
        }
        Ok(outcome) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "upgrade failed, reverting");
            }
            error!("upgrade failed, reverting the channel pin");
            replace_file(&channels_path, &previous).map_err(CoreError::Io)?;
            resync_after_revert(&ws);
            Err(match outcome {
                SyncOutcome::PackageBuildFailure(packages) => {
                    CliError::Core(CoreError::PackageBuildFailure(packages))
                }
                _ => CliError::Core(CoreError::BrokenManifest),
            })
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "upgrade failed, reverting");
            }
            replace_file(&channels_path, &previous).map_err(CoreError::Io)?;
            resync_after_revert(&ws);
            Err(e.into())
        }
    }
}

fn resync_after_revert(ws: &Workspace) {
    if let Err(e) = ws.sync() {
        warn!("resynchronization after revert failed: {e}");
    }
}

// Write-then-rename, so the manifest is only ever replaced whole.
fn replace_file(path: &Path, text: &str) -> Result<(), std::io::Error> {
    let staging = path.with_extension("new");
    std::fs::write(&staging, text)?;
    std::fs::rename(&staging, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_file_swaps_content_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.scm");
        std::fs::write(&path, "old").unwrap();
        replace_file(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!path.with_extension("new").exists());
    }
}
