use super::{emit_workspace, require_synced, spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::naming::name_to_path;
use atelier_core::{current_user, Workspace};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Skeleton workspaces instantiated for new projects, most specific first.
fn skeleton_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(home).join(".config").join("atelier").join("skel"));
    }
    dirs.push(PathBuf::from("/etc/atelier/skel"));
    dirs
}

pub fn run(
    directory: &Path,
    name_words: &[String],
    format: OutputFormat,
) -> Result<u8, CliError> {
    let name = name_words.join(" ");
    let dest = name_to_path(&name, directory).map_err(CliError::Core)?;

    for skel in skeleton_dirs() {
        if !skel.is_dir() {
            continue;
        }
        match Workspace::open(&skel) {
            Ok(source) => {
                debug!("instantiating skeleton {} at {}", skel.display(), dest.display());
                let pb = progress(format, "creating workspace from skeleton...");
                let result = source.copy(&dest);
                let (mut ws, outcome) = finish(pb, result)?;
                require_synced(outcome)?;
                // A skeleton instance is a new workspace, not a copy of one.
                ws.metadata_mut().reset(current_user());
                if !name.is_empty() {
                    ws.metadata_mut().set_name(&name);
                }
                emit_workspace(format, &ws)?;
                ws.close().map_err(CliError::Core)?;
                return Ok(EXIT_SUCCESS);
            }
            Err(e) => {
                warn!("skeleton directory {} is invalid: {e}", skel.display());
            }
        }
    }

    debug!("no skeleton directory found, creating empty workspace");
    let mut ws = Workspace::create(&name, directory).map_err(CliError::Core)?;
    let pb = progress(format, "creating workspace...");
    let result = ws.init();
    let outcome = finish(pb, result)?;
    require_synced(outcome)?;
    emit_workspace(format, &ws)?;
    ws.close().map_err(CliError::Core)?;
    Ok(EXIT_SUCCESS)
}

fn progress(format: OutputFormat, msg: &str) -> Option<indicatif::ProgressBar> {
    (format == OutputFormat::Human).then(|| spinner(msg))
}

fn finish<T>(
    pb: Option<indicatif::ProgressBar>,
    result: Result<T, atelier_core::CoreError>,
) -> Result<T, CliError> {
    match result {
        Ok(value) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "workspace ready");
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "workspace creation failed");
            }
            Err(e.into())
        }
    }
}
