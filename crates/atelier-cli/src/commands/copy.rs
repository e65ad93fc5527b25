use super::{emit_workspace, require_synced, spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::Workspace;
use std::path::Path;
use tracing::info;

pub fn run(directory: &Path, dest: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let source = Workspace::open(directory).map_err(CliError::Core)?;
    info!(
        "copying workspace {} into {}",
        source.directory().display(),
        dest.display()
    );

    let pb = (format == OutputFormat::Human).then(|| spinner("copying workspace..."));
    match source.copy(dest) {
        Ok((copy, outcome)) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "workspace copied");
            }
            require_synced(outcome)?;
            emit_workspace(format, &copy)?;
            copy.close().map_err(CliError::Core)?;
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "copy failed");
            }
            Err(e.into())
        }
    }
}
