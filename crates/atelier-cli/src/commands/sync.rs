use super::{emit_workspace, require_synced, spin_fail, spin_ok, spinner, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::Workspace;
use std::path::Path;

pub fn run(directory: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;

    let pb = (format == OutputFormat::Human).then(|| spinner("synchronizing profile..."));
    match ws.sync() {
        Ok(outcome) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "profile up to date");
            }
            require_synced(outcome)?;
            emit_workspace(format, &ws)?;
            ws.close().map_err(CliError::Core)?;
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "synchronization failed");
            }
            Err(e.into())
        }
    }
}
