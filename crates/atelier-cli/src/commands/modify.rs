use super::{emit_workspace, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::Workspace;
use std::path::Path;
use tracing::debug;

pub fn run(directory: &Path, pairs: &[String], format: OutputFormat) -> Result<u8, CliError> {
    let mut ws = Workspace::open(directory).map_err(CliError::Core)?;

    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Usage(format!(
                "'{pair}' is not a key=value pair"
            )));
        };
        let (key, value) = (key.trim(), value.trim());
        if value.is_empty() {
            debug!("removing metadata key {key}");
            ws.metadata_mut().remove(key).map_err(CliError::Core)?;
        } else {
            ws.metadata_mut()
                .set(key, serde_yaml::Value::String(value.to_owned()))
                .map_err(CliError::Core)?;
        }
    }

    emit_workspace(format, &ws)?;
    ws.close().map_err(CliError::Core)?;
    Ok(EXIT_SUCCESS)
}
