use super::{CliError, EXIT_SUCCESS};
use crate::output::{emit, OutputFormat};
use atelier_core::Workspace;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn run(
    directory: &Path,
    search_paths: &[PathBuf],
    all: bool,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let mut roots: Vec<PathBuf> = search_paths.to_vec();
    if roots.is_empty() {
        roots.push(directory.to_path_buf());
    }

    for root in roots {
        debug!("searching {} for workspaces", root.display());
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            match Workspace::open(&dir) {
                Ok(ws) => {
                    // Everything below a workspace belongs to it; no
                    // nested workspaces.
                    report(&ws, format)?;
                }
                Err(_) => {
                    let Ok(entries) = std::fs::read_dir(&dir) else {
                        continue;
                    };
                    for entry in entries.flatten() {
                        let Ok(file_type) = entry.file_type() else {
                            continue;
                        };
                        if !file_type.is_dir() {
                            continue;
                        }
                        let hidden = entry.file_name().to_string_lossy().starts_with('.');
                        if hidden && !all {
                            continue;
                        }
                        pending.push(entry.path());
                    }
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

fn report(ws: &Workspace, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Human => {
            println!(
                "{}: {}",
                ws.directory().display(),
                ws.metadata().name().unwrap_or("")
            );
            Ok(())
        }
        _ => {
            let description = ws.describe().map_err(CliError::Core)?;
            emit(format, &description, None).map_err(CliError::Core)
        }
    }
}
