pub mod completions;
pub mod copy;
pub mod create;
pub mod export;
pub mod import;
pub mod list;
pub mod man_pages;
pub mod modify;
pub mod package;
pub mod share;
pub mod sync;

use crate::output::{emit, OutputFormat};
use atelier_core::{CoreError, SyncOutcome, Workspace};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_EXEC_ERROR: u8 = 3;
pub const EXIT_BUSY: u8 = 4;
pub const EXIT_BUILD_ERROR: u8 = 5;

/// Command-level failure: either a usage problem or an engine error.
#[derive(Debug)]
pub enum CliError {
    Usage(String),
    Core(CoreError),
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        CliError::Core(e)
    }
}

/// Turn a sync outcome the command cannot proceed from into its error.
pub fn require_synced(outcome: SyncOutcome) -> Result<SyncOutcome, CliError> {
    match outcome {
        SyncOutcome::Broken => Err(CliError::Core(CoreError::BrokenManifest)),
        SyncOutcome::PackageBuildFailure(packages) => {
            Err(CliError::Core(CoreError::PackageBuildFailure(packages)))
        }
        ok => Ok(ok),
    }
}

/// Render the workspace description in the requested format; the human
/// line is just the directory.
pub fn emit_workspace(
    format: OutputFormat,
    workspace: &Workspace,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Human => {
            println!("{}", workspace.directory().display());
            Ok(())
        }
        _ => {
            let description = workspace.describe().map_err(CliError::Core)?;
            emit(format, &description, None).map_err(CliError::Core)
        }
    }
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_USAGE,
            EXIT_EXEC_ERROR,
            EXIT_BUSY,
            EXIT_BUILD_ERROR,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn require_synced_passes_fresh_and_rebuilt() {
        assert!(require_synced(SyncOutcome::Fresh).is_ok());
        assert!(require_synced(SyncOutcome::Rebuilt).is_ok());
    }

    #[test]
    fn require_synced_rejects_failures() {
        assert!(matches!(
            require_synced(SyncOutcome::Broken),
            Err(CliError::Core(CoreError::BrokenManifest))
        ));
        assert!(matches!(
            require_synced(SyncOutcome::PackageBuildFailure(vec!["x".to_owned()])),
            Err(CliError::Core(CoreError::PackageBuildFailure(_)))
        ));
    }

    #[test]
    fn spinner_finishes_cleanly() {
        let pb = spinner("working...");
        spin_ok(&pb, "done");
        let pb = spinner("working...");
        spin_fail(&pb, "failed");
    }
}
