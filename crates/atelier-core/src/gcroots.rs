use crate::layout::WorkspaceLayout;
use crate::runner::Invocation;
use crate::sync::GUIX_PROGRAM;
use crate::CoreError;
use std::io::Write;
use tracing::debug;

const ADD_ROOTS_SCRIPT: &str = include_str!("scripts/add-roots.scm");

/// Register the workspace's profile links as indirect GC roots.
///
/// Without a root registration the package manager may reclaim the
/// profile's closure at any time. Registrations are path-keyed, so this
/// must run again after a workspace directory is renamed.
pub fn ensure_gcroots(layout: &WorkspaceLayout) -> Result<(), CoreError> {
    let mut script = tempfile::Builder::new()
        .prefix("atelier-add-roots-")
        .suffix(".scm")
        .tempfile()?;
    script.write_all(ADD_ROOTS_SCRIPT.as_bytes())?;
    script.flush()?;

    debug!("registering gc roots for {}", layout.root().display());
    Invocation::new(GUIX_PROGRAM)
        .arg("repl")
        .arg("--")
        .arg(script.path().display().to_string())
        .arg(layout.root().display().to_string())
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_mentions_both_profile_links() {
        assert!(ADD_ROOTS_SCRIPT.contains(".guix-profile"));
        assert!(ADD_ROOTS_SCRIPT.contains(".config/guix/current"));
        assert!(ADD_ROOTS_SCRIPT.contains("add-indirect-root"));
    }
}
