use std::path::{Path, PathBuf};

/// Tool name; prefixes the sync-scope lock files in `.cache`.
pub const TOOL_NAME: &str = "atelier";

/// Load-bearing paths inside a workspace directory.
///
/// Other tools (and other versions of this one) rely on this layout, so it
/// is stable: metadata under `.config`, the package manifest and channel
/// pin under `.config/guix`, the materialized profile at `.guix-profile`,
/// ephemeral lock files under `.cache`.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(".config")
    }

    #[inline]
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }

    #[inline]
    pub fn guix_dir(&self) -> PathBuf {
        self.config_dir().join("guix")
    }

    /// The package manager's own self-hosted profile.
    #[inline]
    pub fn guix_binary_dir(&self) -> PathBuf {
        self.guix_dir().join("current")
    }

    #[inline]
    pub fn guix_bin(&self) -> PathBuf {
        self.guix_binary_dir().join("bin").join("guix")
    }

    #[inline]
    pub fn metadata_path(&self) -> PathBuf {
        self.config_dir().join("workspace.yaml")
    }

    /// Ephemeral; must not exist between operations.
    #[inline]
    pub fn metadata_lock_path(&self) -> PathBuf {
        self.config_dir().join("workspace.yaml.lock")
    }

    #[inline]
    pub fn manifest_path(&self) -> PathBuf {
        self.guix_dir().join("manifest.scm")
    }

    #[inline]
    pub fn channels_path(&self) -> PathBuf {
        self.guix_dir().join("channels.scm")
    }

    /// Symlink tree of the materialized environment; its modification time
    /// is the staleness oracle.
    #[inline]
    pub fn profile_path(&self) -> PathBuf {
        self.root.join(".guix-profile")
    }

    #[inline]
    pub fn guix_lock_path(&self) -> PathBuf {
        self.cache_dir().join(format!("{TOOL_NAME}.ensureGuix.lock"))
    }

    #[inline]
    pub fn profile_lock_path(&self) -> PathBuf {
        self.cache_dir()
            .join(format!("{TOOL_NAME}.ensureProfile.lock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_stable() {
        let layout = WorkspaceLayout::new("/srv/projects/demo");
        assert_eq!(
            layout.metadata_path(),
            PathBuf::from("/srv/projects/demo/.config/workspace.yaml")
        );
        assert_eq!(
            layout.metadata_lock_path(),
            PathBuf::from("/srv/projects/demo/.config/workspace.yaml.lock")
        );
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/srv/projects/demo/.config/guix/manifest.scm")
        );
        assert_eq!(
            layout.channels_path(),
            PathBuf::from("/srv/projects/demo/.config/guix/channels.scm")
        );
        assert_eq!(
            layout.profile_path(),
            PathBuf::from("/srv/projects/demo/.guix-profile")
        );
        assert_eq!(
            layout.guix_bin(),
            PathBuf::from("/srv/projects/demo/.config/guix/current/bin/guix")
        );
    }

    #[test]
    fn lock_files_live_in_cache() {
        let layout = WorkspaceLayout::new("/w");
        assert_eq!(
            layout.guix_lock_path(),
            PathBuf::from("/w/.cache/atelier.ensureGuix.lock")
        );
        assert_eq!(
            layout.profile_lock_path(),
            PathBuf::from("/w/.cache/atelier.ensureProfile.lock")
        );
    }
}
