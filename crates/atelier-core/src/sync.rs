//! Profile staleness and synchronization.
//!
//! Two nested sync scopes, each behind its own softlock so metadata edits
//! are never blocked by a long-running rebuild:
//!
//! - `ensure_guix` keeps the workspace's own package-manager binary current
//!   relative to the pinned channel description, and rewrites the pin with
//!   the exact resolved revisions after every refresh.
//! - `ensure_profile` keeps the materialized profile current relative to
//!   the manifest, the binary, and the mandatory baseline packages.
//!
//! Staleness is judged from filesystem modification times alone; there is
//! no database and no daemon. Once a rebuild succeeds the profile stays
//! fresh until one of its declared inputs changes.

use crate::layout::WorkspaceLayout;
use crate::packages::{installed_packages, InstalledPackage};
use crate::runner::{ExecutionFailed, Invocation};
use crate::CoreError;
use atelier_fs::Softlock;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::debug;

/// The host package manager, used to bootstrap a workspace's own binary.
pub const GUIX_PROGRAM: &str = "guix";

/// Packages every profile must contain regardless of the manifest.
pub const BASELINE_PACKAGES: &[&str] = &["tini"];

/// Staleness classification of a workspace profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    /// No profile artifact exists yet.
    Unbuilt,
    /// The profile reflects all of its declared inputs.
    Fresh,
    /// At least one declared input changed after the last rebuild.
    Stale,
}

/// Result of a synchronization attempt. Failure modes the caller may want
/// to react to (reverting a manifest, dropping an added package) are
/// ordinary variants, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do.
    Fresh,
    /// The profile was rebuilt successfully.
    Rebuilt,
    /// The package manager could not load the manifest; offer a revert to
    /// the last-known-good text.
    Broken,
    /// Named packages failed to build; the manifest is structurally fine.
    PackageBuildFailure(Vec<String>),
}

pub struct SyncEngine<'a> {
    layout: &'a WorkspaceLayout,
}

impl<'a> SyncEngine<'a> {
    pub fn new(layout: &'a WorkspaceLayout) -> Self {
        Self { layout }
    }

    /// Classify the profile against its declared inputs: the profile
    /// artifact itself, the manifest, the package-manager binary, and the
    /// presence of all baseline packages in `installed`.
    pub fn profile_status(&self, installed: &[InstalledPackage]) -> ProfileState {
        let Some(profile_mtime) = mtime_no_follow(&self.layout.profile_path()) else {
            return ProfileState::Unbuilt;
        };
        let manifest_mtime = mtime(&self.layout.manifest_path()).unwrap_or(UNIX_EPOCH);
        let binary_mtime = mtime_no_follow(&self.layout.guix_binary_dir()).unwrap_or(UNIX_EPOCH);
        let baseline_present = BASELINE_PACKAGES
            .iter()
            .all(|wanted| installed.iter().any(|p| p.name == *wanted));

        if manifest_mtime > profile_mtime || binary_mtime > profile_mtime || !baseline_present {
            ProfileState::Stale
        } else {
            ProfileState::Fresh
        }
    }

    /// Ensure the workspace's package-manager binary matches the channel
    /// pin. Usually called through [`SyncEngine::ensure_profile`].
    pub fn ensure_guix(&self) -> Result<(), CoreError> {
        let _lock = Softlock::acquire(self.layout.guix_lock_path())?;

        let channels = self.layout.channels_path();
        let channel_mtime = mtime(&channels).unwrap_or(UNIX_EPOCH);
        let guix_bin = self.layout.guix_bin();
        let binary_profile = self.layout.guix_binary_dir();
        let profile_mtime = if guix_bin.exists() {
            mtime_no_follow(&binary_profile).unwrap_or(UNIX_EPOCH)
        } else {
            UNIX_EPOCH
        };

        if !guix_bin.exists() || channel_mtime > profile_mtime {
            debug!(
                "refreshing workspace guix, binary exists: {}, channel newer: {}",
                guix_bin.exists(),
                channel_mtime > profile_mtime
            );
            std::fs::create_dir_all(self.layout.guix_dir())?;
            // The host guix bootstraps the workspace's own.
            let mut pull = Invocation::new(GUIX_PROGRAM)
                .arg("pull")
                .arg("-p")
                .arg(binary_profile.display().to_string());
            if channels.is_file() {
                pull = pull
                    .arg("-C")
                    .arg(channels.display().to_string());
            }
            pull.run()?;
        }

        // Pin the resolved channels so a copy of this workspace rebuilds
        // with exactly this guix. The pin keeps the pre-refresh profile
        // mtime: a pin rewrite alone must never re-trigger a refresh.
        let described = Invocation::new(self.layout.guix_bin())
            .args(["describe", "-f", "channels"])
            .run()?;
        let mut tmp = NamedTempFile::new_in(self.layout.guix_dir())?;
        tmp.write_all(described.stdout.as_bytes())?;
        tmp.flush()?;
        set_mtime_no_follow(tmp.path(), profile_mtime)?;
        tmp.persist(&channels).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }

    /// Bring the profile up to date with the manifest, the binary, and the
    /// baseline packages. Never blocks on contention and never retries.
    pub fn ensure_profile(&self) -> Result<SyncOutcome, CoreError> {
        let _lock = Softlock::acquire(self.layout.profile_lock_path())?;

        self.ensure_guix()?;

        let installed = installed_packages(self.layout)?;
        if self.profile_status(&installed) == ProfileState::Fresh {
            return Ok(SyncOutcome::Fresh);
        }

        let manifest = self.layout.manifest_path();
        let profile = self.layout.profile_path();
        debug!("rebuilding profile {}", profile.display());
        let mut build = Invocation::new(self.layout.guix_bin())
            .arg("package")
            .arg("-p")
            .arg(profile.display().to_string())
            .arg("--allow-collisions");
        if manifest.exists() {
            build = build.arg("-m").arg(manifest.display().to_string());
        }
        if !BASELINE_PACKAGES.is_empty() {
            build = build.arg("-i").args(BASELINE_PACKAGES.iter().copied());
        }

        match build.run() {
            Ok(_) => {
                // The tool may legitimately decide nothing changed and
                // leave the symlink untouched; without a fresh mtime every
                // later check would rebuild again, forever.
                if mtime_no_follow(&profile).is_some() {
                    set_mtime_no_follow(&profile, SystemTime::now())?;
                }
                Ok(SyncOutcome::Rebuilt)
            }
            Err(CoreError::Execution(failure)) => match classify_failure(&failure) {
                Some(outcome) => Ok(outcome),
                None => Err(failure.into()),
            },
            Err(other) => Err(other),
        }
    }
}

/// Map a package-manager failure onto the outcome set, when possible.
/// Everything unrecognized stays a hard [`ExecutionFailed`].
pub fn classify_failure(failure: &ExecutionFailed) -> Option<SyncOutcome> {
    if failure.stderr.contains("failed to load") {
        return Some(SyncOutcome::Broken);
    }
    let failed = failed_packages(&failure.stderr);
    if failed.is_empty() {
        None
    } else {
        Some(SyncOutcome::PackageBuildFailure(failed))
    }
}

/// Package names from failed derivation paths in a diagnostic stream.
pub fn failed_packages(stderr: &str) -> Vec<String> {
    let derivation =
        Regex::new(r#"/gnu/store/[0-9a-z]{32}-([^/\s'"`]+)\.drv"#).expect("valid pattern");
    let mut names = Vec::new();
    for captures in derivation.captures_iter(stderr) {
        let name = package_name(&captures[1]);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

// A derivation stem is `<name>-<version>`; the version is the first
// hyphen-separated segment starting with a digit.
fn package_name(stem: &str) -> String {
    let segments: Vec<&str> = stem.split('-').collect();
    let version_at = segments
        .iter()
        .position(|s| s.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(segments.len());
    if version_at == 0 {
        stem.to_owned()
    } else {
        segments[..version_at].join("-")
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn mtime_no_follow(path: &Path) -> Option<SystemTime> {
    std::fs::symlink_metadata(path).ok()?.modified().ok()
}

/// Set a path's modification time without following symlinks, so the
/// profile symlink itself can serve as the staleness oracle.
pub(crate) fn set_mtime_no_follow(path: &Path, to: SystemTime) -> Result<(), std::io::Error> {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    let since_epoch = to.duration_since(UNIX_EPOCH).unwrap_or_default();
    let spec = libc::timespec {
        tv_sec: since_epoch.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(since_epoch.subsec_nanos()),
    };
    let times = [spec, spec];
    // SAFETY: the path is a valid NUL-terminated string and `times` points
    // at two timespec values, as utimensat() requires.
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::utimensat(
            libc::AT_FDCWD,
            c_path.as_ptr(),
            times.as_ptr(),
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
