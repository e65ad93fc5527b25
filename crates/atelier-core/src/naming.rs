use crate::CoreError;
use deunicode::deunicode;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used when a display name has no usable characters.
pub const FALLBACK_DIR: &str = "unnamed_project";

/// Filesystem-safe directory name for a human-supplied display name:
/// lowercase, transliterated to plain ASCII, runs of anything else collapsed
/// to single underscores, no leading or trailing underscore.
pub fn name_to_dir(name: &str) -> String {
    let ascii = deunicode(&name.to_lowercase()).to_lowercase();
    let collapse = Regex::new(r"[^a-z0-9]+").expect("valid pattern");
    let slug = collapse
        .replace_all(&ascii, "_")
        .trim_matches('_')
        .to_owned();
    if slug.is_empty() {
        FALLBACK_DIR.to_owned()
    } else {
        slug
    }
}

/// Pick the directory a workspace named `name` should live in.
///
/// When `suggested` is an existing directory, a slug of the name is placed
/// inside it; colliding candidates retry with a random numeric suffix until
/// a free one is found. When `suggested` does not exist it is used as-is.
/// An existing non-directory destination is an error.
pub fn name_to_path(name: &str, suggested: &Path) -> Result<PathBuf, CoreError> {
    if !suggested.exists() {
        return Ok(suggested.to_path_buf());
    }
    if !suggested.is_dir() {
        return Err(CoreError::DestinationExists(suggested.to_path_buf()));
    }
    let subdir = name_to_dir(name);
    let mut ext = String::new();
    loop {
        let candidate = suggested.join(format!("{subdir}{ext}"));
        if !candidate.exists() {
            debug!("choosing directory {} for name '{name}'", candidate.display());
            return Ok(candidate);
        }
        ext = format!("_{}", rand::random::<u16>());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_unicode_names() {
        assert_eq!(name_to_dir("Müller Lab #1"), "muller_lab_1");
    }

    #[test]
    fn collapses_runs_and_trims_edges() {
        assert_eq!(name_to_dir("  A -- B  "), "a_b");
        assert_eq!(name_to_dir("__x__"), "x");
    }

    #[test]
    fn all_punctuation_falls_back() {
        assert_eq!(name_to_dir("!!! ???"), FALLBACK_DIR);
        assert_eq!(name_to_dir(""), FALLBACK_DIR);
    }

    #[test]
    fn lowercases_input() {
        assert_eq!(name_to_dir("My Project"), "my_project");
    }

    #[test]
    fn nonexistent_destination_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fresh");
        assert_eq!(name_to_path("ignored", &dest).unwrap(), dest);
    }

    #[test]
    fn existing_directory_gets_slug_inside() {
        let dir = tempfile::tempdir().unwrap();
        let path = name_to_path("My Project", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("my_project"));
    }

    #[test]
    fn collision_retries_with_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("my_project")).unwrap();
        let path = name_to_path("My Project", dir.path()).unwrap();
        assert_ne!(path, dir.path().join("my_project"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("my_project_"));
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            name_to_path("x", &file),
            Err(CoreError::DestinationExists(_))
        ));
    }
}
