//! The workspace metadata document.
//!
//! An ordered, string-keyed document with a small set of reserved, typed
//! keys (`version`, `_id`, `created`, `modified`, `creator`, `name`) and an
//! open extension bag for caller-defined keys. Mutation goes through
//! explicit methods that mark the document dirty; [`Metadata::flush`] is a
//! no-op for a clean document and otherwise replaces the on-disk file as a
//! whole: softlock on a sibling lock file, write to a temporary sibling,
//! atomic rename over the canonical path. A concurrent reader observes
//! either the old or the new document in full, and a crash between write
//! and rename leaves the canonical file untouched.

use crate::identity::random_id;
use crate::layout::WorkspaceLayout;
use crate::CoreError;
use atelier_fs::Softlock;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Schema version of the metadata document.
pub const METADATA_VERSION: u32 = 1;

const RESERVED_KEYS: &[&str] = &["version", "_id", "created", "modified", "creator"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    version: u32,
    #[serde(rename = "_id")]
    id: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(flatten)]
    extra: IndexMap<String, serde_yaml::Value>,
    #[serde(skip)]
    dirty: bool,
}

impl Metadata {
    pub fn new(creator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: METADATA_VERSION,
            id: random_id(),
            created: now,
            modified: now,
            creator: creator.into(),
            name: None,
            extra: IndexMap::new(),
            dirty: true,
        }
    }

    /// Load the document from disk. Anything short of an existing,
    /// parseable file is an invalid workspace.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidWorkspace(format!("{}: {e}", path.display())))?;
        serde_yaml::from_str(&text)
            .map_err(|e| CoreError::InvalidWorkspace(format!("{}: {e}", path.display())))
    }

    /// Persist the document if it was mutated since the last load or flush.
    pub fn flush(&mut self, layout: &WorkspaceLayout) -> Result<(), CoreError> {
        if !self.dirty {
            return Ok(());
        }
        let config_dir = layout.config_dir();
        std::fs::create_dir_all(&config_dir)?;
        let _lock = Softlock::acquire(layout.metadata_lock_path())?;

        let mut tmp = NamedTempFile::new_in(&config_dir)?;
        serde_yaml::to_writer(&mut tmp, self)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(layout.metadata_path())
            .map_err(|e| CoreError::Io(e.error))?;
        fsync_dir(&config_dir)?;

        debug!("flushed metadata for {}", self.id);
        self.dirty = false;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
        self.touch();
    }

    /// Assign a fresh identity. Used when a workspace is copied or
    /// imported: copies are logically distinct workspaces and must never
    /// share an identity with their source.
    pub fn assign_new_identity(&mut self) {
        self.id = random_id();
        self.touch();
    }

    /// Reinitialize identity and provenance, e.g. after instantiating a
    /// skeleton: the result is a new workspace, not a copy.
    pub fn reset(&mut self, creator: impl Into<String>) {
        let now = Utc::now();
        self.id = random_id();
        self.created = now;
        self.modified = now;
        self.creator = creator.into();
        self.name = None;
        self.extra.clear();
        self.dirty = true;
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.extra.get(key)
    }

    pub fn extra(&self) -> &IndexMap<String, serde_yaml::Value> {
        &self.extra
    }

    /// Set a caller-defined key. `name` routes to the display name; the
    /// other reserved keys are immutable.
    pub fn set(&mut self, key: &str, value: serde_yaml::Value) -> Result<(), CoreError> {
        if key == "name" {
            match value {
                serde_yaml::Value::String(s) => self.set_name(s),
                other => self.set_name(yaml_to_display(&other)),
            }
            return Ok(());
        }
        if RESERVED_KEYS.contains(&key) {
            return Err(CoreError::ReservedKey(key.to_owned()));
        }
        self.extra.insert(key.to_owned(), value);
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), CoreError> {
        if key == "name" {
            self.name = None;
            self.touch();
            return Ok(());
        }
        if RESERVED_KEYS.contains(&key) {
            return Err(CoreError::ReservedKey(key.to_owned()));
        }
        if self.extra.shift_remove(key).is_some() {
            self.touch();
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.modified = Utc::now();
        self.dirty = true;
    }
}

fn yaml_to_display(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_owned())
        .unwrap_or_default()
}

/// Make a preceding rename durable. POSIX does not promise rename
/// durability without an fsync of the containing directory.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layout() -> (tempfile::TempDir, WorkspaceLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        (dir, layout)
    }

    #[test]
    fn roundtrip_preserves_reserved_and_extra_keys() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        meta.set_name("Demo");
        meta.set("funding", serde_yaml::Value::String("grant-42".into()))
            .unwrap();
        meta.flush(&layout).unwrap();

        let loaded = Metadata::load(&layout.metadata_path()).unwrap();
        assert_eq!(loaded.id(), meta.id());
        assert_eq!(loaded.creator(), "alice");
        assert_eq!(loaded.name(), Some("Demo"));
        assert_eq!(
            loaded.get("funding"),
            Some(&serde_yaml::Value::String("grant-42".into()))
        );
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn extension_key_order_is_preserved() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        for key in ["zeta", "alpha", "mid"] {
            meta.set(key, serde_yaml::Value::Bool(true)).unwrap();
        }
        meta.flush(&layout).unwrap();

        let loaded = Metadata::load(&layout.metadata_path()).unwrap();
        let keys: Vec<_> = loaded.extra().keys().cloned().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn load_missing_file_is_invalid_workspace() {
        let (_dir, layout) = test_layout();
        let err = Metadata::load(&layout.metadata_path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkspace(_)));
    }

    #[test]
    fn load_malformed_file_is_invalid_workspace() {
        let (_dir, layout) = test_layout();
        std::fs::create_dir_all(layout.config_dir()).unwrap();
        std::fs::write(layout.metadata_path(), ": not : valid : yaml [").unwrap();
        let err = Metadata::load(&layout.metadata_path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkspace(_)));
    }

    #[test]
    fn clean_flush_performs_no_write() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        meta.flush(&layout).unwrap();

        let mut loaded = Metadata::load(&layout.metadata_path()).unwrap();
        // A lock held by someone else would make any real flush fail Busy;
        // a clean flush must not even try to take it.
        std::fs::write(layout.metadata_lock_path(), "").unwrap();
        loaded.flush(&layout).unwrap();
        std::fs::remove_file(layout.metadata_lock_path()).unwrap();
    }

    #[test]
    fn dirty_flush_is_blocked_by_held_lock() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        std::fs::create_dir_all(layout.config_dir()).unwrap();
        std::fs::write(layout.metadata_lock_path(), "").unwrap();
        let err = meta.flush(&layout).unwrap_err();
        assert!(matches!(err, CoreError::Busy));
    }

    #[test]
    fn flush_clears_dirty_and_releases_lock() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        assert!(meta.is_dirty());
        meta.flush(&layout).unwrap();
        assert!(!meta.is_dirty());
        assert!(!layout.metadata_lock_path().exists());
    }

    #[test]
    fn mutation_marks_dirty_and_touches_modified() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        meta.flush(&layout).unwrap();
        let before = meta.modified();

        meta.set("note", serde_yaml::Value::String("x".into())).unwrap();
        assert!(meta.is_dirty());
        assert!(meta.modified() >= before);
    }

    #[test]
    fn reserved_keys_are_immutable() {
        let mut meta = Metadata::new("alice");
        for key in ["_id", "version", "created", "modified", "creator"] {
            assert!(matches!(
                meta.set(key, serde_yaml::Value::Null),
                Err(CoreError::ReservedKey(_))
            ));
        }
    }

    #[test]
    fn set_routes_name_to_display_name() {
        let mut meta = Metadata::new("alice");
        meta.set("name", serde_yaml::Value::String("Demo".into()))
            .unwrap();
        assert_eq!(meta.name(), Some("Demo"));
    }

    #[test]
    fn remove_clears_extension_key() {
        let mut meta = Metadata::new("alice");
        meta.set("note", serde_yaml::Value::Bool(true)).unwrap();
        meta.remove("note").unwrap();
        assert!(meta.get("note").is_none());
    }

    #[test]
    fn new_identities_differ() {
        let a = Metadata::new("alice");
        let b = Metadata::new("alice");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn assign_new_identity_changes_id() {
        let mut meta = Metadata::new("alice");
        let original = meta.id().to_owned();
        meta.assign_new_identity();
        assert_ne!(meta.id(), original);
    }

    #[test]
    fn reset_reinitializes_provenance() {
        let mut meta = Metadata::new("alice");
        meta.set_name("Old");
        meta.set("stale", serde_yaml::Value::Bool(true)).unwrap();
        let original_id = meta.id().to_owned();

        meta.reset("bob");
        assert_ne!(meta.id(), original_id);
        assert_eq!(meta.creator(), "bob");
        assert_eq!(meta.name(), None);
        assert!(meta.extra().is_empty());
    }

    #[test]
    fn identity_is_stable_across_repeated_loads() {
        let (_dir, layout) = test_layout();
        let mut meta = Metadata::new("alice");
        meta.flush(&layout).unwrap();

        let first = Metadata::load(&layout.metadata_path()).unwrap();
        let second = Metadata::load(&layout.metadata_path()).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(first.id(), meta.id());
    }
}
