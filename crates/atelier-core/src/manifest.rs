//! Regex-level edits of the declarative package manifest.
//!
//! The manifest is opaque Scheme text to this engine; the only structure it
//! relies on is the `(specifications->manifest '(...))` form. A proper
//! Scheme reader would be nicer, but the package list is the only part that
//! ever changes programmatically.

use crate::CoreError;
use regex::Regex;

/// Manifest written into freshly created workspaces.
pub const EMPTY_MANIFEST: &str = "(specifications->manifest\n  '(\n))\n";

/// Apply package specs to the manifest text. Specs are prefixed with `+`
/// (add) or `-` (remove); a bare spec replaces the whole package list.
pub fn modify_manifest(manifest: &str, specs: &[String]) -> Result<String, CoreError> {
    let form = Regex::new(r"(?s)(\(specifications->manifest\s+'\()(.*)\)\)")
        .expect("valid pattern");
    let Some(captures) = form.captures(manifest) else {
        return Err(CoreError::ManifestEdit(
            "no (specifications->manifest '(...)) form found".to_owned(),
        ));
    };
    let head = &captures[1];
    let mut list = captures[2].to_owned();

    for spec in specs {
        if let Some(name) = spec.strip_prefix('+') {
            let quoted = format!("\"{name}\"");
            if list.contains(&quoted) {
                continue;
            }
            list.push_str(&quoted);
            list.push('\n');
        } else if let Some(name) = spec.strip_prefix('-') {
            let quoted = format!("\"{name}\"");
            list = list.replace(&quoted, "");
        } else {
            list = format!("\"{spec}\"");
        }
    }

    let replaced = format!("{head}{list}))");
    let range = captures.get(0).expect("whole match").range();
    let mut out = String::with_capacity(manifest.len() + replaced.len());
    out.push_str(&manifest[..range.start]);
    out.push_str(&replaced);
    out.push_str(&manifest[range.end..]);
    Ok(out)
}

/// Invert a spec list, for reverting just the added packages after a
/// partial build failure.
pub fn invert_specs(specs: &[String]) -> Vec<String> {
    specs
        .iter()
        .filter_map(|s| s.strip_prefix('+').map(|name| format!("-{name}")))
        .collect()
}

/// Strip pinned commits from a channel description so the next binary
/// refresh resolves the latest revisions.
pub fn unpin_channels(channels: &str) -> String {
    let commit = Regex::new(r#"\(commit\s+"[a-f0-9]+"\s*\)"#).expect("valid pattern");
    commit.replace_all(channels, "").into_owned()
}
