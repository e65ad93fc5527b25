use super::{emit_workspace, CliError, EXIT_SUCCESS};
use crate::output::OutputFormat;
use atelier_core::Workspace;
use atelier_fs::PermissionTarget;
use std::path::Path;
use tracing::warn;

pub fn run(
    directory: &Path,
    targets: &[String],
    write: bool,
    remove: bool,
    force: bool,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let ws = Workspace::open(directory).map_err(CliError::Core)?;

    if !force && inside_home(ws.directory()) {
        return Err(CliError::Usage(
            "cannot share projects in your home directory; move them to a public space \
             (or pass --force)"
                .to_owned(),
        ));
    }
    if write {
        // Only the owner can change ACLs on a file, so write access by
        // others leads to files this tool cannot repair later.
        warn!("write mode shares files this tool cannot fix up for other users");
    }

    for spec in targets {
        let (target, qualifier) = parse_target(spec)?;
        ws.share(target, qualifier.as_deref(), write, remove)
            .map_err(CliError::Core)?;
    }

    emit_workspace(format, &ws)?;
    ws.close().map_err(CliError::Core)?;
    Ok(EXIT_SUCCESS)
}

/// `u:username`, `g:groupname`, or `o` for everyone.
fn parse_target(spec: &str) -> Result<(PermissionTarget, Option<String>), CliError> {
    let (kind, qualifier) = match spec.split_once(':') {
        Some((k, q)) if !q.is_empty() => (k, Some(q.to_owned())),
        Some((k, _)) => (k, None),
        None => (spec, None),
    };
    let target = match kind {
        "u" => PermissionTarget::User,
        "g" => PermissionTarget::Group,
        "o" => PermissionTarget::Other,
        other => {
            return Err(CliError::Usage(format!(
                "unknown permission target '{other}' in '{spec}' (use u:, g: or o)"
            )))
        }
    };
    if target == PermissionTarget::Other && qualifier.is_some() {
        return Err(CliError::Usage(format!(
            "'o' takes no qualifier (got '{spec}')"
        )));
    }
    if target != PermissionTarget::Other && qualifier.is_none() {
        return Err(CliError::Usage(format!(
            "'{spec}' is missing a user or group name"
        )));
    }
    Ok((target, qualifier))
}

fn inside_home(directory: &Path) -> bool {
    let Ok(home) = std::env::var("HOME") else {
        return false;
    };
    let Ok(home) = Path::new(&home).canonicalize() else {
        return false;
    };
    directory.starts_with(home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_and_group_targets() {
        assert_eq!(
            parse_target("u:alice").unwrap(),
            (PermissionTarget::User, Some("alice".to_owned()))
        );
        assert_eq!(
            parse_target("g:lab").unwrap(),
            (PermissionTarget::Group, Some("lab".to_owned()))
        );
    }

    #[test]
    fn parses_other_without_qualifier() {
        assert_eq!(parse_target("o").unwrap(), (PermissionTarget::Other, None));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(matches!(parse_target("z:whom"), Err(CliError::Usage(_))));
    }

    #[test]
    fn rejects_other_with_qualifier() {
        assert!(matches!(parse_target("o:world"), Err(CliError::Usage(_))));
    }

    #[test]
    fn rejects_missing_qualifier() {
        assert!(matches!(parse_target("u"), Err(CliError::Usage(_))));
        assert!(matches!(parse_target("g:"), Err(CliError::Usage(_))));
    }
}
