use crate::layout::WorkspaceLayout;
use crate::runner::Invocation;
use crate::CoreError;
use serde::Serialize;

/// One package installed into a workspace profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub output: String,
    pub path: String,
}

/// List the packages installed into the workspace profile.
///
/// Runs `guix package -p <profile> -I` with the workspace's own guix
/// binary; without that binary there is no profile to ask about and the
/// list is empty.
pub fn installed_packages(layout: &WorkspaceLayout) -> Result<Vec<InstalledPackage>, CoreError> {
    let guix_bin = layout.guix_bin();
    if !guix_bin.exists() {
        return Ok(Vec::new());
    }
    let output = Invocation::new(guix_bin)
        .arg("package")
        .arg("-p")
        .arg(layout.profile_path().display().to_string())
        .arg("-I")
        .run()?;
    Ok(parse_installed(&output.stdout))
}

/// Parse `guix package -I` output: one tab-separated
/// `(name, version, output, path)` tuple per line. Short rows are skipped.
pub fn parse_installed(text: &str) -> Vec<InstalledPackage> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            Some(InstalledPackage {
                name: fields.next()?.to_owned(),
                version: fields.next()?.to_owned(),
                output: fields.next()?.to_owned(),
                path: fields.next()?.to_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_package_rows() {
        let text = "r-minimal\t4.3.2\tout\t/gnu/store/abc-r-minimal-4.3.2\n\
                    tini\t0.19.0\tout\t/gnu/store/def-tini-0.19.0\n";
        let packages = parse_installed(text);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "r-minimal");
        assert_eq!(packages[1].version, "0.19.0");
        assert_eq!(packages[1].path, "/gnu/store/def-tini-0.19.0");
    }

    #[test]
    fn skips_short_rows() {
        let packages = parse_installed("incomplete\trow\n\n");
        assert!(packages.is_empty());
    }

    #[test]
    fn missing_guix_binary_means_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let layout = WorkspaceLayout::new(dir.path());
        assert!(installed_packages(&layout).unwrap().is_empty());
    }
}
