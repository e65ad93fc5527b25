use crate::FsError;
use std::path::Path;

const KRB5_CONF: &str = "/etc/krb5.conf";

/// Default Kerberos realm of this host, from `[libdefaults]` in krb5.conf.
///
/// NFSv4 principals must be realm-qualified; this is where the suffix for
/// unqualified user and group names comes from.
pub fn default_realm() -> Result<String, FsError> {
    let path = std::env::var("ATELIER_KRB5_CONF").unwrap_or_else(|_| KRB5_CONF.to_owned());
    default_realm_from(Path::new(&path))
}

fn default_realm_from(path: &Path) -> Result<String, FsError> {
    let text = std::fs::read_to_string(path).map_err(|_| FsError::NoRealm)?;
    parse_default_realm(&text).ok_or(FsError::NoRealm)
}

fn parse_default_realm(text: &str) -> Option<String> {
    let mut in_libdefaults = false;
    for line in text.lines() {
        let line = line.split(['#', ';']).next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_libdefaults = section.trim() == "libdefaults";
            continue;
        }
        if !in_libdefaults {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "default_realm" {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_owned());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_default_realm() {
        let text = "\
[libdefaults]
    default_realm = EXAMPLE.ORG
    dns_lookup_realm = false

[realms]
    EXAMPLE.ORG = {
        kdc = kdc.example.org
    }
";
        assert_eq!(parse_default_realm(text), Some("EXAMPLE.ORG".to_owned()));
    }

    #[test]
    fn ignores_realm_outside_libdefaults() {
        let text = "[appdefaults]\ndefault_realm = WRONG.ORG\n";
        assert_eq!(parse_default_realm(text), None);
    }

    #[test]
    fn strips_comments() {
        let text = "[libdefaults]\ndefault_realm = EXAMPLE.ORG # primary\n";
        assert_eq!(parse_default_realm(text), Some("EXAMPLE.ORG".to_owned()));
    }

    #[test]
    fn missing_file_reports_no_realm() {
        let dir = tempfile::tempdir().unwrap();
        let result = default_realm_from(&dir.path().join("krb5.conf"));
        assert!(matches!(result, Err(FsError::NoRealm)));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("krb5.conf");
        let mut fd = std::fs::File::create(&path).unwrap();
        writeln!(fd, "[libdefaults]\ndefault_realm = LAB.LOCAL").unwrap();
        assert_eq!(default_realm_from(&path).unwrap(), "LAB.LOCAL");
    }
}
