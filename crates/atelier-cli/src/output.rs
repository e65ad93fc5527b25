use atelier_core::CoreError;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Yaml,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Human => "human",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        };
        write!(f, "{name}")
    }
}

/// Print one result record. Human output shows the short line only; YAML
/// records are separated by a document marker so a stream of them stays
/// parseable.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    human: Option<&str>,
) -> Result<(), CoreError> {
    match format {
        OutputFormat::Human => {
            if let Some(line) = human {
                println!("{line}");
            }
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
            println!("---");
        }
        OutputFormat::Json => {
            let text = serde_json::to_string(value).map_err(std::io::Error::other)?;
            println!("{text}");
        }
    }
    Ok(())
}

/// Structured status record for a failed invocation, so callers can act on
/// the outcome without re-running in a debug mode.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StatusRecord<'a> {
    ExecError {
        command: &'a str,
        returncode: i32,
        stdout: &'a str,
        stderr: &'a str,
    },
    Busy,
    PackageBuildError {
        packages: &'a [String],
    },
    WorkspaceBroken,
    InvalidWorkspace {
        detail: String,
    },
    Error {
        detail: String,
    },
}

pub fn emit_error(format: OutputFormat, err: &CoreError) {
    if format == OutputFormat::Human {
        eprintln!("error: {err}");
        return;
    }
    let record = match err {
        CoreError::Execution(e) => StatusRecord::ExecError {
            command: &e.command,
            returncode: e.status,
            stdout: &e.stdout,
            stderr: &e.stderr,
        },
        CoreError::Busy => StatusRecord::Busy,
        CoreError::PackageBuildFailure(packages) => {
            StatusRecord::PackageBuildError { packages }
        }
        CoreError::BrokenManifest => StatusRecord::WorkspaceBroken,
        CoreError::InvalidWorkspace(detail) => StatusRecord::InvalidWorkspace {
            detail: detail.clone(),
        },
        other => StatusRecord::Error {
            detail: other.to_string(),
        },
    };
    let _ = emit(format, &record, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_records_tag_by_status() {
        let record = StatusRecord::PackageBuildError {
            packages: &["foo".to_owned()],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"package_build_error\""));
        assert!(json.contains("foo"));
    }

    #[test]
    fn busy_record_is_minimal() {
        let json = serde_json::to_string(&StatusRecord::Busy).unwrap();
        assert_eq!(json, "{\"status\":\"busy\"}");
    }
}
