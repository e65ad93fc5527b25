//! Captured-output subprocess invocations.
//!
//! All external tools (the package manager, archive and copy tools) run
//! through [`Invocation`]: explicit argument list, explicit environment
//! additions and working directory instead of process-global state, stdout
//! and stderr captured for error reporting. When the calling process is
//! interrupted while a child runs, the child is shut down in an orderly way
//! (SIGTERM, bounded grace period, SIGKILL) before the interruption
//! surfaces, so lock files and partial state are not left dangling behind a
//! still-running subprocess.

use crate::CoreError;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How long a child gets between SIGTERM and SIGKILL.
const GRACE_PERIOD: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
#[error("'{command}' exited with status {status}")]
pub struct ExecutionFailed {
    pub command: String,
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A single external-tool invocation.
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    permitted: Vec<i32>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            permitted: vec![0],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Treat `status` as success in addition to zero.
    pub fn permit_status(mut self, status: i32) -> Self {
        self.permitted.push(status);
        self
    }

    fn display_command(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }

    /// Run to completion, capturing output. Fails with
    /// [`ExecutionFailed`] on a non-permitted exit status and with
    /// [`CoreError::Interrupted`] after shutting the child down when the
    /// calling process was interrupted.
    pub fn run(&self) -> Result<CommandOutput, CoreError> {
        let mut out_file = tempfile::tempfile()?;
        let mut err_file = tempfile::tempfile()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out_file.try_clone()?))
            .stderr(Stdio::from(err_file.try_clone()?));
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        debug!("running {}", self.display_command());
        let mut child = cmd.spawn()?;
        let status = loop {
            if shutdown_requested() {
                terminate(&mut child);
                return Err(CoreError::Interrupted);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = read_back(&mut out_file)?;
        let stderr = read_back(&mut err_file)?;
        let code = status.code().unwrap_or(-1);
        if self.permitted.contains(&code) {
            Ok(CommandOutput {
                status: code,
                stdout,
                stderr,
            })
        } else {
            Err(ExecutionFailed {
                command: self.display_command(),
                status: code,
                stdout,
                stderr,
            }
            .into())
        }
    }
}

fn read_back(file: &mut File) -> Result<String, std::io::Error> {
    file.rewind()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

/// SIGTERM, bounded grace period, SIGKILL.
fn terminate(child: &mut Child) {
    let Ok(pid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        let _ = child.wait();
        return;
    };
    debug!("sending SIGTERM to pid {pid}");
    // SAFETY: kill() with a validated pid and a constant signal is safe.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
    if ret == 0 {
        let deadline = Instant::now() + GRACE_PERIOD;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        warn!("pid {pid} did not exit after SIGTERM, sending SIGKILL");
    }
    let _ = child.kill();
    let _ = child.wait();
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received, shutting down the current operation...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Best-effort existence probe for an external program.
pub fn program_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stderr() {
        let out = Invocation::new("sh")
            .args(["-c", "echo front; echo back >&2"])
            .run()
            .unwrap();
        assert_eq!(out.status, 0);
        assert_eq!(out.stdout.trim(), "front");
        assert_eq!(out.stderr.trim(), "back");
    }

    #[test]
    fn nonzero_exit_fails_with_captured_output() {
        let err = Invocation::new("sh")
            .args(["-c", "echo oops >&2; exit 7"])
            .run()
            .unwrap_err();
        match err {
            CoreError::Execution(e) => {
                assert_eq!(e.status, 7);
                assert_eq!(e.stderr.trim(), "oops");
                assert!(e.command.starts_with("sh"));
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn permitted_status_is_success() {
        let out = Invocation::new("sh")
            .args(["-c", "exit 23"])
            .permit_status(23)
            .run()
            .unwrap();
        assert_eq!(out.status, 23);
    }

    #[test]
    fn explicit_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = Invocation::new("pwd")
            .current_dir(dir.path())
            .run()
            .unwrap();
        assert_eq!(
            std::path::Path::new(out.stdout.trim()).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn explicit_environment_additions() {
        let out = Invocation::new("sh")
            .args(["-c", "printf %s \"$ATELIER_TEST_MARKER\""])
            .env("ATELIER_TEST_MARKER", "present")
            .run()
            .unwrap();
        assert_eq!(out.stdout, "present");
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let err = Invocation::new("/definitely/not/a/program").run().unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
