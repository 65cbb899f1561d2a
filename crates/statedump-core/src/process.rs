//! External process execution with enforced timeouts.
//!
//! Every external tool (diff, the benchmark checkout tool, artifact
//! downloads, per-test runs) goes through [`run_command`]. A timeout is a
//! distinct [`CommandStatus::TimedOut`] outcome, never an error: the child
//! (and on Unix its whole process group) is killed and reaped, and the
//! caller decides what a timeout means for its stage.

use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default timeout when a spec does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Command Specification
// ============================================================================

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program followed by its arguments, for logging and reports.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

// ============================================================================
// Command Result
// ============================================================================

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Exited normally with the given code.
    Exited(i32),
    /// Terminated by a signal (no exit code).
    Signaled,
    /// Killed after exceeding its timeout.
    TimedOut,
}

/// Result of running a command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub status: CommandStatus,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// How long the command took.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// The command that was run.
    pub command: Vec<String>,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Exited(0)
    }

    pub fn timed_out(&self) -> bool {
        self.status == CommandStatus::TimedOut
    }

    /// Exit code if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            CommandStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Short human-readable description of a non-successful outcome.
    pub fn failure_summary(&self) -> String {
        match self.status {
            CommandStatus::Exited(code) => {
                let tail: String = self
                    .stderr
                    .lines()
                    .rev()
                    .take(3)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect::<Vec<_>>()
                    .join(" | ");
                if tail.is_empty() {
                    format!("exit code {}", code)
                } else {
                    format!("exit code {}: {}", code, tail)
                }
            }
            CommandStatus::Signaled => "terminated by signal".to_string(),
            CommandStatus::TimedOut => {
                format!("timed out after {:.1}s", self.duration.as_secs_f64())
            }
        }
    }
}

/// Serde helper for serializing `Duration` as `f64` seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Errors that prevent a command from running at all.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Execution
// ============================================================================

/// Run a command to completion or until its timeout expires.
///
/// stdout and stderr are drained on background threads so a chatty child
/// cannot block on a full pipe while we wait on it.
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
    if spec.program.is_empty() {
        return Err(ProcessError::EmptyCommand);
    }

    let start = Instant::now();
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(command = ?spec.argv(), timeout_secs = spec.timeout.as_secs(), "spawning");
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    // Wait with timeout using OS-level waiting (no polling)
    let status = match child.wait_timeout(spec.timeout)? {
        Some(status) => match status.code() {
            Some(code) => CommandStatus::Exited(code),
            None => CommandStatus::Signaled,
        },
        None => {
            kill_tree(&mut child);
            warn!(
                command = ?spec.argv(),
                "command timed out after {:?}",
                spec.timeout
            );
            CommandStatus::TimedOut
        }
    };

    let stdout = join_drain(stdout_reader);
    let stderr = join_drain(stderr_reader);

    Ok(CommandOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        duration: start.elapsed(),
        command: spec.argv(),
    })
}

/// Check whether `program` resolves on `PATH`.
pub fn program_available(program: &str) -> bool {
    which::which(program).is_ok()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Kill the child and everything it spawned, then reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own process group; signal the whole group so
        // build tools and forked JVMs die with it.
        unsafe {
            libc::kill(-(child.id() as i32), libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait(); // Reap the zombie
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_is_rejected() {
        match run_command(&CommandSpec::new("")) {
            Err(ProcessError::EmptyCommand) => {}
            other => panic!("Expected EmptyCommand, got {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        match run_command(&CommandSpec::new("statedump-no-such-program-xyz")) {
            Err(ProcessError::Spawn { program, .. }) => {
                assert_eq!(program, "statedump-no-such-program-xyz")
            }
            other => panic!("Expected Spawn, got {:?}", other),
        }
    }

    #[test]
    fn argv_includes_program() {
        let spec = CommandSpec::new("diff").args(["-U0", "a", "b"]);
        assert_eq!(spec.argv(), vec!["diff", "-U0", "a", "b"]);
    }

    #[test]
    fn failure_summary_for_timeout() {
        let out = CommandOutput {
            status: CommandStatus::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1500),
            command: vec!["sleep".into()],
        };
        assert!(out.timed_out());
        assert!(!out.success());
        assert_eq!(out.exit_code(), None);
        assert_eq!(out.failure_summary(), "timed out after 1.5s");
    }

    #[test]
    fn failure_summary_uses_stderr_tail() {
        let out = CommandOutput {
            status: CommandStatus::Exited(2),
            stdout: String::new(),
            stderr: "a\nb\nc\nd\n".to_string(),
            duration: Duration::ZERO,
            command: vec![],
        };
        assert_eq!(out.failure_summary(), "exit code 2: b | c | d");
    }

    #[test]
    fn duration_serializes_as_seconds() {
        let out = CommandOutput {
            status: CommandStatus::Exited(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(250),
            command: vec![],
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["duration"], serde_json::json!(0.25));
        assert_eq!(json["status"], serde_json::json!({"exited": 0}));
    }

    #[cfg(unix)]
    mod unix_tests {
        use super::*;

        #[test]
        fn captures_stdout_and_exit_code() {
            if !program_available("sh") {
                eprintln!("skipping: sh not available");
                return;
            }
            let out = run_command(
                &CommandSpec::new("sh")
                    .args(["-c", "echo out; echo err >&2; exit 3"])
                    .timeout(Duration::from_secs(10)),
            )
            .unwrap();
            assert_eq!(out.status, CommandStatus::Exited(3));
            assert_eq!(out.stdout.trim(), "out");
            assert_eq!(out.stderr.trim(), "err");
        }

        #[test]
        fn env_is_passed_to_child() {
            if !program_available("sh") {
                eprintln!("skipping: sh not available");
                return;
            }
            let out = run_command(
                &CommandSpec::new("sh")
                    .args(["-c", "printf %s \"$OBJDUMP_OUT\""])
                    .env("OBJDUMP_OUT", "/tmp/x.json"),
            )
            .unwrap();
            assert!(out.success());
            assert_eq!(out.stdout, "/tmp/x.json");
        }

        #[test]
        fn timeout_is_distinct_outcome() {
            if !program_available("sleep") {
                eprintln!("skipping: sleep not available");
                return;
            }
            let out = run_command(
                &CommandSpec::new("sleep")
                    .arg("10")
                    .timeout(Duration::from_millis(200)),
            )
            .unwrap();
            assert!(out.timed_out());
            assert!(out.duration < Duration::from_secs(5));
        }
    }
}
