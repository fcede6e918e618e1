//! Process runner port.
//!
//! `ProcessRunner` executes one shell command string with a timeout and
//! returns the captured stdout, stderr, and exit code. Output lines are also
//! pushed into an optional sink as they arrive so callers can stream them.
//!
//! A non-zero exit code is not an error: it is returned in `ProcessOutput`
//! and the caller decides what it means. Only a spawn failure, an I/O failure
//! or a timeout produce `ProcessError`.
//!
//! The infrastructure layer provides the real implementation
//! (`synapscript_infra::process::ShellProcessRunner`).

use std::time::Duration;

use tokio::sync::mpsc;

#[cfg(test)]
pub(crate) mod mock;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single line of live process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// Receives output lines while the process runs. Dropped when the run ends.
pub type OutputSink = mpsc::UnboundedSender<OutputLine>;

/// Aggregate result of a process that exited within its timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined, in that order.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }

    /// The last non-empty line of output, preferring stderr.
    pub fn last_line(&self) -> Option<&str> {
        fn last(s: &str) -> Option<&str> {
            s.lines().rev().map(str::trim).find(|l| !l.is_empty())
        }
        last(&self.stderr).or_else(|| last(&self.stdout))
    }
}

// ---------------------------------------------------------------------------
// ProcessError
// ---------------------------------------------------------------------------

/// Errors that prevent a process from producing an exit code.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// The process did not exit in time and was terminated.
    #[error("command timed out after {}ms: {command}", elapsed.as_millis())]
    Timeout { command: String, elapsed: Duration },

    /// Reading output or waiting on the process failed.
    #[error("process I/O error: {0}")]
    Io(String),
}

impl ProcessError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// ProcessRunner trait
// ---------------------------------------------------------------------------

/// Runs shell command strings as child processes.
///
/// Implementations must terminate the child when `timeout` elapses and must
/// drop `sink` once the process has finished so that readers observe the end
/// of the stream.
pub trait ProcessRunner: Send + Sync + 'static {
    fn run(
        &self,
        command: &str,
        timeout: Duration,
        sink: Option<OutputSink>,
    ) -> impl std::future::Future<Output = Result<ProcessOutput, ProcessError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_streams() {
        let out = ProcessOutput {
            stdout: "a\n".to_string(),
            stderr: "b\n".to_string(),
            exit_code: 0,
        };
        assert_eq!(out.combined(), "a\nb\n");
    }

    #[test]
    fn last_line_prefers_stderr() {
        let out = ProcessOutput {
            stdout: "first\nsecond\n".to_string(),
            stderr: "oops\n\n".to_string(),
            exit_code: 1,
        };
        assert_eq!(out.last_line(), Some("oops"));

        let only_stdout = ProcessOutput {
            stdout: "first\nsecond\n".to_string(),
            ..Default::default()
        };
        assert_eq!(only_stdout.last_line(), Some("second"));
        assert_eq!(ProcessOutput::default().last_line(), None);
    }

    #[test]
    fn timeout_error_mentions_command_and_duration() {
        let err = ProcessError::Timeout {
            command: "sleep 10".to_string(),
            elapsed: Duration::from_millis(5000),
        };
        let msg = err.to_string();
        assert!(msg.contains("sleep 10"));
        assert!(msg.contains("5000ms"));
        assert!(err.is_timeout());
    }
}
