//! Shell process runner.
//!
//! Implements [`ProcessRunner`] by spawning `<shell> -c <command>` with
//! `tokio::process`. Stdout and stderr are read line by line on their own
//! tasks so output reaches the sink while the process is still running.
//!
//! On unix the shell leads its own process group. On timeout, or when the
//! caller drops the future mid-run, the whole group is killed so subshells
//! and pipeline stages die with it. After a normal exit the group is left
//! alone: a backgrounded process (`svc &`) keeps running, and its inherited
//! pipes are given [`DRAIN_GRACE`] to reach EOF before the readers are
//! abandoned.

use std::process::Stdio;
use std::time::Duration;

use synapscript_core::process::{
    OutputLine, OutputSink, OutputStream, ProcessError, ProcessOutput, ProcessRunner,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// How long to keep reading output after the shell has exited.
pub const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runs command strings through a POSIX shell.
#[derive(Debug, Clone)]
pub struct ShellProcessRunner {
    shell: String,
}

impl ShellProcessRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellProcessRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ProcessRunner for ShellProcessRunner {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        sink: Option<OutputSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| ProcessError::Spawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
        let mut group = ProcessGroup::new(child.id());
        tracing::debug!(pid = child.id(), command, "process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::Io("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::Io("stderr was not captured".to_string()))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let stdout_task = tokio::spawn(read_lines(stdout, OutputStream::Stdout, line_tx.clone()));
        let stderr_task = tokio::spawn(read_lines(stderr, OutputStream::Stderr, line_tx));

        let mut collected = Collected::new(sink);

        let exited = tokio::time::timeout(timeout, async {
            loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(line) = line_rx.recv() => collected.push(line),
                }
            }
        })
        .await;

        let status = match exited {
            Ok(status) => status.map_err(|e| ProcessError::Io(e.to_string()))?,
            Err(_) => {
                group.kill();
                if let Err(err) = child.kill().await {
                    tracing::warn!(command, error = %err, "failed to kill timed-out process");
                }
                stdout_task.abort();
                stderr_task.abort();
                tracing::debug!(command, timeout_ms = timeout.as_millis() as u64, "process timed out");
                return Err(ProcessError::Timeout {
                    command: command.to_string(),
                    elapsed: timeout,
                });
            }
        };
        group.release();

        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while let Some(line) = line_rx.recv().await {
                collected.push(line);
            }
        })
        .await;
        if drained.is_err() {
            tracing::debug!(command, "output still held open by a background process");
            stdout_task.abort();
            stderr_task.abort();
            while let Ok(line) = line_rx.try_recv() {
                collected.push(line);
            }
        }

        // `code()` is `None` when the process was killed by a signal.
        let exit_code = status.code().unwrap_or(-1);

        tracing::debug!(command, exit_code, "process exited");
        Ok(collected.finish(exit_code))
    }
}

/// Output accumulated for one run, forwarded to the caller's sink as it arrives.
struct Collected {
    stdout: String,
    stderr: String,
    sink: Option<OutputSink>,
}

impl Collected {
    fn new(sink: Option<OutputSink>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            sink,
        }
    }

    fn push(&mut self, line: OutputLine) {
        let buf = match line.stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.push_str(&line.text);
        buf.push('\n');
        if let Some(sink) = &self.sink {
            let _ = sink.send(line);
        }
    }

    fn finish(self, exit_code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code,
        }
    }
}

/// The child's process group. Killed on drop unless released.
struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn kill(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_group(pid);
        }
    }

    fn release(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: a negative pid addresses the process group led by the child.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pid, error = %std::io::Error::last_os_error(), "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Read `reader` to EOF, sending each line to `lines`. Invalid UTF-8 is
/// replaced, not rejected.
async fn read_lines<R>(reader: R, stream: OutputStream, lines: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(?stream, error = %err, "failed to read process output");
                break;
            }
        }
        let raw = String::from_utf8_lossy(&buf);
        let text = raw.trim_end_matches(['\n', '\r']).to_string();
        if lines.send(OutputLine { stream, text }).is_err() {
            break;
        }
    }
}
