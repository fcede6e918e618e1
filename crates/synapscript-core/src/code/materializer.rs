//! Code materializer: runs generated code under a timeout.
//!
//! Bash code is handed straight to the process runner as a command string.
//! JavaScript is written to a uniquely named temp file inside the artifacts
//! directory and run with the configured interpreter. The temp file is a
//! `tempfile::NamedTempFile`, so it is removed when it goes out of scope on
//! every path out of `execute`, including early returns and cancellation.
//!
//! Every piece of code passes the denylist scan before anything touches the
//! filesystem or spawns a process.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use synapscript_types::automation::CodeLanguage;
use synapscript_types::execution::{CodeExecutionResult, ExecutionStatus};
use uuid::Uuid;

use super::safety::{self, DangerousPattern};
use crate::process::{OutputSink, ProcessError, ProcessOutput, ProcessRunner};

// ---------------------------------------------------------------------------
// CodeError
// ---------------------------------------------------------------------------

/// Errors that stop generated code before it runs.
#[derive(Debug, thiserror::Error)]
pub enum CodeError {
    /// The denylist scan matched. Nothing was written or spawned.
    #[error("generated code contains dangerous pattern: {pattern}")]
    DangerousCode { pattern: DangerousPattern },

    /// The temp artifact could not be created or written.
    #[error("failed to materialize code artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// CodeMaterializer
// ---------------------------------------------------------------------------

pub struct CodeMaterializer<P: ProcessRunner> {
    runner: Arc<P>,
    artifacts_dir: PathBuf,
    node_binary: String,
    timeout: Duration,
}

impl<P: ProcessRunner> CodeMaterializer<P> {
    pub fn new(
        runner: Arc<P>,
        artifacts_dir: PathBuf,
        node_binary: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            artifacts_dir,
            node_binary: node_binary.into(),
            timeout,
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Run `code` and wait for the result.
    pub async fn execute(
        &self,
        code: &str,
        language: CodeLanguage,
    ) -> Result<CodeExecutionResult, CodeError> {
        self.execute_streaming(code, language, None).await
    }

    /// Run `code`, forwarding output lines to `sink` as they arrive.
    pub async fn execute_streaming(
        &self,
        code: &str,
        language: CodeLanguage,
        sink: Option<OutputSink>,
    ) -> Result<CodeExecutionResult, CodeError> {
        if let Some(pattern) = safety::scan(code) {
            tracing::warn!(%language, %pattern, "rejected generated code");
            return Err(CodeError::DangerousCode { pattern });
        }

        let outcome = match language {
            CodeLanguage::Bash => self.runner.run(code, self.timeout, sink).await,
            CodeLanguage::Javascript => self.run_javascript(code, sink).await?,
        };

        let result = classify(outcome);
        tracing::debug!(%language, status = %result.status, "generated code finished");
        Ok(result)
    }

    async fn run_javascript(
        &self,
        code: &str,
        sink: Option<OutputSink>,
    ) -> Result<Result<ProcessOutput, ProcessError>, CodeError> {
        tokio::fs::create_dir_all(&self.artifacts_dir).await?;
        let artifact = self.write_artifact(code)?;

        let command = format!(
            "{} {}",
            self.node_binary,
            shell_quote(&artifact.path().to_string_lossy())
        );
        let outcome = self.runner.run(&command, self.timeout, sink).await;

        let path = artifact.path().to_path_buf();
        if let Err(err) = artifact.close() {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove code artifact");
        }

        Ok(outcome)
    }

    /// Write `code` to a fresh temp file. The name carries a per-invocation
    /// UUID so concurrent runs of the same automation never collide.
    fn write_artifact(&self, code: &str) -> std::io::Result<tempfile::NamedTempFile> {
        let prefix = format!("run-{}-", Uuid::now_v7().simple());
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".js")
            .tempfile_in(&self.artifacts_dir)?;
        file.write_all(code.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

/// Any stderr output or a non-zero exit counts as failure.
fn classify(outcome: Result<ProcessOutput, ProcessError>) -> CodeExecutionResult {
    match outcome {
        Ok(output) => {
            let stderr = output.stderr.trim();
            let error = if !stderr.is_empty() {
                Some(stderr.to_string())
            } else if !output.success() {
                Some(format!("process exited with code {}", output.exit_code))
            } else {
                None
            };
            CodeExecutionResult {
                status: if error.is_some() {
                    ExecutionStatus::Failed
                } else {
                    ExecutionStatus::Success
                },
                stdout: output.stdout,
                stderr: output.stderr,
                error,
            }
        }
        Err(err) => CodeExecutionResult {
            stdout: String::new(),
            stderr: String::new(),
            status: ExecutionStatus::Failed,
            error: Some(err.to_string()),
        },
    }
}

/// Single-quote `s` for `sh -c`.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::{MockProcessRunner, Scripted};
    use std::sync::Mutex;

    fn materializer(runner: MockProcessRunner, dir: &Path) -> CodeMaterializer<MockProcessRunner> {
        CodeMaterializer::new(
            Arc::new(runner),
            dir.join("artifacts"),
            "node",
            Duration::from_secs(5),
        )
    }

    fn artifact_path(command: &str) -> PathBuf {
        let quoted = command.strip_prefix("node ").unwrap();
        PathBuf::from(quoted.trim_matches('\''))
    }

    fn leftover_files(dir: &Path) -> usize {
        std::fs::read_dir(dir.join("artifacts")).unwrap().count()
    }

    #[tokio::test]
    async fn bash_runs_code_directly() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().script("echo hello", Scripted::ok(&["hello"]));
        let m = materializer(runner, tmp.path());

        let result = m.execute("echo hello", CodeLanguage::Bash).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "hello\n");
        assert!(result.error.is_none());
        assert_eq!(m.runner.calls(), vec!["echo hello".to_string()]);
    }

    #[tokio::test]
    async fn javascript_artifact_exists_during_run_and_is_removed_after() {
        let tmp = tempfile::tempdir().unwrap();
        let seen: Arc<Mutex<Option<(PathBuf, String)>>> = Arc::new(Mutex::new(None));
        let seen_hook = Arc::clone(&seen);
        let runner = MockProcessRunner::new().with_hook(move |cmd| {
            let path = artifact_path(cmd);
            let content = std::fs::read_to_string(&path).unwrap();
            *seen_hook.lock().unwrap() = Some((path, content));
        });
        let m = materializer(runner, tmp.path());

        let result = m
            .execute("console.log('hi')", CodeLanguage::Javascript)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);

        let (path, content) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(content, "console.log('hi')");
        assert!(path.starts_with(tmp.path().join("artifacts")));
        assert!(path.extension().is_some_and(|e| e == "js"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn no_artifacts_leak_after_repeated_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().with_default(Scripted::exit(1, &["SyntaxError"]));
        let m = materializer(runner, tmp.path());

        for _ in 0..5 {
            let result = m.execute("not js", CodeLanguage::Javascript).await.unwrap();
            assert_eq!(result.status, ExecutionStatus::Failed);
            assert_eq!(result.error.as_deref(), Some("SyntaxError"));
        }
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn no_artifacts_leak_after_timeouts() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().with_default(Scripted::Timeout);
        let m = materializer(runner, tmp.path());

        for _ in 0..5 {
            let result = m
                .execute("while(true){}", CodeLanguage::Javascript)
                .await
                .unwrap();
            assert_eq!(result.status, ExecutionStatus::Failed);
            assert!(result.error.unwrap().contains("timed out"));
        }
        assert_eq!(leftover_files(tmp.path()), 0);
    }

    #[tokio::test]
    async fn artifact_names_are_unique_per_invocation() {
        let tmp = tempfile::tempdir().unwrap();
        let paths: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let paths_hook = Arc::clone(&paths);
        let runner = MockProcessRunner::new().with_hook(move |cmd| {
            paths_hook.lock().unwrap().push(artifact_path(cmd));
        });
        let m = materializer(runner, tmp.path());

        for _ in 0..4 {
            m.execute("console.log(1)", CodeLanguage::Javascript)
                .await
                .unwrap();
        }
        let mut paths = paths.lock().unwrap().clone();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }

    #[tokio::test]
    async fn dangerous_code_never_reaches_the_runner() {
        let tmp = tempfile::tempdir().unwrap();
        let m = materializer(MockProcessRunner::new(), tmp.path());

        for (code, lang) in [
            ("rm -rf /", CodeLanguage::Bash),
            (":(){ :|:& };:", CodeLanguage::Bash),
            ("eval('2')", CodeLanguage::Javascript),
            ("require('child_process').spawn('ls')", CodeLanguage::Javascript),
        ] {
            let err = m.execute(code, lang).await.unwrap_err();
            assert!(matches!(err, CodeError::DangerousCode { .. }), "{code}");
        }
        assert!(m.runner.calls().is_empty());
        assert!(!tmp.path().join("artifacts").exists());
    }

    #[tokio::test]
    async fn stderr_with_zero_exit_is_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().with_default(Scripted::Exit {
            code: 0,
            stdout: vec!["partial".to_string()],
            stderr: vec!["warning: deprecated".to_string()],
        });
        let m = materializer(runner, tmp.path());

        let result = m.execute("echo partial", CodeLanguage::Bash).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("warning: deprecated"));
        assert_eq!(result.stdout, "partial\n");
    }

    #[tokio::test]
    async fn non_zero_exit_without_stderr_reports_code() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().with_default(Scripted::exit(3, &[]));
        let m = materializer(runner, tmp.path());

        let result = m.execute("exit 3", CodeLanguage::Bash).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("process exited with code 3"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/tmp/a b.js"), "'/tmp/a b.js'");
        assert_eq!(shell_quote("it's.js"), r"'it'\''s.js'");
    }
}
