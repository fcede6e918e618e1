//! Test-double process runner that records commands and returns scripted results.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{OutputLine, OutputSink, ProcessError, ProcessOutput, ProcessRunner};

/// Scripted behaviour for one command.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Exit {
        code: i32,
        stdout: Vec<String>,
        stderr: Vec<String>,
    },
    Timeout,
    SpawnFailure,
}

impl Scripted {
    pub(crate) fn ok(stdout: &[&str]) -> Self {
        Scripted::Exit {
            code: 0,
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: Vec::new(),
        }
    }

    pub(crate) fn exit(code: i32, stderr: &[&str]) -> Self {
        Scripted::Exit {
            code,
            stdout: Vec::new(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
        }
    }
}

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Records every command and answers from a script table.
///
/// Lookup is exact match first, then the longest scripted prefix, then the
/// default (`exit 0`, no output).
pub(crate) struct MockProcessRunner {
    scripts: Mutex<HashMap<String, Scripted>>,
    default: Scripted,
    calls: Mutex<Vec<String>>,
    hook: Option<Hook>,
}

impl MockProcessRunner {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Scripted::ok(&[]),
            calls: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    pub(crate) fn script(self, command: &str, result: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), result);
        self
    }

    pub(crate) fn with_default(mut self, result: Scripted) -> Self {
        self.default = result;
        self
    }

    /// Called with the command before the scripted result is produced.
    pub(crate) fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, command: &str) -> Scripted {
        let scripts = self.scripts.lock().unwrap();
        if let Some(s) = scripts.get(command) {
            return s.clone();
        }
        scripts
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl ProcessRunner for MockProcessRunner {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
        sink: Option<OutputSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.to_string());
        if let Some(hook) = &self.hook {
            hook(command);
        }

        match self.lookup(command) {
            Scripted::Exit {
                code,
                stdout,
                stderr,
            } => {
                if let Some(sink) = &sink {
                    for line in &stdout {
                        let _ = sink.send(OutputLine::stdout(line.clone()));
                    }
                    for line in &stderr {
                        let _ = sink.send(OutputLine::stderr(line.clone()));
                    }
                }
                let join = |lines: &[String]| -> String {
                    lines.iter().map(|l| format!("{l}\n")).collect()
                };
                Ok(ProcessOutput {
                    stdout: join(&stdout),
                    stderr: join(&stderr),
                    exit_code: code,
                })
            }
            Scripted::Timeout => Err(ProcessError::Timeout {
                command: command.to_string(),
                elapsed: timeout,
            }),
            Scripted::SpawnFailure => Err(ProcessError::Spawn {
                command: command.to_string(),
                reason: "no such file or directory".to_string(),
            }),
        }
    }
}
