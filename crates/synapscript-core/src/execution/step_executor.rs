//! Sequential step executor.
//!
//! Runs an ordered step list through a `ProcessRunner`, one step at a time,
//! publishing every status transition and output line on the `EventBus`.
//!
//! # State machine
//!
//! ```text
//! idle -> running(i) -> running(i + 1) | completed | failed
//! ```
//!
//! The first failing step ends the run: later steps are never started and
//! keep their `pending` status. A step with an empty command completes
//! without a process.
//!
//! A `StepExecutor` is consumed by `run`, so each instance drives exactly one
//! run. Concurrent runs use separate executors sharing the same bus.

use std::sync::Arc;
use std::time::Duration;

use synapscript_types::event::AutomationEvent;
use synapscript_types::execution::{ExecutionStatus, Step, StepStatus};
use uuid::Uuid;

use super::with_log_stream;
use crate::event::EventBus;
use crate::process::{ProcessError, ProcessOutput, ProcessRunner};

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// Final state of one step run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    /// Every step with its final status.
    pub steps: Vec<Step>,
    /// Combined stdout/stderr of every process started during the run.
    pub output: String,
    /// Message carried by the `automation-failed` event.
    pub error: Option<String>,
    /// 0-based index of the step that failed.
    pub failed_step: Option<usize>,
    /// Exit code of the failing step, if it exited at all.
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    /// The terminal event this outcome corresponds to.
    pub fn terminal_event(&self, run_id: Uuid, automation_id: Uuid) -> AutomationEvent {
        match (&self.status, &self.error) {
            (ExecutionStatus::Failed, Some(message)) => AutomationEvent::AutomationFailed {
                run_id,
                automation_id,
                message: message.clone(),
            },
            (ExecutionStatus::Failed, None) => AutomationEvent::AutomationFailed {
                run_id,
                automation_id,
                message: "run failed".to_string(),
            },
            (ExecutionStatus::Success, _) => AutomationEvent::AutomationComplete {
                run_id,
                automation_id,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StepExecutor
// ---------------------------------------------------------------------------

pub struct StepExecutor<P: ProcessRunner> {
    runner: Arc<P>,
    bus: EventBus,
    run_id: Uuid,
    automation_id: Uuid,
    step_timeout: Duration,
}

impl<P: ProcessRunner> StepExecutor<P> {
    pub fn new(
        runner: Arc<P>,
        bus: EventBus,
        run_id: Uuid,
        automation_id: Uuid,
        step_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            bus,
            run_id,
            automation_id,
            step_timeout,
        }
    }

    /// Run `steps` in order and publish the terminal event.
    pub async fn run(self, mut steps: Vec<Step>) -> RunOutcome {
        tracing::info!(
            run_id = %self.run_id,
            automation_id = %self.automation_id,
            steps = steps.len(),
            "run started"
        );

        let mut output = String::new();

        for index in 0..steps.len() {
            // pending -> completed, no in-progress update
            if steps[index].is_noop() {
                tracing::debug!(run_id = %self.run_id, step = index, "no-op step completed");
                steps[index].status = StepStatus::Completed;
                self.emit_step(&steps[index], index);
                continue;
            }

            steps[index].status = StepStatus::InProgress;
            self.emit_step(&steps[index], index);

            let result = self.run_command(&steps[index].command).await;

            let (exit_code, message) = match result {
                Ok(process) if process.success() => {
                    output.push_str(&process.combined());
                    tracing::debug!(run_id = %self.run_id, step = index, "step completed");
                    steps[index].status = StepStatus::Completed;
                    self.emit_step(&steps[index], index);
                    continue;
                }
                Ok(process) => {
                    output.push_str(&process.combined());
                    let message = exit_failure_message(index, &steps[index], &process);
                    (Some(process.exit_code), message)
                }
                Err(err) => (None, error_failure_message(index, &steps[index], &err)),
            };

            steps[index].status = StepStatus::Failed;
            self.emit_step(&steps[index], index);
            self.bus.publish(AutomationEvent::AutomationFailed {
                run_id: self.run_id,
                automation_id: self.automation_id,
                message: message.clone(),
            });
            tracing::info!(
                run_id = %self.run_id,
                automation_id = %self.automation_id,
                step = index,
                exit_code = ?exit_code,
                "run failed"
            );

            return RunOutcome {
                status: ExecutionStatus::Failed,
                steps,
                output,
                error: Some(message),
                failed_step: Some(index),
                exit_code,
            };
        }

        self.bus.publish(AutomationEvent::AutomationComplete {
            run_id: self.run_id,
            automation_id: self.automation_id,
        });
        tracing::info!(
            run_id = %self.run_id,
            automation_id = %self.automation_id,
            "run completed"
        );

        RunOutcome {
            status: ExecutionStatus::Success,
            steps,
            output,
            error: None,
            failed_step: None,
            exit_code: None,
        }
    }

    async fn run_command(&self, command: &str) -> Result<ProcessOutput, ProcessError> {
        let runner = Arc::clone(&self.runner);
        let timeout = self.step_timeout;
        with_log_stream(&self.bus, self.run_id, self.automation_id, |sink| async move {
            runner.run(command, timeout, Some(sink)).await
        })
        .await
    }

    fn emit_step(&self, step: &Step, index: usize) {
        self.bus.publish(AutomationEvent::StepUpdate {
            run_id: self.run_id,
            automation_id: self.automation_id,
            step: step.clone(),
            index,
        });
    }
}

fn exit_failure_message(index: usize, step: &Step, process: &ProcessOutput) -> String {
    let mut message = format!(
        "Step {} ({}) failed with exit code {}",
        index + 1,
        step.label,
        process.exit_code
    );
    if let Some(line) = process.last_line() {
        message.push_str(": ");
        message.push_str(line);
    }
    message
}

fn error_failure_message(index: usize, step: &Step, err: &ProcessError) -> String {
    format!("Step {} ({}) failed: {err}", index + 1, step.label)
}
