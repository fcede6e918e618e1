//! Execution-scoped types: steps, run outcomes, and execution logs.
//!
//! `Step` values are ephemeral. They are created fresh for every run from the
//! automation's action list, mutated by the step executor, and discarded once
//! the run is summarized into an `ExecutionLog`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::automation::Action;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One action instance within a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub status: StepStatus,
    /// Shell command. Empty means the step auto-completes without a process.
    pub command: String,
}

impl Step {
    /// A pending step.
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: StepStatus::Pending,
            command: command.into(),
        }
    }

    /// Whether this step is a no-op checkpoint.
    pub fn is_noop(&self) -> bool {
        self.command.trim().is_empty()
    }
}

impl From<&Action> for Step {
    fn from(action: &Action) -> Self {
        Step::new(action.description.clone(), action.command.clone())
    }
}

/// Lifecycle of a step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in-progress"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run status / origin
// ---------------------------------------------------------------------------

/// Terminal status of a run or a code execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

/// Who asked for a run.
///
/// Scheduled runs carry their own internal authorization: they never need an
/// end-user token, because the engine only accepts requests that have already
/// passed the auth gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunOrigin {
    Manual,
    Schedule { fired_at: DateTime<Utc> },
    Event,
}

impl RunOrigin {
    pub fn kind(&self) -> RunOriginKind {
        match self {
            RunOrigin::Manual => RunOriginKind::Manual,
            RunOrigin::Schedule { .. } => RunOriginKind::Schedule,
            RunOrigin::Event => RunOriginKind::Event,
        }
    }
}

/// The origin recorded on an execution log, without per-run detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOriginKind {
    Manual,
    Schedule,
    Event,
}

impl std::fmt::Display for RunOriginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOriginKind::Manual => write!(f, "manual"),
            RunOriginKind::Schedule => write!(f, "schedule"),
            RunOriginKind::Event => write!(f, "event"),
        }
    }
}

impl std::str::FromStr for RunOriginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RunOriginKind::Manual),
            "schedule" => Ok(RunOriginKind::Schedule),
            "event" => Ok(RunOriginKind::Event),
            other => Err(format!("invalid run origin: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionLog
// ---------------------------------------------------------------------------

/// Append-only record of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub run_id: Uuid,
    pub status: ExecutionStatus,
    /// Combined stdout/stderr of the run.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub origin: RunOriginKind,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Code execution result
// ---------------------------------------------------------------------------

/// Result of running generated code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
