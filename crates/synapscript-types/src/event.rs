//! Event types for the automation event bus.
//!
//! `AutomationEvent` is what the step executor and the code runner publish as a
//! run progresses. The transport layer subscribes and forwards these to
//! clients; every variant carries the run and automation IDs so one bus can
//! multiplex concurrent runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::Step;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AutomationEvent {
    /// A step changed status.
    StepUpdate {
        run_id: Uuid,
        automation_id: Uuid,
        step: Step,
        /// 0-based position of the step in the run.
        index: usize,
    },

    /// A line of process output. Stderr lines are prefixed with `ERROR: `.
    Log {
        run_id: Uuid,
        automation_id: Uuid,
        message: String,
    },

    /// Every step completed.
    AutomationComplete { run_id: Uuid, automation_id: Uuid },

    /// The run stopped early.
    AutomationFailed {
        run_id: Uuid,
        automation_id: Uuid,
        message: String,
    },
}

impl AutomationEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            AutomationEvent::StepUpdate { run_id, .. }
            | AutomationEvent::Log { run_id, .. }
            | AutomationEvent::AutomationComplete { run_id, .. }
            | AutomationEvent::AutomationFailed { run_id, .. } => *run_id,
        }
    }

    pub fn automation_id(&self) -> Uuid {
        match self {
            AutomationEvent::StepUpdate { automation_id, .. }
            | AutomationEvent::Log { automation_id, .. }
            | AutomationEvent::AutomationComplete { automation_id, .. }
            | AutomationEvent::AutomationFailed { automation_id, .. } => *automation_id,
        }
    }

    /// Whether this event ends its run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AutomationEvent::AutomationComplete { .. } | AutomationEvent::AutomationFailed { .. }
        )
    }
}
