//! Policy around the external AI planner.
//!
//! The planner itself (free text in, automation description out) lives
//! outside the engine behind the `AutomationPlanner` trait. This module ships
//! what surrounds it: response parsing and validation (`parser`) and a
//! rate-limited, cached, retrying decorator (`retry`).

pub mod parser;
pub mod retry;

use serde::{Deserialize, Serialize};
use synapscript_types::automation::{Action, Automation, GeneratedCode, Trigger};

use crate::code::DangerousPattern;

pub use parser::{extract_json, parse_plan};
pub use retry::RetryingPlanner;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// A structured automation description produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationPlan {
    /// The planner's restatement of the user's intent.
    pub understanding: String,
    pub automation: AutomationDraft,
    pub generated_code: GeneratedCode,
    /// Permissions, packages or devices the automation needs. Free-form.
    pub requirements: serde_json::Value,
}

/// The automation part of a plan, before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDraft {
    pub name: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl AutomationPlan {
    /// Turn the plan into a new automation record.
    pub fn into_automation(self) -> Automation {
        let mut automation = Automation::new(self.automation.name, self.automation.trigger)
            .with_generated_code(self.generated_code);
        automation.actions = self.automation.actions;
        automation
    }
}

// ---------------------------------------------------------------------------
// PlannerError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlannerError {
    /// The provider refused for quota reasons. Never retried.
    #[error("planner quota exceeded: {0}")]
    Quota(String),

    /// A transient request failure.
    #[error("planner request failed: {0}")]
    Request(String),

    /// The response could not be parsed or is missing required fields.
    #[error("invalid planner response: {0}")]
    InvalidResponse(String),

    /// The generated code failed the denylist scan.
    #[error("generated code contains dangerous pattern: {0}")]
    DangerousCode(DangerousPattern),

    /// Every attempt failed.
    #[error("planner failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<PlannerError>,
    },
}

impl PlannerError {
    pub fn is_quota(&self) -> bool {
        matches!(self, PlannerError::Quota(_))
    }
}

// ---------------------------------------------------------------------------
// AutomationPlanner trait
// ---------------------------------------------------------------------------

/// Turns free-text intent into an `AutomationPlan`.
pub trait AutomationPlanner: Send + Sync {
    fn plan(
        &self,
        intent: &str,
    ) -> impl std::future::Future<Output = Result<AutomationPlan, PlannerError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapscript_types::automation::{ActionKind, CodeLanguage};

    #[test]
    fn plan_becomes_automation() {
        let plan = AutomationPlan {
            understanding: "Check battery".to_string(),
            automation: AutomationDraft {
                name: "Battery check".to_string(),
                trigger: Trigger::Schedule {
                    cron_expression: "0 * * * *".to_string(),
                },
                actions: vec![Action::new(
                    ActionKind::TermuxApi,
                    "Read battery",
                    "termux-battery-status",
                )],
            },
            generated_code: GeneratedCode {
                language: CodeLanguage::Bash,
                code: "termux-battery-status".to_string(),
            },
            requirements: serde_json::json!(["termux-api"]),
        };

        let automation = plan.into_automation();
        assert_eq!(automation.name, "Battery check");
        assert_eq!(automation.cron_expression(), Some("0 * * * *"));
        assert_eq!(automation.actions.len(), 1);
        assert!(automation.generated_code.is_some());
    }

    #[test]
    fn exhausted_message_includes_last_error() {
        let err = PlannerError::Exhausted {
            attempts: 3,
            last: Box::new(PlannerError::Request("503".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "planner failed after 3 attempts: planner request failed: 503"
        );
    }
}
