//! Automation domain types.
//!
//! An `Automation` is a named unit of work with a trigger (manual, cron
//! schedule, or event), an ordered list of actions, and optionally a single
//! generated script. The persistence layer owns these records; the scheduler
//! only ever holds their IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

/// A registered automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    /// UUIDv7 assigned on creation.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// What causes this automation to run.
    pub trigger: Trigger,
    /// Ordered actions, executed one after another as steps.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Generated script to run when the automation has no actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<GeneratedCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Automation {
    /// Build a new automation with a fresh ID and current timestamps.
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            trigger,
            actions: Vec::new(),
            generated_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append an action (builder style).
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Attach generated code (builder style).
    pub fn with_generated_code(mut self, code: GeneratedCode) -> Self {
        self.generated_code = Some(code);
        self
    }

    /// The cron expression, if this automation is schedule-triggered.
    pub fn cron_expression(&self) -> Option<&str> {
        match &self.trigger {
            Trigger::Schedule { cron_expression } => Some(cron_expression.as_str()),
            _ => None,
        }
    }

    /// Apply a partial update in place. `updated_at` always moves forward.
    pub fn apply(&mut self, update: AutomationUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(trigger) = update.trigger {
            self.trigger = trigger;
        }
        if let Some(actions) = update.actions {
            self.actions = actions;
        }
        if let Some(code) = update.generated_code {
            self.generated_code = code;
        }
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What causes an automation to run.
///
/// Internally tagged by `type`:
/// ```json
/// { "type": "schedule", "cron_expression": "*/5 * * * *" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Run only when explicitly requested.
    Manual,
    /// Run on a 5-field cron schedule.
    Schedule { cron_expression: String },
    /// Run when an external event described in free text occurs.
    Event { description: String },
}

impl Trigger {
    /// Short label used in logs and execution history.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Schedule { .. } => "schedule",
            Trigger::Event { .. } => "event",
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One action in an automation's ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Human-readable description, shown as the step label.
    pub description: String,
    /// Emoji or icon name for the UI.
    #[serde(default)]
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Shell command. Empty means a no-op checkpoint.
    #[serde(default)]
    pub command: String,
}

impl Action {
    pub fn new(kind: ActionKind, description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            icon: String::new(),
            kind,
            command: command.into(),
        }
    }
}

/// The family of command an action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    TermuxApi,
    NodeScript,
    BashCommand,
}

// ---------------------------------------------------------------------------
// Generated code
// ---------------------------------------------------------------------------

/// A script produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub language: CodeLanguage,
    pub code: String,
}

/// Languages the code materializer knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLanguage {
    Javascript,
    Bash,
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeLanguage::Javascript => write!(f, "javascript"),
            CodeLanguage::Bash => write!(f, "bash"),
        }
    }
}

impl std::str::FromStr for CodeLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Ok(CodeLanguage::Javascript),
            "bash" | "sh" | "shell" => Ok(CodeLanguage::Bash),
            other => Err(format!("unsupported language: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Partial update
// ---------------------------------------------------------------------------

/// Partial update of an automation. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    /// `Some(None)` clears the generated code. In JSON, an explicit `null`
    /// clears it and an absent key leaves it alone.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub generated_code: Option<Option<GeneratedCode>>,
}

/// Only called when the key is present, so `null` becomes `Some(None)`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
