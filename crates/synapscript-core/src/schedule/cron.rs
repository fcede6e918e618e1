//! Cron expression validation.
//!
//! Automations carry standard five-field expressions
//! (`minute hour day-of-month month day-of-week`). `tokio-cron-scheduler`
//! expects a leading seconds field, so installed jobs use the six-field form
//! with seconds pinned to `0`.
//!
//! Expressions are evaluated in UTC, both for installed jobs and for
//! `next_after`/`upcoming`: `0 9 * * 1-5` fires at 09:00 UTC on weekdays.

use chrono::{DateTime, Utc};

/// Why an expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 cron fields, found {found}")]
    FieldCount { found: usize },

    #[error("invalid cron expression: {0}")]
    Syntax(String),
}

/// A validated five-field cron expression.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    cron: croner::Cron,
}

impl CronExpression {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount {
                found: fields.len(),
            });
        }
        let source = fields.join(" ");
        let cron = source
            .parse::<croner::Cron>()
            .map_err(|e| CronError::Syntax(e.to_string()))?;
        Ok(Self { source, cron })
    }

    /// The normalized five-field expression.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Six-field form for `tokio_cron_scheduler::Job`.
    pub fn job_expression(&self) -> String {
        format!("0 {}", self.source)
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.iter_after(after).next()
    }

    /// The next `count` fire times after now.
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Utc>> {
        self.cron.iter_after(Utc::now()).take(count).collect()
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
