//! Cron scheduling of automations.

pub mod cron;
pub mod scheduler;

pub use cron::{CronError, CronExpression};
pub use scheduler::{AutomationScheduler, ReconcileSummary, ScheduleOutcome, SchedulerError, TickHandler};
