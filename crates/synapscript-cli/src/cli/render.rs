//! Shared terminal rendering for automations and run events.

use comfy_table::{Cell, Color};
use console::style;
use synapscript_core::execution::STDERR_PREFIX;
use synapscript_types::automation::Trigger;
use synapscript_types::event::AutomationEvent;
use synapscript_types::execution::{ExecutionStatus, StepStatus};

/// One-line description of a trigger.
pub fn format_trigger(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Manual => "manual".to_string(),
        Trigger::Schedule { cron_expression } => format!("schedule ({cron_expression})"),
        Trigger::Event { description } => format!("event ({description})"),
    }
}

/// Status cell colored by outcome.
pub fn status_cell(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Success => Cell::new(status).fg(Color::Green),
        ExecutionStatus::Failed => Cell::new(status).fg(Color::Red),
    }
}

/// Print one run event.
///
/// JSON mode writes the event as a single JSON line. Quiet mode prints only
/// the terminal event.
pub fn print_event(event: &AutomationEvent, json: bool, quiet: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    if quiet && !event.is_terminal() {
        return Ok(());
    }

    match event {
        AutomationEvent::StepUpdate { step, index, .. } => {
            let position = index + 1;
            match step.status {
                StepStatus::Pending => {}
                StepStatus::InProgress => {
                    println!("  {} [{position}] {}", style("▸").cyan(), step.label);
                }
                StepStatus::Completed => {
                    println!("  {} [{position}] {}", style("✓").green(), step.label);
                }
                StepStatus::Failed => {
                    println!("  {} [{position}] {}", style("✗").red(), step.label);
                }
            }
        }
        AutomationEvent::Log { message, .. } => {
            if message.starts_with(STDERR_PREFIX) {
                println!("      {}", style(message).red());
            } else {
                println!("      {}", style(message).dim());
            }
        }
        AutomationEvent::AutomationComplete { .. } => {
            println!();
            println!("  {} Automation complete", style("✓").green().bold());
        }
        AutomationEvent::AutomationFailed { message, .. } => {
            println!();
            println!("  {} {}", style("✗").red().bold(), message);
        }
    }
    Ok(())
}
