//! Scheduling commands: cron preview and the foreground scheduler daemon.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use synapscript_core::schedule::CronExpression;
use tokio::sync::broadcast::error::RecvError;

use super::render::print_event;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Cron preview
// ---------------------------------------------------------------------------

pub fn preview_cron(expression: &str, count: usize, json: bool) -> Result<()> {
    let cron = CronExpression::parse(expression)
        .with_context(|| format!("invalid cron expression '{expression}'"))?;
    let upcoming = cron.upcoming(count);

    if json {
        let out = serde_json::json!({
            "expression": cron.as_str(),
            "next": upcoming.iter().map(|t| t.to_rfc3339()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("✓").green(), style(cron.as_str()).cyan());
    for time in &upcoming {
        println!("    {}", time.format("%a %Y-%m-%d %H:%M UTC"));
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Schedule every stored automation and stream run events until `shutdown`
/// resolves. The schedule is re-synced with the store every `sync_interval`.
pub async fn run_daemon(
    state: &AppState,
    shutdown: impl Future<Output = ()>,
    sync_interval: Duration,
    json: bool,
    quiet: bool,
) -> Result<()> {
    state.engine.start().await?;
    let summary = state.engine.reconcile_from_store().await?;
    tracing::info!(
        scheduled = summary.scheduled,
        skipped = summary.skipped,
        failed = summary.failed,
        "scheduler reconciled"
    );

    if !json && !quiet {
        print_schedule(state).await?;
        println!(
            "  {} Scheduler running with {} job(s)",
            style("⚡").bold(),
            style(summary.scheduled).cyan()
        );
        if summary.skipped > 0 || summary.failed > 0 {
            println!(
                "  {}",
                style(format!(
                    "{} skipped (invalid cron), {} failed to install",
                    summary.skipped, summary.failed
                ))
                .yellow()
            );
        }
        println!("  {}", style("Press Ctrl+C to stop").dim());
        println!();
    }

    let mut rx = state.engine.subscribe();
    let mut sync = tokio::time::interval(sync_interval);
    sync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately and the store was just read.
    sync.tick().await;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sync.tick() => sync_with_store(state).await,
            received = rx.recv() => match received {
                Ok(event) => print_event(&event, json, quiet)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged, some output was dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    state.engine.shutdown().await?;
    if !json && !quiet {
        println!("\n  Scheduler stopped.");
    }
    Ok(())
}

/// Pick up automations added, changed or deleted by other processes.
async fn sync_with_store(state: &AppState) {
    match state.engine.reconcile_from_store().await {
        Ok(summary) if summary.removed > 0 || summary.failed > 0 => {
            tracing::info!(
                scheduled = summary.scheduled,
                removed = summary.removed,
                failed = summary.failed,
                "schedule synced with store"
            );
        }
        Ok(summary) => {
            tracing::debug!(scheduled = summary.scheduled, "schedule synced with store");
        }
        Err(err) => tracing::warn!(error = %err, "failed to sync schedule with store"),
    }
}

async fn print_schedule(state: &AppState) -> Result<()> {
    let automations = state.engine.list_automations().await?;

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Cron"),
            Cell::new("Next run"),
        ]);

    let mut rows = 0;
    for automation in &automations {
        let Some(expr) = automation.cron_expression() else {
            continue;
        };
        let next = match state.engine.next_fire(automation.id).await {
            Some(time) => Cell::new(time.format("%Y-%m-%d %H:%M UTC")),
            None => Cell::new("not scheduled").fg(Color::Yellow),
        };
        table.add_row(vec![Cell::new(&automation.name), Cell::new(expr), next]);
        rows += 1;
    }

    if rows > 0 {
        println!();
        println!("{table}");
    }
    println!();
    Ok(())
}
