//! Automation management commands: add, update, list, show, delete, history.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Deserialize;
use synapscript_core::code::safety;
use synapscript_core::planner::parse_plan;
use synapscript_core::schedule::CronExpression;
use synapscript_types::automation::{Action, Automation, AutomationUpdate, GeneratedCode, Trigger};

use super::parse_id;
use super::render::{format_trigger, status_cell};
use crate::state::AppState;

/// A hand-written automation definition.
#[derive(Debug, Deserialize)]
struct AutomationFile {
    name: String,
    trigger: Trigger,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    generated_code: Option<GeneratedCode>,
}

impl AutomationFile {
    fn into_automation(self) -> Automation {
        let mut automation = Automation::new(self.name, self.trigger);
        automation.actions = self.actions;
        automation.generated_code = self.generated_code;
        automation
    }
}

/// Read an automation from `text`: a planner response when it carries an
/// `understanding` field, a plain definition otherwise.
fn parse_automation(text: &str) -> Result<Automation> {
    let value: serde_json::Value = serde_json::from_str(text).context("file is not valid JSON")?;
    if value.get("understanding").is_some() {
        let plan = parse_plan(text)?;
        return Ok(plan.into_automation());
    }
    let file: AutomationFile =
        serde_json::from_value(value).context("invalid automation definition")?;
    Ok(file.into_automation())
}

/// Reject definitions the engine would refuse at run time.
fn validate(automation: &Automation) -> Result<()> {
    if automation.name.trim().is_empty() {
        bail!("automation name must not be empty");
    }
    if let Some(expr) = automation.cron_expression() {
        CronExpression::parse(expr).with_context(|| format!("invalid schedule '{expr}'"))?;
    }
    if let Some(code) = &automation.generated_code {
        if let Some(pattern) = safety::scan(&code.code) {
            bail!("generated code contains a blocked pattern: {pattern}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

pub async fn add_automation(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let automation = parse_automation(&text)?;
    validate(&automation)?;

    let created = state.engine.create_automation(automation).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!();
        println!(
            "  {} Added automation '{}'",
            style("*").green().bold(),
            style(&created.name).cyan()
        );
        println!("  ID: {}", created.id);
        println!("  Trigger: {}", format_trigger(&created.trigger));
        println!("  Actions: {}", created.actions.len());
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

fn parse_update(text: &str) -> Result<AutomationUpdate> {
    let update: AutomationUpdate = serde_json::from_str(text).context("invalid automation update")?;
    if update.name.is_none()
        && update.trigger.is_none()
        && update.actions.is_none()
        && update.generated_code.is_none()
    {
        bail!("update changes nothing; expected name, trigger, actions or generated_code");
    }
    Ok(update)
}

pub async fn update_automation(state: &AppState, raw_id: &str, file: &Path, json: bool) -> Result<()> {
    let id = parse_id(raw_id)?;
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let update = parse_update(&text)?;

    // Validate the result, not just the patch.
    let mut preview = state.engine.get_automation(id).await?;
    preview.apply(update.clone());
    validate(&preview)?;

    let updated = state.engine.update_automation(id, update).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!();
        println!(
            "  {} Updated automation '{}'",
            style("*").green().bold(),
            style(&updated.name).cyan()
        );
        println!("  Trigger: {}", format_trigger(&updated.trigger));
        println!("  Actions: {}", updated.actions.len());
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn list_automations(state: &AppState, json: bool) -> Result<()> {
    let automations = state.engine.list_automations().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&automations)?);
        return Ok(());
    }

    if automations.is_empty() {
        println!();
        println!("  No automations registered.");
        println!("  Add one with: {}", style("synapse add <file.json>").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("ID"),
            Cell::new("Trigger"),
            Cell::new("Actions"),
            Cell::new("Code"),
        ]);

    for a in &automations {
        let code = a
            .generated_code
            .as_ref()
            .map(|c| c.language.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&a.name),
            Cell::new(a.id),
            Cell::new(format_trigger(&a.trigger)),
            Cell::new(a.actions.len()),
            Cell::new(code),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

pub async fn show_automation(state: &AppState, raw_id: &str, json: bool) -> Result<()> {
    let id = parse_id(raw_id)?;
    let automation = state.engine.get_automation(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&automation)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&automation.name).cyan().bold());
    println!("  ID:      {}", automation.id);
    println!("  Trigger: {}", format_trigger(&automation.trigger));
    if let Some(expr) = automation.cron_expression() {
        if let Ok(cron) = CronExpression::parse(expr) {
            if let Some(next) = cron.upcoming(1).first() {
                println!("  Next:    {}", next.format("%Y-%m-%d %H:%M UTC"));
            }
        }
    }
    println!("  Created: {}", automation.created_at.format("%Y-%m-%d %H:%M"));
    println!("  Updated: {}", automation.updated_at.format("%Y-%m-%d %H:%M"));

    if !automation.actions.is_empty() {
        println!();
        println!("  Actions:");
        for (i, action) in automation.actions.iter().enumerate() {
            let command = if action.command.trim().is_empty() {
                style("(checkpoint)".to_string()).dim()
            } else {
                style(action.command.clone()).dim()
            };
            println!("    {}. {} {}", i + 1, action.description, command);
        }
    }

    if let Some(code) = &automation.generated_code {
        println!();
        println!("  Generated code ({}):", code.language);
        for line in code.code.lines() {
            println!("    {}", style(line).dim());
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

pub async fn delete_automation(state: &AppState, raw_id: &str, force: bool, json: bool) -> Result<()> {
    let id = parse_id(raw_id)?;
    let automation = state.engine.get_automation(id).await?;

    if !force && !json {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Delete automation '{}' and its run history?",
                automation.name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let deleted = state.engine.delete_automation(id).await?;

    if json {
        let out = serde_json::json!({ "id": id.to_string(), "deleted": deleted });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "  {} Deleted automation '{}'",
            style("*").green().bold(),
            style(&automation.name).cyan()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub async fn show_history(state: &AppState, raw_id: &str, limit: u32, json: bool) -> Result<()> {
    let id = parse_id(raw_id)?;
    let automation = state.engine.get_automation(id).await?;
    let logs = state.engine.history(id, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }

    if logs.is_empty() {
        println!();
        println!("  No runs for '{}' yet.", automation.name);
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("When").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Origin"),
            Cell::new("Run ID"),
            Cell::new("Error"),
        ]);

    for log in &logs {
        table.add_row(vec![
            Cell::new(log.created_at.format("%Y-%m-%d %H:%M:%S")),
            status_cell(log.status),
            Cell::new(log.origin),
            Cell::new(log.run_id),
            Cell::new(log.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("  Recent runs of '{}':", style(&automation.name).cyan());
    println!("{table}");
    println!();
    Ok(())
}
