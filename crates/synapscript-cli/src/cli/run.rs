//! Run commands: run an automation now, execute a script file.

use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use synapscript_types::automation::CodeLanguage;
use synapscript_types::execution::ExecutionStatus;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::parse_id;
use super::render::print_event;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run an automation and stream its events until the run finishes.
pub async fn run_automation(state: &AppState, raw_id: &str, json: bool, quiet: bool) -> Result<()> {
    let id = parse_id(raw_id)?;
    let automation = state.engine.get_automation(id).await?;

    if !json && !quiet {
        println!();
        println!(
            "  {} Running '{}'",
            style("⚡").bold(),
            style(&automation.name).cyan()
        );
        println!();
    }

    // Subscribe before submitting so no event is missed.
    let mut rx = state.engine.subscribe();
    let handle = state.engine.submit_manual_run(automation);
    let run_id = handle.run_id;
    let mut join = handle.join;

    let mut events_open = true;
    let log = loop {
        tokio::select! {
            finished = &mut join => {
                break finished.context("run task failed")?;
            }
            received = rx.recv(), if events_open => match received {
                Ok(event) if event.run_id() == run_id => print_event(&event, json, quiet)?,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged, some output was dropped");
                }
                Err(RecvError::Closed) => events_open = false,
            },
        }
    };

    // Events published just before the task finished.
    loop {
        match rx.try_recv() {
            Ok(event) if event.run_id() == run_id => print_event(&event, json, quiet)?,
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    if !json && !quiet {
        println!();
    }
    if log.status == ExecutionStatus::Failed {
        bail!(
            "run {run_id} failed: {}",
            log.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Exec
// ---------------------------------------------------------------------------

/// Language from the `--language` flag, else from the file extension.
fn resolve_language(file: &Path, flag: Option<&str>) -> Result<CodeLanguage> {
    if let Some(raw) = flag {
        return raw.parse().map_err(|e: String| anyhow::anyhow!(e));
    }
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("js" | "mjs" | "cjs") => Ok(CodeLanguage::Javascript),
        Some("sh" | "bash") => Ok(CodeLanguage::Bash),
        _ => bail!(
            "cannot infer the language of {}; pass --language",
            file.display()
        ),
    }
}

pub async fn exec_file(
    state: &AppState,
    file: &Path,
    language: Option<&str>,
    json: bool,
) -> Result<()> {
    let language = resolve_language(file, language)?;
    let code = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let result = state.engine.execute_generated_code(&code, language).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.stdout);
        if !result.stderr.is_empty() {
            eprint!("{}", style(&result.stderr).red());
        }
    }

    if result.status == ExecutionStatus::Failed {
        bail!(
            "{} script failed: {}",
            language,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
