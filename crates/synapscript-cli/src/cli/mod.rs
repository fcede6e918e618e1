//! CLI command definitions and dispatch for the `synapse` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod automation;
pub mod render;
pub mod run;
pub mod schedule;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Create, run and schedule SynapScript automations.
#[derive(Parser)]
#[command(name = "synapse", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans to stdout through OpenTelemetry.
    #[arg(long, global = true, env = "SYNAPSCRIPT_OTEL", hide = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an automation from a JSON file.
    ///
    /// Accepts either an automation definition (`name`, `trigger`, `actions`,
    /// `generated_code`) or a full planner response.
    Add {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Change an automation from a JSON file of fields to replace.
    ///
    /// Keys that are absent stay as they are. `"generated_code": null`
    /// removes the generated code. A running daemon picks the change up on
    /// its next store sync.
    #[command(alias = "edit")]
    Update {
        /// Automation UUID.
        id: String,

        /// Path to the JSON file.
        file: PathBuf,
    },

    /// List registered automations.
    #[command(alias = "ls")]
    List,

    /// Show one automation.
    Show {
        /// Automation UUID.
        id: String,
    },

    /// Delete an automation and its history.
    #[command(alias = "rm")]
    Delete {
        /// Automation UUID.
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Run an automation now and stream its progress.
    Run {
        /// Automation UUID.
        id: String,
    },

    /// Execute a script file through the code runner.
    Exec {
        /// Path to the script.
        file: PathBuf,

        /// Script language (bash or javascript). Inferred from the extension when omitted.
        #[arg(long, short)]
        language: Option<String>,
    },

    /// Show recent runs of an automation.
    History {
        /// Automation UUID.
        id: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Validate a 5-field cron expression and list its next fire times (UTC).
    Cron {
        /// Cron expression, e.g. "*/5 * * * *".
        expression: String,

        /// Number of fire times to list.
        #[arg(long, default_value = "5")]
        count: usize,
    },

    /// Run the scheduler in the foreground until Ctrl+C.
    ///
    /// Cron expressions are evaluated in UTC. The store is re-read on an
    /// interval so automations added, changed or deleted from another
    /// `synapse` process are picked up without a restart.
    Daemon {
        /// Seconds between store syncs.
        #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
        sync_interval: u64,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Parse a UUID argument with a readable error.
pub fn parse_id(raw: &str) -> anyhow::Result<uuid::Uuid> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("'{raw}' is not a valid automation id"))
}
