//! SynapScript CLI entry point.
//!
//! Binary name: `synapse`
//!
//! Parses CLI arguments, initializes tracing and the engine, then dispatches
//! to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,synapscript=debug",
        _ => "trace",
    };
    synapscript_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions and cron previews don't need app state
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "synapse", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Cron { expression, count } => {
            return cli::schedule::preview_cron(expression, *count, cli.json);
        }
        _ => {}
    }

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Add { file } => cli::automation::add_automation(&state, &file, cli.json).await,
        Commands::Update { id, file } => {
            cli::automation::update_automation(&state, &id, &file, cli.json).await
        }
        Commands::List => cli::automation::list_automations(&state, cli.json).await,
        Commands::Show { id } => cli::automation::show_automation(&state, &id, cli.json).await,
        Commands::Delete { id, force } => {
            cli::automation::delete_automation(&state, &id, force, cli.json).await
        }
        Commands::Run { id } => cli::run::run_automation(&state, &id, cli.json, cli.quiet).await,
        Commands::Exec { file, language } => {
            cli::run::exec_file(&state, &file, language.as_deref(), cli.json).await
        }
        Commands::History { id, limit } => {
            cli::automation::show_history(&state, &id, limit, cli.json).await
        }
        Commands::Daemon { sync_interval } => {
            let sync_interval = std::time::Duration::from_secs(sync_interval);
            cli::schedule::run_daemon(&state, shutdown_signal(), sync_interval, cli.json, cli.quiet)
                .await
        }
        Commands::Completions { .. } | Commands::Cron { .. } => unreachable!("handled above"),
    };

    state.close().await;
    synapscript_observe::tracing_setup::shutdown_tracing();
    result
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
