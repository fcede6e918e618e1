//! Application state wiring the engine to its infrastructure.
//!
//! The engine is generic over the process runner and the repository;
//! AppState pins it to the shell runner and the SQLite store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use synapscript_core::AutomationEngine;
use synapscript_infra::config::load_engine_config;
use synapscript_infra::filesystem::{artifacts_dir, ensure_data_dir, resolve_data_dir};
use synapscript_infra::process::ShellProcessRunner;
use synapscript_infra::sqlite::legacy::import_legacy_automations;
use synapscript_infra::sqlite::pool::default_database_url;
use synapscript_infra::sqlite::{DatabasePool, SqliteAutomationRepository};
use synapscript_types::config::EngineConfig;

/// The engine pinned to infra implementations.
pub type ConcreteEngine = AutomationEngine<ShellProcessRunner, SqliteAutomationRepository>;

/// Shared application state for CLI commands.
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and build
    /// the engine. Imports a legacy `automations.json` on first use.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let db_pool = DatabasePool::new(&default_database_url(&data_dir))
            .await
            .context("failed to open automation database")?;
        let repo = SqliteAutomationRepository::new(db_pool.clone());

        match import_legacy_automations(&repo, &data_dir).await {
            Ok(0) => {}
            Ok(imported) => tracing::info!(imported, "legacy automations imported"),
            Err(e) => tracing::warn!(error = %e, "legacy import failed, continuing without it"),
        }

        let runner = ShellProcessRunner::new(config.shell.clone());
        let engine = AutomationEngine::new(
            Arc::new(runner),
            Arc::new(repo),
            &config,
            artifacts_dir(&data_dir, &config),
        );
        tracing::debug!(data_dir = %data_dir.display(), "app state ready");

        Ok(Self {
            engine: Arc::new(engine),
            config,
            data_dir,
            db_pool,
        })
    }

    /// Stop the scheduler and close the database.
    pub async fn close(&self) {
        if let Err(e) = self.engine.shutdown().await {
            tracing::warn!(error = %e, "scheduler shutdown failed");
        }
        self.db_pool.close().await;
    }
}
