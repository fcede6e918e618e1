//! Automation engine facade.
//!
//! `AutomationEngine` is the surface the transport layer talks to. It owns
//! the `ExecutionService` (shared with scheduled ticks through an `Arc`) and
//! the `AutomationScheduler`, and keeps the scheduler in step with the store
//! on create, update and delete.
//!
//! Manual runs are spawned onto the tokio runtime and return a `RunHandle`
//! immediately; progress is observed through `subscribe()`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use synapscript_types::automation::{Automation, AutomationUpdate, CodeLanguage};
use synapscript_types::config::EngineConfig;
use synapscript_types::error::RepositoryError;
use synapscript_types::event::AutomationEvent;
use synapscript_types::execution::{CodeExecutionResult, ExecutionLog, RunOrigin};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::code::CodeError;
use crate::event::EventBus;
use crate::execution::ExecutionService;
use crate::process::ProcessRunner;
use crate::repository::AutomationRepository;
use crate::schedule::{
    AutomationScheduler, ReconcileSummary, ScheduleOutcome, SchedulerError, TickHandler,
};

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("automation {0} not found")]
    NotFound(Uuid),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Code(#[from] CodeError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The spawned run task panicked or was cancelled.
    #[error("run task failed: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// Handle to a manual run spawned in the background.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub join: JoinHandle<ExecutionLog>,
}

impl RunHandle {
    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<ExecutionLog, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Join(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// AutomationEngine
// ---------------------------------------------------------------------------

pub struct AutomationEngine<P: ProcessRunner, R: AutomationRepository> {
    service: Arc<ExecutionService<P, R>>,
    scheduler: AutomationScheduler,
}

impl<P: ProcessRunner, R: AutomationRepository> AutomationEngine<P, R> {
    pub fn new(runner: Arc<P>, repo: Arc<R>, config: &EngineConfig, artifacts_dir: PathBuf) -> Self {
        let bus = EventBus::new(config.event_capacity);
        let service = Arc::new(ExecutionService::new(
            runner,
            repo,
            bus,
            config,
            artifacts_dir,
        ));
        let scheduler = AutomationScheduler::new(tick_handler(Arc::clone(&service)));
        Self { service, scheduler }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the cron scheduler.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.scheduler.start().await?;
        Ok(())
    }

    /// Stop the cron scheduler. Runs already in flight finish on their own.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.scheduler.stop().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Spawn a manual run of `automation` and return without waiting.
    pub fn submit_manual_run(&self, automation: Automation) -> RunHandle {
        let run_id = Uuid::now_v7();
        let service = Arc::clone(&self.service);
        tracing::debug!(%run_id, automation_id = %automation.id, "manual run submitted");
        let join = tokio::spawn(async move {
            service
                .run_automation(run_id, &automation, RunOrigin::Manual)
                .await
        });
        RunHandle { run_id, join }
    }

    /// Run generated code outside any automation and wait for the result.
    pub async fn execute_generated_code(
        &self,
        code: &str,
        language: CodeLanguage,
    ) -> Result<CodeExecutionResult, EngineError> {
        Ok(self.service.execute_generated_code(code, language).await?)
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.service.bus().subscribe()
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    pub async fn schedule_automation(
        &self,
        automation: &Automation,
    ) -> Result<ScheduleOutcome, EngineError> {
        Ok(self.scheduler.schedule(automation).await?)
    }

    pub async fn unschedule_automation(&self, automation_id: Uuid) -> Result<bool, EngineError> {
        Ok(self.scheduler.unschedule(automation_id).await?)
    }

    pub async fn reconcile_all(
        &self,
        automations: &[Automation],
    ) -> Result<ReconcileSummary, EngineError> {
        Ok(self.scheduler.reconcile_all(automations).await?)
    }

    /// Match the installed jobs to the store: schedule new or changed
    /// automations and drop jobs whose automation is gone or now manual.
    pub async fn reconcile_from_store(&self) -> Result<ReconcileSummary, EngineError> {
        let automations = self.service.repository().get_all().await?;
        self.reconcile_all(&automations).await
    }

    pub async fn next_fire(&self, automation_id: Uuid) -> Option<DateTime<Utc>> {
        self.scheduler.next_fire(automation_id).await
    }

    pub async fn scheduled_count(&self) -> usize {
        self.scheduler.job_count().await
    }

    // -----------------------------------------------------------------------
    // Store-synchronized CRUD
    // -----------------------------------------------------------------------

    pub async fn list_automations(&self) -> Result<Vec<Automation>, EngineError> {
        Ok(self.service.repository().get_all().await?)
    }

    pub async fn get_automation(&self, id: Uuid) -> Result<Automation, EngineError> {
        self.service
            .repository()
            .get_by_id(&id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Persist `automation`, then schedule it if the scheduler is running.
    pub async fn create_automation(&self, automation: Automation) -> Result<Automation, EngineError> {
        self.service.repository().create(&automation).await?;
        tracing::info!(automation_id = %automation.id, name = %automation.name, "automation created");
        self.sync_schedule(&automation).await?;
        Ok(automation)
    }

    /// Apply `update`, then reschedule (or unschedule) to match the new trigger.
    pub async fn update_automation(
        &self,
        id: Uuid,
        update: AutomationUpdate,
    ) -> Result<Automation, EngineError> {
        let updated = self
            .service
            .repository()
            .update(&id, &update)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        tracing::info!(automation_id = %id, "automation updated");
        self.sync_schedule(&updated).await?;
        Ok(updated)
    }

    /// Unschedule and delete. Returns whether the automation existed.
    pub async fn delete_automation(&self, id: Uuid) -> Result<bool, EngineError> {
        self.scheduler.unschedule(id).await?;
        let existed = self.service.repository().delete(&id).await?;
        if existed {
            tracing::info!(automation_id = %id, "automation deleted");
        }
        Ok(existed)
    }

    /// Most recent execution logs for `automation_id`, newest first.
    pub async fn history(
        &self,
        automation_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ExecutionLog>, EngineError> {
        Ok(self
            .service
            .repository()
            .list_executions(&automation_id, limit)
            .await?)
    }

    async fn sync_schedule(&self, automation: &Automation) -> Result<(), EngineError> {
        if !self.scheduler.is_running().await {
            tracing::debug!(automation_id = %automation.id, "scheduler not running, skipping schedule sync");
            return Ok(());
        }
        self.scheduler.schedule(automation).await?;
        Ok(())
    }
}

/// Tick handler: load the automation fresh and run it with a schedule origin.
///
/// Scheduled runs are internally authorized; no end-user credentials are
/// involved.
fn tick_handler<P: ProcessRunner, R: AutomationRepository>(
    service: Arc<ExecutionService<P, R>>,
) -> TickHandler {
    Arc::new(move |automation_id, fired_at| -> BoxFuture<'static, anyhow::Result<()>> {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let log = service
                .run_by_id(automation_id, RunOrigin::Schedule { fired_at })
                .await?;
            tracing::debug!(%automation_id, status = %log.status, "scheduled run finished");
            Ok(())
        })
    })
}
