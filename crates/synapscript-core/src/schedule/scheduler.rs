//! Automation scheduler wrapping `tokio-cron-scheduler`.
//!
//! Owns the live map of automation id to installed cron job. Every mutation
//! (`schedule`, `unschedule`, `reconcile_all`, `stop`) holds the map's lock
//! for its whole duration, so a store update racing startup reconciliation
//! can never leave two jobs installed for the same automation.
//!
//! Lock order is always `jobs` then `inner`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use synapscript_types::automation::Automation;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use super::cron::CronExpression;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during scheduling operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `start` has not been called, or the scheduler was stopped.
    #[error("scheduler not started")]
    NotStarted,

    /// Failed to create or manipulate a cron job.
    #[error("scheduler error: {0}")]
    JobError(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Invoked once per tick with the automation id and the fire time.
///
/// An `Err` is logged and the job stays armed.
pub type TickHandler = Arc<
    dyn Fn(Uuid, DateTime<Utc>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
>;

/// What `schedule` did with an automation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A job is now installed.
    Scheduled { job_id: Uuid },
    /// The trigger is not `schedule`; nothing is installed.
    NotScheduled,
    /// The cron expression is invalid; nothing is installed.
    Skipped { reason: String },
}

/// Counts from `reconcile_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Automations with a job installed after the pass, new or kept.
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Jobs dropped because their automation is gone or no longer scheduled.
    pub removed: usize,
}

struct ScheduledJob {
    job_id: Uuid,
    cron: CronExpression,
}

// ---------------------------------------------------------------------------
// AutomationScheduler
// ---------------------------------------------------------------------------

pub struct AutomationScheduler {
    inner: RwLock<Option<JobScheduler>>,
    jobs: Mutex<HashMap<Uuid, ScheduledJob>>,
    handler: TickHandler,
}

impl AutomationScheduler {
    /// Create a scheduler (not yet started) that calls `handler` on every tick.
    pub fn new(handler: TickHandler) -> Self {
        Self {
            inner: RwLock::new(None),
            jobs: Mutex::new(HashMap::new()),
            handler,
        }
    }

    /// Start the underlying job scheduler. Calling it twice is a no-op.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if inner.is_some() {
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        *inner = Some(scheduler);
        tracing::info!("automation scheduler started");
        Ok(())
    }

    /// Shut the job scheduler down and forget every installed job.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let mut inner = self.inner.write().await;
        jobs.clear();
        if let Some(mut scheduler) = inner.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            tracing::info!("automation scheduler stopped");
        }
        Ok(())
    }

    /// Install (or replace) the cron job for `automation`.
    ///
    /// Any job already installed for the id is removed first. A trigger that
    /// is not `schedule`, or an invalid expression, leaves the automation
    /// without a job and is reported in the outcome rather than as an error.
    pub async fn schedule(&self, automation: &Automation) -> Result<ScheduleOutcome, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let inner = self.inner.read().await;
        let scheduler = inner.as_ref().ok_or(SchedulerError::NotStarted)?;
        self.schedule_locked(&mut jobs, scheduler, automation).await
    }

    /// Remove the job for `automation_id`. Returns whether one was installed.
    pub async fn unschedule(&self, automation_id: Uuid) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.remove(&automation_id) else {
            return Ok(false);
        };

        let inner = self.inner.read().await;
        if let Some(scheduler) = inner.as_ref() {
            scheduler
                .remove(&entry.job_id)
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        }

        tracing::info!(%automation_id, job_id = %entry.job_id, "automation unscheduled");
        Ok(true)
    }

    /// Make the installed jobs match `automations`.
    ///
    /// Every automation with a `schedule` trigger ends up with a job. A job
    /// whose expression has not changed is kept as is, so repeated passes
    /// never reset a pending tick. Jobs for ids that are absent from
    /// `automations`, or whose trigger is no longer `schedule`, are removed.
    /// Invalid expressions are skipped with a warning. A job that fails to
    /// install is logged and counted; the rest are still scheduled.
    pub async fn reconcile_all(
        &self,
        automations: &[Automation],
    ) -> Result<ReconcileSummary, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let inner = self.inner.read().await;
        let scheduler = inner.as_ref().ok_or(SchedulerError::NotStarted)?;

        let mut summary = ReconcileSummary::default();

        let wanted: HashSet<Uuid> = automations
            .iter()
            .filter(|a| a.cron_expression().is_some())
            .map(|a| a.id)
            .collect();
        let stale: Vec<Uuid> = jobs.keys().filter(|id| !wanted.contains(id)).copied().collect();
        for automation_id in stale {
            let Some(entry) = jobs.remove(&automation_id) else {
                continue;
            };
            match scheduler.remove(&entry.job_id).await {
                Ok(()) => {
                    tracing::info!(%automation_id, job_id = %entry.job_id, "automation unscheduled");
                    summary.removed += 1;
                }
                Err(err) => {
                    tracing::warn!(%automation_id, error = %err, "failed to remove stale job");
                    summary.failed += 1;
                }
            }
        }

        for automation in automations.iter().filter(|a| a.cron_expression().is_some()) {
            let unchanged = match (jobs.get(&automation.id), automation.cron_expression()) {
                (Some(job), Some(expr)) => {
                    job.cron.as_str() == expr.split_whitespace().collect::<Vec<_>>().join(" ")
                }
                _ => false,
            };
            if unchanged {
                summary.scheduled += 1;
                continue;
            }
            match self.schedule_locked(&mut jobs, scheduler, automation).await {
                Ok(ScheduleOutcome::Scheduled { .. }) => summary.scheduled += 1,
                Ok(_) => summary.skipped += 1,
                Err(err) => {
                    tracing::warn!(automation_id = %automation.id, error = %err, "failed to schedule automation");
                    summary.failed += 1;
                }
            }
        }

        tracing::debug!(
            scheduled = summary.scheduled,
            skipped = summary.skipped,
            failed = summary.failed,
            removed = summary.removed,
            "reconciled scheduled automations"
        );
        Ok(summary)
    }

    /// Whether `start` has been called and `stop` has not.
    pub async fn is_running(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Number of installed jobs.
    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_scheduled(&self, automation_id: Uuid) -> bool {
        self.jobs.lock().await.contains_key(&automation_id)
    }

    /// Ids of every scheduled automation.
    pub async fn scheduled_ids(&self) -> Vec<Uuid> {
        self.jobs.lock().await.keys().copied().collect()
    }

    /// Next fire time of the job installed for `automation_id`.
    pub async fn next_fire(&self, automation_id: Uuid) -> Option<DateTime<Utc>> {
        let jobs = self.jobs.lock().await;
        jobs.get(&automation_id)
            .and_then(|job| job.cron.next_after(Utc::now()))
    }

    async fn schedule_locked(
        &self,
        jobs: &mut HashMap<Uuid, ScheduledJob>,
        scheduler: &JobScheduler,
        automation: &Automation,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let automation_id = automation.id;

        if let Some(previous) = jobs.remove(&automation_id) {
            scheduler
                .remove(&previous.job_id)
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            tracing::debug!(%automation_id, job_id = %previous.job_id, "removed previous job");
        }

        let Some(expr) = automation.cron_expression() else {
            return Ok(ScheduleOutcome::NotScheduled);
        };

        let cron = match CronExpression::parse(expr) {
            Ok(cron) => cron,
            Err(err) => {
                tracing::warn!(
                    %automation_id,
                    cron_expression = expr,
                    error = %err,
                    "invalid cron expression, automation not scheduled"
                );
                return Ok(ScheduleOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
        };

        let job_id = self
            .install(scheduler, automation_id, &cron.job_expression())
            .await?;
        tracing::info!(%automation_id, %job_id, cron_expression = %cron, "automation scheduled");
        jobs.insert(automation_id, ScheduledJob { job_id, cron });

        Ok(ScheduleOutcome::Scheduled { job_id })
    }

    async fn install(
        &self,
        scheduler: &JobScheduler,
        automation_id: Uuid,
        job_expression: &str,
    ) -> Result<Uuid, SchedulerError> {
        let handler = Arc::clone(&self.handler);
        let job = Job::new_async(job_expression, move |_uuid, _lock| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                dispatch_tick(&handler, automation_id, Utc::now()).await;
            })
        })
        .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        let job_id = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;
        Ok(job_id)
    }
}

impl std::fmt::Debug for AutomationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationScheduler").finish_non_exhaustive()
    }
}

/// Run one tick. Failures are logged and never propagate into the job.
async fn dispatch_tick(handler: &TickHandler, automation_id: Uuid, fired_at: DateTime<Utc>) {
    tracing::debug!(%automation_id, %fired_at, "cron tick fired");
    if let Err(err) = handler(automation_id, fired_at).await {
        tracing::warn!(%automation_id, error = %err, "scheduled run failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use synapscript_types::automation::Trigger;

    type TickFuture = BoxFuture<'static, anyhow::Result<()>>;

    fn noop_handler() -> TickHandler {
        Arc::new(|_id, _at| -> TickFuture { Box::pin(async { Ok(()) }) })
    }

    fn counting_handler(counter: Arc<AtomicUsize>) -> TickHandler {
        Arc::new(move |_id, _at| -> TickFuture {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn scheduled(name: &str, expr: &str) -> Automation {
        Automation::new(
            name,
            Trigger::Schedule {
                cron_expression: expr.to_string(),
            },
        )
    }

    async fn started(handler: TickHandler) -> AutomationScheduler {
        let scheduler = AutomationScheduler::new(handler);
        scheduler.start().await.unwrap();
        scheduler
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_stop() {
        let scheduler = started(noop_handler()).await;
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running().await);
        assert_eq!(scheduler.job_count().await, 0);
        scheduler.stop().await.unwrap();
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn schedule_twice_keeps_one_job() {
        let scheduler = started(noop_handler()).await;
        let automation = scheduled("backup", "*/5 * * * *");

        let first = scheduler.schedule(&automation).await.unwrap();
        let second = scheduler.schedule(&automation).await.unwrap();

        let (ScheduleOutcome::Scheduled { job_id: a }, ScheduleOutcome::Scheduled { job_id: b }) =
            (first, second)
        else {
            panic!("expected both calls to schedule");
        };
        assert_ne!(a, b);
        assert_eq!(scheduler.job_count().await, 1);
        assert!(scheduler.is_scheduled(automation.id).await);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_schedules_of_same_id_keep_one_job() {
        let scheduler = started(noop_handler()).await;
        let automation = scheduled("race", "* * * * *");

        let (a, b) = tokio::join!(scheduler.schedule(&automation), scheduler.schedule(&automation));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(scheduler.job_count().await, 1);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_cron_is_skipped_not_an_error() {
        let scheduler = started(noop_handler()).await;
        let automation = scheduled("broken", "every tuesday");

        let outcome = scheduler.schedule(&automation).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Skipped { .. }));
        assert!(!scheduler.is_scheduled(automation.id).await);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_reschedule_removes_existing_job() {
        let scheduler = started(noop_handler()).await;
        let mut automation = scheduled("edit", "0 * * * *");
        scheduler.schedule(&automation).await.unwrap();
        assert!(scheduler.is_scheduled(automation.id).await);

        automation.trigger = Trigger::Schedule {
            cron_expression: "99 * * * *".to_string(),
        };
        let outcome = scheduler.schedule(&automation).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Skipped { .. }));
        assert_eq!(scheduler.job_count().await, 0);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_trigger_is_not_scheduled() {
        let scheduler = started(noop_handler()).await;
        let mut automation = scheduled("switch", "* * * * *");
        scheduler.schedule(&automation).await.unwrap();

        automation.trigger = Trigger::Manual;
        let outcome = scheduler.schedule(&automation).await.unwrap();
        assert_eq!(outcome, ScheduleOutcome::NotScheduled);
        assert!(!scheduler.is_scheduled(automation.id).await);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unschedule_absent_is_noop() {
        let scheduler = started(noop_handler()).await;
        assert!(!scheduler.unschedule(Uuid::now_v7()).await.unwrap());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unscheduling_one_leaves_the_other() {
        let scheduler = started(noop_handler()).await;
        let every_minute = scheduled("a", "* * * * *");
        let every_five = scheduled("b", "*/5 * * * *");
        scheduler.schedule(&every_minute).await.unwrap();
        scheduler.schedule(&every_five).await.unwrap();
        assert_eq!(scheduler.job_count().await, 2);

        assert!(scheduler.unschedule(every_minute.id).await.unwrap());

        assert!(!scheduler.is_scheduled(every_minute.id).await);
        assert!(scheduler.is_scheduled(every_five.id).await);
        assert!(scheduler.next_fire(every_minute.id).await.is_none());
        let next = scheduler.next_fire(every_five.id).await.unwrap();
        assert!(next > Utc::now());

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn schedule_before_start_fails() {
        let scheduler = AutomationScheduler::new(noop_handler());
        let result = scheduler.schedule(&scheduled("early", "* * * * *")).await;
        assert!(matches!(result, Err(SchedulerError::NotStarted)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_schedules_valid_and_skips_invalid() {
        let scheduler = started(noop_handler()).await;
        let automations = vec![
            scheduled("ok-1", "0 9 * * 1-5"),
            scheduled("bad", "not cron"),
            Automation::new("manual", Trigger::Manual),
            scheduled("ok-2", "*/10 * * * *"),
        ];

        let summary = scheduler.reconcile_all(&automations).await.unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                scheduled: 2,
                skipped: 1,
                failed: 0,
                removed: 0,
            }
        );
        assert_eq!(scheduler.job_count().await, 2);

        // Running it again neither doubles nor reinstalls.
        let before = scheduler.jobs.lock().await[&automations[0].id].job_id;
        scheduler.reconcile_all(&automations).await.unwrap();
        assert_eq!(scheduler.job_count().await, 2);
        assert_eq!(scheduler.jobs.lock().await[&automations[0].id].job_id, before);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconcile_prunes_removed_and_follows_edits() {
        let scheduler = started(noop_handler()).await;
        let kept = scheduled("kept", "0 * * * *");
        let deleted = scheduled("deleted", "*/5 * * * *");
        let mut edited = scheduled("edited", "0 9 * * *");
        let mut switched = scheduled("switched", "30 * * * *");
        scheduler
            .reconcile_all(&[kept.clone(), deleted.clone(), edited.clone(), switched.clone()])
            .await
            .unwrap();
        assert_eq!(scheduler.job_count().await, 4);
        let edited_job = scheduler.jobs.lock().await[&edited.id].job_id;

        edited.trigger = Trigger::Schedule {
            cron_expression: "0 10 * * *".to_string(),
        };
        switched.trigger = Trigger::Manual;
        let summary = scheduler
            .reconcile_all(&[kept.clone(), edited.clone(), switched.clone()])
            .await
            .unwrap();

        assert_eq!(summary.scheduled, 2);
        assert_eq!(summary.removed, 2);
        assert_eq!(summary.failed, 0);
        let mut ids = scheduler.scheduled_ids().await;
        ids.sort();
        let mut expected = vec![kept.id, edited.id];
        expected.sort();
        assert_eq!(ids, expected);
        let jobs = scheduler.jobs.lock().await;
        assert_ne!(jobs[&edited.id].job_id, edited_job);
        assert_eq!(jobs[&edited.id].cron.as_str(), "0 10 * * *");
        drop(jobs);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_clears_jobs() {
        let scheduler = started(noop_handler()).await;
        scheduler.schedule(&scheduled("x", "* * * * *")).await.unwrap();
        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.job_count().await, 0);
    }

    #[tokio::test]
    async fn failing_tick_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        let handler: TickHandler = Arc::new(move |_id, _at| -> TickFuture {
            let calls = Arc::clone(&calls_in);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("automation vanished"))
            })
        });

        dispatch_tick(&handler, Uuid::now_v7(), Utc::now()).await;
        dispatch_tick(&handler, Uuid::now_v7(), Utc::now()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Install a per-second job for `automation_id` and record it in the map.
    async fn install_every_second(scheduler: &AutomationScheduler, automation_id: Uuid) {
        let mut jobs = scheduler.jobs.lock().await;
        let inner = scheduler.inner.read().await;
        let js = inner.as_ref().unwrap();
        let job_id = scheduler
            .install(js, automation_id, "* * * * * *")
            .await
            .unwrap();
        let cron = CronExpression::parse("* * * * *").unwrap();
        jobs.insert(automation_id, ScheduledJob { job_id, cron });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_jobs_tick_independently_and_unschedule_stops_only_one() {
        let ticks: Arc<std::sync::Mutex<HashMap<Uuid, usize>>> = Arc::default();
        let ticks_in = Arc::clone(&ticks);
        let handler: TickHandler = Arc::new(move |id, _at| -> TickFuture {
            let ticks = Arc::clone(&ticks_in);
            Box::pin(async move {
                *ticks.lock().unwrap().entry(id).or_default() += 1;
                Ok(())
            })
        });
        let count = |id: Uuid| ticks.lock().unwrap().get(&id).copied().unwrap_or(0);

        let scheduler = started(handler).await;
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        install_every_second(&scheduler, a).await;
        install_every_second(&scheduler, b).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(count(a) >= 1);
        assert!(count(b) >= 1);

        assert!(scheduler.unschedule(a).await.unwrap());
        // Let a tick already in flight land before taking the baseline.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let (a_after, b_after) = (count(a), count(b));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(count(a), a_after, "unscheduled job kept ticking");
        assert!(count(b) > b_after, "remaining job stopped ticking");

        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn installed_job_invokes_handler_on_tick() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = started(counting_handler(Arc::clone(&counter))).await;

        {
            let inner = scheduler.inner.read().await;
            let js = inner.as_ref().unwrap();
            scheduler
                .install(js, Uuid::now_v7(), "* * * * * *")
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(counter.load(Ordering::SeqCst) >= 1);

        scheduler.stop().await.unwrap();
    }
}
