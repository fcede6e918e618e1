//! Execution service: turns an `Automation` into one run.
//!
//! Dispatch order:
//! 1. a non-empty action list runs through a fresh `StepExecutor`;
//! 2. otherwise generated code runs through the `CodeMaterializer`;
//! 3. otherwise the run completes immediately.
//!
//! Every run ends with exactly one `ExecutionLog` appended to the repository.
//! A failure to persist it is logged and does not change the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use synapscript_types::automation::{Automation, CodeLanguage, GeneratedCode};
use synapscript_types::config::EngineConfig;
use synapscript_types::event::AutomationEvent;
use synapscript_types::execution::{
    CodeExecutionResult, ExecutionLog, ExecutionStatus, RunOrigin, Step,
};
use uuid::Uuid;

use super::step_executor::StepExecutor;
use super::with_log_stream;
use crate::code::{CodeError, CodeMaterializer};
use crate::engine::EngineError;
use crate::event::EventBus;
use crate::process::ProcessRunner;
use crate::repository::AutomationRepository;

pub struct ExecutionService<P: ProcessRunner, R: AutomationRepository> {
    runner: Arc<P>,
    repo: Arc<R>,
    bus: EventBus,
    materializer: CodeMaterializer<P>,
    step_timeout: Duration,
}

impl<P: ProcessRunner, R: AutomationRepository> ExecutionService<P, R> {
    pub fn new(
        runner: Arc<P>,
        repo: Arc<R>,
        bus: EventBus,
        config: &EngineConfig,
        artifacts_dir: PathBuf,
    ) -> Self {
        let materializer = CodeMaterializer::new(
            Arc::clone(&runner),
            artifacts_dir,
            config.node_binary.clone(),
            config.code_timeout(),
        );
        Self {
            runner,
            repo,
            bus,
            materializer,
            step_timeout: config.step_timeout(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Load `automation_id` fresh from the store and run it.
    pub async fn run_by_id(
        &self,
        automation_id: Uuid,
        origin: RunOrigin,
    ) -> Result<ExecutionLog, EngineError> {
        let automation = self
            .repo
            .get_by_id(&automation_id)
            .await?
            .ok_or(EngineError::NotFound(automation_id))?;
        Ok(self.run_automation(Uuid::now_v7(), &automation, origin).await)
    }

    /// Run `automation` to completion and record the result.
    pub async fn run_automation(
        &self,
        run_id: Uuid,
        automation: &Automation,
        origin: RunOrigin,
    ) -> ExecutionLog {
        let automation_id = automation.id;
        tracing::info!(
            %run_id,
            %automation_id,
            origin = %origin.kind(),
            name = %automation.name,
            "dispatching run"
        );

        let (status, output, error) = if !automation.actions.is_empty() {
            let steps: Vec<Step> = automation.actions.iter().map(Step::from).collect();
            let outcome = StepExecutor::new(
                Arc::clone(&self.runner),
                self.bus.clone(),
                run_id,
                automation_id,
                self.step_timeout,
            )
            .run(steps)
            .await;
            (outcome.status, outcome.output, outcome.error)
        } else if let Some(code) = &automation.generated_code {
            self.run_generated_code(run_id, automation_id, code).await
        } else {
            tracing::debug!(%run_id, %automation_id, "nothing to run");
            self.bus.publish(AutomationEvent::AutomationComplete {
                run_id,
                automation_id,
            });
            (ExecutionStatus::Success, String::new(), None)
        };

        let log = ExecutionLog {
            id: Uuid::now_v7(),
            automation_id,
            run_id,
            status,
            output,
            error,
            origin: origin.kind(),
            created_at: Utc::now(),
        };

        if let Err(err) = self.repo.log_execution(&log).await {
            tracing::warn!(%run_id, %automation_id, error = %err, "failed to record execution log");
        }
        log
    }

    /// Run code outside any automation and wait for the result.
    pub async fn execute_generated_code(
        &self,
        code: &str,
        language: CodeLanguage,
    ) -> Result<CodeExecutionResult, CodeError> {
        self.materializer.execute(code, language).await
    }

    async fn run_generated_code(
        &self,
        run_id: Uuid,
        automation_id: Uuid,
        code: &GeneratedCode,
    ) -> (ExecutionStatus, String, Option<String>) {
        let result = with_log_stream(&self.bus, run_id, automation_id, |sink| {
            self.materializer
                .execute_streaming(&code.code, code.language, Some(sink))
        })
        .await;

        let (status, output, error) = match result {
            Ok(result) => (
                result.status,
                format!("{}{}", result.stdout, result.stderr),
                result.error,
            ),
            Err(err) => (ExecutionStatus::Failed, String::new(), Some(err.to_string())),
        };

        let event = match (&status, &error) {
            (ExecutionStatus::Success, _) => AutomationEvent::AutomationComplete {
                run_id,
                automation_id,
            },
            (ExecutionStatus::Failed, message) => AutomationEvent::AutomationFailed {
                run_id,
                automation_id,
                message: message
                    .clone()
                    .unwrap_or_else(|| "generated code failed".to_string()),
            },
        };
        self.bus.publish(event);
        tracing::info!(%run_id, %automation_id, language = %code.language, %status, "generated code run finished");

        (status, output, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::{MockProcessRunner, Scripted};
    use crate::repository::automation::mock::MockAutomationRepository;
    use std::sync::atomic::Ordering;
    use synapscript_types::automation::{Action, ActionKind, Trigger};
    use synapscript_types::execution::RunOriginKind;
    use tokio::sync::broadcast;

    fn service(
        runner: MockProcessRunner,
        repo: MockAutomationRepository,
        dir: &std::path::Path,
    ) -> ExecutionService<MockProcessRunner, MockAutomationRepository> {
        ExecutionService::new(
            Arc::new(runner),
            Arc::new(repo),
            EventBus::new(64),
            &EngineConfig::default(),
            dir.join("artifacts"),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<AutomationEvent>) -> Vec<AutomationEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn with_steps(commands: &[&str]) -> Automation {
        commands.iter().fold(Automation::new("steps", Trigger::Manual), |a, cmd| {
            a.with_action(Action::new(ActionKind::BashCommand, *cmd, *cmd))
        })
    }

    #[tokio::test]
    async fn actions_run_as_steps_and_are_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().script("echo a", Scripted::ok(&["a"]));
        let svc = service(runner, MockAutomationRepository::new(), tmp.path());
        let automation = with_steps(&["echo a", ""]);

        let log = svc
            .run_automation(Uuid::now_v7(), &automation, RunOrigin::Manual)
            .await;

        assert_eq!(log.status, ExecutionStatus::Success);
        assert_eq!(log.output, "a\n");
        assert_eq!(log.origin, RunOriginKind::Manual);
        let stored = svc.repo.all_logs();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], log);
    }

    #[tokio::test]
    async fn failing_step_is_logged_as_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().script("false", Scripted::exit(1, &[]));
        let svc = service(runner, MockAutomationRepository::new(), tmp.path());

        let log = svc
            .run_automation(Uuid::now_v7(), &with_steps(&["false", "echo never"]), RunOrigin::Manual)
            .await;

        assert_eq!(log.status, ExecutionStatus::Failed);
        assert!(log.error.unwrap().contains("exit code 1"));
        assert_eq!(svc.runner.calls(), vec!["false".to_string()]);
    }

    #[tokio::test]
    async fn generated_code_runs_when_there_are_no_actions() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().script("echo hi", Scripted::ok(&["hi"]));
        let svc = service(runner, MockAutomationRepository::new(), tmp.path());
        let mut rx = svc.bus().subscribe();
        let automation = Automation::new("code", Trigger::Manual).with_generated_code(GeneratedCode {
            language: CodeLanguage::Bash,
            code: "echo hi".to_string(),
        });

        let log = svc
            .run_automation(Uuid::now_v7(), &automation, RunOrigin::Event)
            .await;

        assert_eq!(log.status, ExecutionStatus::Success);
        assert_eq!(log.origin, RunOriginKind::Event);
        let events = drain(&mut rx);
        assert!(matches!(&events[0], AutomationEvent::Log { message, .. } if message == "hi"));
        assert!(matches!(
            events.last(),
            Some(AutomationEvent::AutomationComplete { .. })
        ));
    }

    #[tokio::test]
    async fn dangerous_generated_code_fails_the_run_without_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(MockProcessRunner::new(), MockAutomationRepository::new(), tmp.path());
        let mut rx = svc.bus().subscribe();
        let automation = Automation::new("evil", Trigger::Manual).with_generated_code(GeneratedCode {
            language: CodeLanguage::Bash,
            code: "rm -rf /".to_string(),
        });

        let log = svc
            .run_automation(Uuid::now_v7(), &automation, RunOrigin::Manual)
            .await;

        assert_eq!(log.status, ExecutionStatus::Failed);
        assert!(log.error.unwrap().contains("dangerous"));
        assert!(svc.runner.calls().is_empty());
        assert!(matches!(
            drain(&mut rx).last(),
            Some(AutomationEvent::AutomationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn empty_automation_completes_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(MockProcessRunner::new(), MockAutomationRepository::new(), tmp.path());
        let mut rx = svc.bus().subscribe();

        let log = svc
            .run_automation(Uuid::now_v7(), &Automation::new("empty", Trigger::Manual), RunOrigin::Manual)
            .await;

        assert_eq!(log.status, ExecutionStatus::Success);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AutomationEvent::AutomationComplete { .. }));
    }

    #[tokio::test]
    async fn log_persistence_failure_does_not_change_outcome() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = MockAutomationRepository::new();
        repo.fail_log_writes.store(true, Ordering::SeqCst);
        let svc = service(MockProcessRunner::new(), repo, tmp.path());

        let log = svc
            .run_automation(Uuid::now_v7(), &with_steps(&["true"]), RunOrigin::Manual)
            .await;

        assert_eq!(log.status, ExecutionStatus::Success);
        assert!(svc.repo.all_logs().is_empty());
    }

    #[tokio::test]
    async fn run_by_id_reads_from_store() {
        let tmp = tempfile::tempdir().unwrap();
        let automation = with_steps(&["echo a"]);
        let id = automation.id;
        let svc = service(
            MockProcessRunner::new(),
            MockAutomationRepository::with(vec![automation]),
            tmp.path(),
        );

        let log = svc
            .run_by_id(
                id,
                RunOrigin::Schedule {
                    fired_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(log.automation_id, id);
        assert_eq!(log.origin, RunOriginKind::Schedule);
    }

    #[tokio::test]
    async fn run_by_id_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service(MockProcessRunner::new(), MockAutomationRepository::new(), tmp.path());
        let id = Uuid::now_v7();

        let err = svc.run_by_id(id, RunOrigin::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn execute_generated_code_returns_result() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = MockProcessRunner::new().script("echo 42", Scripted::ok(&["42"]));
        let svc = service(runner, MockAutomationRepository::new(), tmp.path());

        let result = svc
            .execute_generated_code("echo 42", CodeLanguage::Bash)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout, "42\n");
    }
}
