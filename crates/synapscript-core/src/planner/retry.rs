//! Rate-limited, cached, retrying planner decorator.
//!
//! Wraps any `AutomationPlanner` with:
//! - a minimum interval between consecutive upstream calls,
//! - a per-intent response cache with a TTL,
//! - bounded retries with linear backoff (`backoff * attempt`).
//!
//! Quota errors are surfaced immediately; retrying them only burns more quota.

use std::time::Duration;

use dashmap::DashMap;
use synapscript_types::config::PlannerConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{AutomationPlan, AutomationPlanner, PlannerError};

struct CachedPlan {
    plan: AutomationPlan,
    stored_at: Instant,
}

pub struct RetryingPlanner<P: AutomationPlanner> {
    inner: P,
    max_attempts: u32,
    backoff: Duration,
    min_interval: Duration,
    cache_ttl: Duration,
    last_call: Mutex<Option<Instant>>,
    cache: DashMap<String, CachedPlan>,
}

impl<P: AutomationPlanner> RetryingPlanner<P> {
    pub fn new(inner: P, config: &PlannerConfig) -> Self {
        Self {
            inner,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            min_interval: Duration::from_millis(config.min_interval_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            last_call: Mutex::new(None),
            cache: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop every cached plan.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cached(&self, intent: &str) -> Option<AutomationPlan> {
        let entry = self.cache.get(intent)?;
        if entry.stored_at.elapsed() <= self.cache_ttl {
            return Some(entry.plan.clone());
        }
        drop(entry);
        self.cache.remove(intent);
        None
    }

    /// Wait until `min_interval` has passed since the previous upstream call.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "planner rate limit");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl<P: AutomationPlanner> AutomationPlanner for RetryingPlanner<P> {
    async fn plan(&self, intent: &str) -> Result<AutomationPlan, PlannerError> {
        if let Some(plan) = self.cached(intent) {
            tracing::debug!("using cached plan");
            return Ok(plan);
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            self.wait_for_rate_limit().await;
            tracing::debug!(attempt, max_attempts = self.max_attempts, "planner request");

            match self.inner.plan(intent).await {
                Ok(plan) => {
                    self.cache.insert(
                        intent.to_string(),
                        CachedPlan {
                            plan: plan.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                    return Ok(plan);
                }
                Err(err) if err.is_quota() => {
                    tracing::warn!(error = %err, "planner quota exceeded, not retrying");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "planner attempt failed");
                    last_error = Some(err);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(PlannerError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| PlannerError::Request("no attempt made".to_string())),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::AutomationDraft;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use synapscript_types::automation::{CodeLanguage, GeneratedCode, Trigger};

    /// Returns scripted results in order, then repeats the last one.
    struct ScriptedPlanner {
        results: std::sync::Mutex<VecDeque<Result<AutomationPlan, PlannerError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedPlanner {
        fn new(results: Vec<Result<AutomationPlan, PlannerError>>) -> Self {
            Self {
                results: std::sync::Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AutomationPlanner for ScriptedPlanner {
        async fn plan(&self, _intent: &str) -> Result<AutomationPlan, PlannerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                results.front().cloned().unwrap()
            }
        }
    }

    fn plan() -> AutomationPlan {
        AutomationPlan {
            understanding: "say hi".to_string(),
            automation: AutomationDraft {
                name: "hi".to_string(),
                trigger: Trigger::Manual,
                actions: Vec::new(),
            },
            generated_code: GeneratedCode {
                language: CodeLanguage::Bash,
                code: "echo hi".to_string(),
            },
            requirements: serde_json::Value::Array(Vec::new()),
        }
    }

    fn transient() -> PlannerError {
        PlannerError::Request("503 unavailable".to_string())
    }

    fn config() -> PlannerConfig {
        PlannerConfig {
            max_attempts: 3,
            backoff_ms: 2000,
            min_interval_ms: 1000,
            cache_ttl_secs: 3600,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff() {
        let planner = RetryingPlanner::new(
            ScriptedPlanner::new(vec![Err(transient()), Err(transient()), Ok(plan())]),
            &config(),
        );
        let started = Instant::now();

        let result = planner.plan("say hi").await.unwrap();

        assert_eq!(result, plan());
        assert_eq!(planner.inner().calls(), 3);
        // 2s after the first failure, 4s after the second.
        assert!(started.elapsed() >= Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let planner = RetryingPlanner::new(ScriptedPlanner::new(vec![Err(transient())]), &config());

        let err = planner.plan("say hi").await.unwrap_err();

        assert_eq!(planner.inner().calls(), 3);
        match err {
            PlannerError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, PlannerError::Request(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quota_errors_are_not_retried() {
        let planner = RetryingPlanner::new(
            ScriptedPlanner::new(vec![Err(PlannerError::Quota("429".to_string()))]),
            &config(),
        );

        let err = planner.plan("say hi").await.unwrap_err();

        assert!(err.is_quota());
        assert_eq!(planner.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_serves_repeat_intents_until_ttl() {
        let planner = RetryingPlanner::new(ScriptedPlanner::new(vec![Ok(plan())]), &config());

        planner.plan("say hi").await.unwrap();
        planner.plan("say hi").await.unwrap();
        assert_eq!(planner.inner().calls(), 1);

        planner.plan("something else").await.unwrap();
        assert_eq!(planner.inner().calls(), 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        planner.plan("say hi").await.unwrap();
        assert_eq!(planner.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced_by_min_interval() {
        let planner = RetryingPlanner::new(ScriptedPlanner::new(vec![Ok(plan())]), &config());
        let started = Instant::now();

        planner.plan("one").await.unwrap();
        planner.plan("two").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
