//! Engine configuration types.
//!
//! `EngineConfig` mirrors `config.toml` in the data directory. Every field
//! has a default so an empty or partial file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the automation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timeout for each step's process, in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Timeout for generated-code execution, in seconds.
    #[serde(default = "default_code_timeout_secs")]
    pub code_timeout_secs: u64,

    /// Shell used to run command strings (`<shell> -c <command>`).
    #[serde(default = "default_shell")]
    pub shell: String,

    /// JavaScript interpreter for generated code.
    #[serde(default = "default_node_binary")]
    pub node_binary: String,

    /// Directory for generated-code temp files. Defaults to `{data_dir}/artifacts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,

    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub planner: PlannerConfig,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_code_timeout_secs() -> u64 {
    30
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_node_binary() -> String {
    "node".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn code_timeout(&self) -> Duration {
        Duration::from_secs(self.code_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            code_timeout_secs: default_code_timeout_secs(),
            shell: default_shell(),
            node_binary: default_node_binary(),
            artifacts_dir: None,
            event_capacity: default_event_capacity(),
            planner: PlannerConfig::default(),
        }
    }
}

/// Retry and rate-limit policy around the AI planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Minimum spacing between consecutive planner calls.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// How long a successful plan is served from cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            min_interval_ms: default_min_interval_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}
