//! Data directory layout.
//!
//! Everything the engine keeps on disk lives under one data directory:
//! `config.toml`, the SQLite database, the legacy `automations.json` and the
//! `artifacts/` directory for generated-code temp files.

use std::path::{Path, PathBuf};

use synapscript_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SYNAPSCRIPT_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SYNAPSCRIPT_DATA_DIR` environment variable
/// 2. `~/.synapscript`
/// 3. `./.synapscript`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".synapscript");
    }

    PathBuf::from(".synapscript")
}

/// Directory for generated-code artifacts: the configured one, else
/// `{data_dir}/artifacts`.
pub fn artifacts_dir(data_dir: &Path, config: &EngineConfig) -> PathBuf {
    config
        .artifacts_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("artifacts"))
}

/// Create the data directory if it does not exist yet.
pub async fn ensure_data_dir(data_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await
}
