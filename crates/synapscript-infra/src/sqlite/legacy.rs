//! One-shot import of the legacy `automations.json` store.
//!
//! Older installs kept every automation in a JSON array next to the data
//! directory. On startup, if the SQLite store is still empty and that file
//! exists, each record is inserted. Records whose id is missing or not a
//! UUID get a fresh one. Timestamps may be RFC 3339 strings or epoch
//! milliseconds; anything else falls back to the import time.
//!
//! When every record imports, the file is removed. When any record had to be
//! skipped, the file is renamed to `automations.json.bak` so nothing is lost.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use synapscript_core::repository::automation::AutomationRepository;
use synapscript_types::automation::{Action, Automation, GeneratedCode, Trigger};
use synapscript_types::error::RepositoryError;
use uuid::Uuid;

use super::automation::SqliteAutomationRepository;

/// File name of the legacy store inside the data directory.
pub const LEGACY_FILE: &str = "automations.json";

/// Name the legacy file is moved to when some records could not be imported.
pub const LEGACY_BACKUP_FILE: &str = "automations.json.bak";

#[derive(Debug, Deserialize)]
struct LegacyAutomation {
    #[serde(default)]
    id: Option<serde_json::Value>,
    name: String,
    trigger: Trigger,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    generated_code: Option<GeneratedCode>,
    #[serde(default)]
    created_at: Option<serde_json::Value>,
    #[serde(default)]
    updated_at: Option<serde_json::Value>,
}

impl LegacyAutomation {
    fn into_automation(self) -> Automation {
        let id = self
            .id
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse::<Uuid>().ok())
            .unwrap_or_else(Uuid::now_v7);
        let created_at = self
            .created_at
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let updated_at = self
            .updated_at
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Automation {
            id,
            name: self.name,
            trigger: self.trigger,
            actions: self.actions,
            generated_code: self.generated_code,
            created_at,
            updated_at,
        }
    }
}

/// Epoch milliseconds (number or numeric string) or an RFC 3339 string.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        serde_json::Value::String(s) => match s.parse::<i64>() {
            Ok(millis) => DateTime::from_timestamp_millis(millis),
            Err(_) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        },
        _ => None,
    }
}

/// Import `{data_dir}/automations.json` into an empty store.
///
/// Returns the number of automations imported. The file is left untouched
/// when the store already holds automations, and kept as a backup when any
/// record was skipped.
pub async fn import_legacy_automations(
    repo: &SqliteAutomationRepository,
    data_dir: &Path,
) -> anyhow::Result<usize> {
    let path = data_dir.join(LEGACY_FILE);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(0);
    }

    let existing = repo.count().await?;
    if existing > 0 {
        tracing::debug!(
            path = %path.display(),
            existing,
            "store is not empty, skipping legacy import"
        );
        return Ok(0);
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;

    let mut imported = 0;
    let mut skipped = 0;
    for (index, record) in records.into_iter().enumerate() {
        let legacy: LegacyAutomation = match serde_json::from_value(record) {
            Ok(legacy) => legacy,
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping unreadable legacy automation");
                skipped += 1;
                continue;
            }
        };

        let mut automation = legacy.into_automation();
        match repo.create(&automation).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                automation.id = Uuid::now_v7();
                repo.create(&automation).await?;
            }
            Err(e) => return Err(e.into()),
        }
        imported += 1;
    }

    if skipped == 0 {
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))?;
        tracing::info!(imported, path = %path.display(), "imported legacy automations");
    } else {
        let backup = data_dir.join(LEGACY_BACKUP_FILE);
        tokio::fs::rename(&path, &backup)
            .await
            .with_context(|| format!("failed to move {} to {}", path.display(), backup.display()))?;
        tracing::warn!(
            imported,
            skipped,
            backup = %backup.display(),
            "imported legacy automations, kept original file as backup"
        );
    }

    Ok(imported)
}
