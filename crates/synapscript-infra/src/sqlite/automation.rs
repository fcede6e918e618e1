//! SQLite automation repository implementation.
//!
//! Implements `AutomationRepository` from `synapscript-core` using sqlx with
//! split read/write pools. Trigger, actions and generated code are stored as
//! JSON columns; execution logs are an append-only table that cascades on
//! automation delete.

use chrono::{DateTime, Utc};
use sqlx::Row;
use synapscript_core::repository::automation::AutomationRepository;
use synapscript_types::automation::{Action, Automation, AutomationUpdate, GeneratedCode, Trigger};
use synapscript_types::error::RepositoryError;
use synapscript_types::execution::{ExecutionLog, ExecutionStatus, RunOriginKind};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `AutomationRepository`.
pub struct SqliteAutomationRepository {
    pool: DatabasePool,
}

impl SqliteAutomationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Number of stored automations.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM automations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

const SELECT_ALL: &str = "SELECT id, name, trigger, actions, generated_code, created_at, updated_at
    FROM automations ORDER BY created_at ASC, id ASC";

const SELECT_BY_ID: &str = "SELECT id, name, trigger, actions, generated_code, created_at, updated_at
    FROM automations WHERE id = ?";

struct AutomationRow {
    id: String,
    name: String,
    trigger: String,
    actions: String,
    generated_code: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AutomationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            trigger: row.try_get("trigger")?,
            actions: row.try_get("actions")?,
            generated_code: row.try_get("generated_code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_automation(self) -> Result<Automation, RepositoryError> {
        let trigger: Trigger = serde_json::from_str(&self.trigger)
            .map_err(|e| RepositoryError::Query(format!("invalid trigger JSON: {e}")))?;
        let actions: Vec<Action> = serde_json::from_str(&self.actions)
            .map_err(|e| RepositoryError::Query(format!("invalid actions JSON: {e}")))?;
        let generated_code: Option<GeneratedCode> = self
            .generated_code
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid generated_code JSON: {e}")))
            })
            .transpose()?;

        Ok(Automation {
            id: parse_uuid(&self.id)?,
            name: self.name,
            trigger,
            actions,
            generated_code,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct ExecutionLogRow {
    id: String,
    automation_id: String,
    run_id: String,
    status: String,
    output: String,
    error: Option<String>,
    origin: String,
    created_at: String,
}

impl ExecutionLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            automation_id: row.try_get("automation_id")?,
            run_id: row.try_get("run_id")?,
            status: row.try_get("status")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            origin: row.try_get("origin")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_log(self) -> Result<ExecutionLog, RepositoryError> {
        let status: ExecutionStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let origin: RunOriginKind = self.origin.parse().map_err(RepositoryError::Query)?;
        Ok(ExecutionLog {
            id: parse_uuid(&self.id)?,
            automation_id: parse_uuid(&self.automation_id)?,
            run_id: parse_uuid(&self.run_id)?,
            status,
            output: self.output,
            error: self.error,
            origin,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

/// JSON-encoded column values for one automation.
struct EncodedColumns {
    trigger: String,
    actions: String,
    generated_code: Option<String>,
}

impl EncodedColumns {
    fn encode(automation: &Automation) -> Result<Self, RepositoryError> {
        let encode_err = |e: serde_json::Error| RepositoryError::Query(format!("serialize automation: {e}"));
        Ok(Self {
            trigger: serde_json::to_string(&automation.trigger).map_err(encode_err)?,
            actions: serde_json::to_string(&automation.actions).map_err(encode_err)?,
            generated_code: automation
                .generated_code
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(encode_err)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// AutomationRepository impl
// ---------------------------------------------------------------------------

impl AutomationRepository for SqliteAutomationRepository {
    async fn get_all(&self) -> Result<Vec<Automation>, RepositoryError> {
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                AutomationRow::from_row(row)
                    .map_err(query_error)?
                    .into_automation()
            })
            .collect()
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Automation>, RepositoryError> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = AutomationRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_automation()?))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, automation: &Automation) -> Result<(), RepositoryError> {
        let columns = EncodedColumns::encode(automation)?;

        let result = sqlx::query(
            r#"INSERT INTO automations (id, name, trigger, actions, generated_code, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(automation.id.to_string())
        .bind(&automation.name)
        .bind(&columns.trigger)
        .bind(&columns.actions)
        .bind(&columns.generated_code)
        .bind(format_datetime(&automation.created_at))
        .bind(format_datetime(&automation.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                RepositoryError::Conflict(format!("automation {} already exists", automation.id)),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn update(
        &self,
        id: &Uuid,
        update: &AutomationUpdate,
    ) -> Result<Option<Automation>, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let row = sqlx::query(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut automation = AutomationRow::from_row(&row)
            .map_err(query_error)?
            .into_automation()?;
        automation.apply(update.clone());
        let columns = EncodedColumns::encode(&automation)?;

        sqlx::query(
            r#"UPDATE automations
               SET name = ?, trigger = ?, actions = ?, generated_code = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&automation.name)
        .bind(&columns.trigger)
        .bind(&columns.actions)
        .bind(&columns.generated_code)
        .bind(format_datetime(&automation.updated_at))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some(automation))
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM automations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn log_execution(&self, log: &ExecutionLog) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO execution_logs (id, automation_id, run_id, status, output, error, origin, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.automation_id.to_string())
        .bind(log.run_id.to_string())
        .bind(log.status.to_string())
        .bind(&log.output)
        .bind(&log.error)
        .bind(log.origin.to_string())
        .bind(format_datetime(&log.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn list_executions(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<ExecutionLog>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT id, automation_id, run_id, status, output, error, origin, created_at
               FROM execution_logs
               WHERE automation_id = ?
               ORDER BY created_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(automation_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| ExecutionLogRow::from_row(row).map_err(query_error)?.into_log())
            .collect()
    }
}
