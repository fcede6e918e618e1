//! Automation repository trait definition.
//!
//! Defines the storage interface for automation records and their execution
//! history. The infrastructure layer (synapscript-infra) implements this trait
//! with SQLite persistence.

use synapscript_types::automation::{Automation, AutomationUpdate};
use synapscript_types::error::RepositoryError;
use synapscript_types::execution::ExecutionLog;
use uuid::Uuid;

/// Repository trait for automation persistence.
///
/// Covers two entity families:
/// - **Automations:** CRUD for automation records.
/// - **Execution logs:** append-only run history.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait AutomationRepository: Send + Sync + 'static {
    // -----------------------------------------------------------------------
    // Automations
    // -----------------------------------------------------------------------

    /// List every automation, oldest first.
    fn get_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Automation>, RepositoryError>> + Send;

    /// Get an automation by its UUID.
    fn get_by_id(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Automation>, RepositoryError>> + Send;

    /// Insert a new automation. Fails with `Conflict` if the id exists.
    fn create(
        &self,
        automation: &Automation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Apply a partial update. Returns the updated record, or `None` if the
    /// id does not exist.
    fn update(
        &self,
        id: &Uuid,
        update: &AutomationUpdate,
    ) -> impl std::future::Future<Output = Result<Option<Automation>, RepositoryError>> + Send;

    /// Delete an automation by ID. Returns `true` if it existed.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Execution logs
    // -----------------------------------------------------------------------

    /// Append one execution log.
    fn log_execution(
        &self,
        log: &ExecutionLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recent execution logs for an automation, newest first.
    fn list_executions(
        &self,
        automation_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionLog>, RepositoryError>> + Send;
}
