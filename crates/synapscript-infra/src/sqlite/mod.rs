//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod automation;
pub mod legacy;
pub mod pool;

pub use automation::SqliteAutomationRepository;
pub use pool::DatabasePool;
