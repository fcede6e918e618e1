//! Infrastructure layer for SynapScript.
//!
//! Contains implementations of the ports defined in `synapscript-core`:
//! the shell process runner, SQLite storage with the legacy JSON import,
//! configuration loading, and data directory layout.

pub mod config;
pub mod filesystem;
pub mod process;
pub mod sqlite;
