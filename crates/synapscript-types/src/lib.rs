//! Shared domain types for SynapScript.
//!
//! Automations, their triggers and actions, execution-scoped steps and logs,
//! bus events, and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod automation;
pub mod config;
pub mod error;
pub mod event;
pub mod execution;
