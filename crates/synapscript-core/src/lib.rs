//! Automation execution and scheduling engine for SynapScript.
//!
//! This crate defines the ports (`ProcessRunner`, `AutomationRepository`,
//! `AutomationPlanner`) that the infrastructure layer implements, and the
//! engine built on them. It depends only on `synapscript-types` -- never on
//! `synapscript-infra` or any database crate.

pub mod code;
pub mod engine;
pub mod event;
pub mod execution;
pub mod planner;
pub mod process;
pub mod repository;
pub mod schedule;

pub use engine::{AutomationEngine, EngineError, RunHandle};
