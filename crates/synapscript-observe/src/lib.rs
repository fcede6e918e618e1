//! Observability setup for SynapScript binaries.

pub mod tracing_setup;
