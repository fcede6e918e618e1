//! Generated code execution.
//!
//! `safety` holds the denylist scan; `materializer` turns a code string into
//! a running process and guarantees the on-disk artifact is cleaned up.

pub mod materializer;
pub mod safety;

pub use materializer::{CodeError, CodeMaterializer};
pub use safety::DangerousPattern;
