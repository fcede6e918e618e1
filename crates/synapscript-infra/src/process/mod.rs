//! Process runner implementations.

pub mod shell;

pub use shell::ShellProcessRunner;
