//! Run execution: the sequential step executor and the service that turns an
//! `Automation` into a run and records its `ExecutionLog`.

pub mod service;
pub mod step_executor;

use std::future::Future;

use synapscript_types::event::AutomationEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::EventBus;
use crate::process::{OutputLine, OutputSink, OutputStream};

pub use service::ExecutionService;
pub use step_executor::{RunOutcome, StepExecutor};

/// Prefix applied to stderr lines in `log` events.
pub const STDERR_PREFIX: &str = "ERROR: ";

/// Render an output line as a `log` event message.
pub fn log_message(line: &OutputLine) -> String {
    match line.stream {
        OutputStream::Stdout => line.text.clone(),
        OutputStream::Stderr => format!("{STDERR_PREFIX}{}", line.text),
    }
}

/// Drive `work` while forwarding every line it writes to its sink as a `log`
/// event on `bus`.
///
/// Resolves once `work` has finished and its sink has been dropped, so every
/// line has been published before the caller emits the next status event.
pub(crate) async fn with_log_stream<T, F, Fut>(
    bus: &EventBus,
    run_id: Uuid,
    automation_id: Uuid,
    work: F,
) -> T
where
    F: FnOnce(OutputSink) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let forward = async {
        while let Some(line) = rx.recv().await {
            bus.publish(AutomationEvent::Log {
                run_id,
                automation_id,
                message: log_message(&line),
            });
        }
    };
    let (value, ()) = tokio::join!(work(tx), forward);
    value
}
