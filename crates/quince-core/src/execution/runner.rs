//! Single step execution.
//!
//! [`run_step`] opens a child result node, runs one unit of work against
//! it and converts the outcome into result tree state. Faults never
//! propagate as faults: a plugin error settles the node as `Error`, a
//! cooperative interruption settles it as `Interrupted`. The only error
//! returned to the caller is the result tree refusing to grow, which is
//! the signal to stop running further steps.

use std::future::Future;

use tracing::warn;

use crate::execution::result::{msg, ExecutionResult, ResultError};
use crate::plugin::api::PluginError;

/// Run one unit of work as a child node of `parent`.
///
/// The closure receives a handle to the freshly opened node and reports
/// into it; a node the work leaves `Executing` on success is completed as
/// computed from whatever children the work opened. Returns the child
/// node so the caller can inspect the outcome.
pub async fn run_step<F, Fut>(
    parent: &ExecutionResult,
    description: impl Into<String>,
    step: F,
) -> Result<ExecutionResult, ResultError>
where
    F: FnOnce(ExecutionResult) -> Fut,
    Fut: Future<Output = Result<(), PluginError>>,
{
    let child = parent.add_child(description)?;
    match step(child.clone()).await {
        Ok(()) => {
            if child.is_executing() {
                child.complete_as_computed("Step completed.");
            }
        }
        Err(PluginError::Interrupted(reason)) => {
            if child.is_executing() {
                child.complete_as_interrupted(reason);
            }
        }
        Err(error) => {
            if child.is_executing() {
                child.complete_as_error(&error);
            } else {
                warn!(
                    step = %child.description(),
                    state = %child.state(),
                    error = %error,
                    "step faulted after completing its result"
                );
                child.add_message(msg::ERROR_MESSAGE, error.to_string());
            }
        }
    }
    Ok(child)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
