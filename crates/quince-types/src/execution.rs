//! Execution tracking types: states and operation descriptors.
//!
//! `ExecutionState` is the lifecycle of a single result node in the
//! execution tree. A node starts `Executing` and reaches exactly one of the
//! four terminal states. The uppercase state names returned by
//! [`ExecutionState::as_str`] are the values trigger patterns match against.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ExecutionState
// ---------------------------------------------------------------------------

/// Lifecycle state of a single execution result node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// The step is still running. Initial state of every node.
    Executing,
    /// The step completed and did what it set out to do.
    Success,
    /// The step completed but its business outcome was negative
    /// (e.g. a test assertion did not hold).
    Failure,
    /// The step was aborted by a fault (connection loss, plugin error).
    Error,
    /// The step terminated voluntarily after observing cancellation or a
    /// continuation stop. Never conflated with `Failure` or `Error`.
    Interrupted,
}

impl ExecutionState {
    /// Uppercase state name, e.g. `"SUCCESS"`.
    ///
    /// This is the representation matched by trigger `on_result` patterns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Executing => "EXECUTING",
            ExecutionState::Success => "SUCCESS",
            ExecutionState::Failure => "FAILURE",
            ExecutionState::Error => "ERROR",
            ExecutionState::Interrupted => "INTERRUPTED",
        }
    }

    /// Whether this state is terminal. A node in a terminal state accepts
    /// no further transitions and no new children.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Executing)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExecutionInfo
// ---------------------------------------------------------------------------

/// Descriptor of a requested top-level execution: which operation to run
/// against which module in which environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    /// Operation name, e.g. "deploy-configuration" or "test".
    pub operation: String,
    /// Name of the module holding the model to execute.
    pub module: String,
    /// Target environment within the module.
    pub environment: String,
}

impl ExecutionInfo {
    /// Create a new execution descriptor.
    pub fn new(
        operation: impl Into<String>,
        module: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            module: module.into(),
            environment: environment.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_uppercase() {
        assert_eq!(ExecutionState::Executing.as_str(), "EXECUTING");
        assert_eq!(ExecutionState::Success.as_str(), "SUCCESS");
        assert_eq!(ExecutionState::Failure.as_str(), "FAILURE");
        assert_eq!(ExecutionState::Error.as_str(), "ERROR");
        assert_eq!(ExecutionState::Interrupted.as_str(), "INTERRUPTED");
    }

    #[test]
    fn only_executing_is_non_terminal() {
        assert!(!ExecutionState::Executing.is_terminal());
        assert!(ExecutionState::Success.is_terminal());
        assert!(ExecutionState::Failure.is_terminal());
        assert!(ExecutionState::Error.is_terminal());
        assert!(ExecutionState::Interrupted.is_terminal());
    }

    #[test]
    fn state_serde_uses_uppercase_names() {
        let json = serde_json::to_string(&ExecutionState::Interrupted).unwrap();
        assert_eq!(json, "\"INTERRUPTED\"");
        let parsed: ExecutionState = serde_json::from_str("\"SUCCESS\"").unwrap();
        assert_eq!(parsed, ExecutionState::Success);
    }

    #[test]
    fn execution_info_new() {
        let info = ExecutionInfo::new("deploy", "billing", "production");
        assert_eq!(info.operation, "deploy");
        assert_eq!(info.module, "billing");
        assert_eq!(info.environment, "production");
    }
}
