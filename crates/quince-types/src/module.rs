//! Module model types: the declarative input to an execution.
//!
//! A `ModuleModel` is the aggregated model for one environment of a module:
//! an ordered list of steps to execute against named resources, a set of
//! variables available for substitution, an optional continue-on-failure
//! directive, and the triggers that may fire once execution has finished.
//!
//! Loading and aggregation of models from module descriptors is owned by an
//! external collaborator; these types are its output format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ModuleModel
// ---------------------------------------------------------------------------

/// Aggregated model for one environment of a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleModel {
    /// Optional human-readable description of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Continue-on-failure directive. `Some(false)` stops execution at the
    /// first failed step; absent means the engine default (continue).
    /// Applied once at execution start -- the policy locks on first set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_failure: Option<bool>,
    /// Model variables available to `${name}` substitution in step content.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
    /// Ordered steps. Execution order is list order.
    #[serde(default)]
    pub steps: Vec<ModelStep>,
    /// Triggers that may fire after the model has executed.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// A single step of a module model, directed at one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStep {
    /// Human-readable description, shown in the result tree.
    pub description: String,
    /// Identifier of the resource the step targets.
    pub target_resource: String,
    /// Plugin-specific payload. Opaque to the engine apart from variable
    /// substitution over its string leaves.
    #[serde(default)]
    pub content: Value,
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Declarative rule selecting a follow-on operation.
///
/// `on_target_operation` and `on_result` share one pattern grammar:
/// absent/empty and `*` match anything, `{a,b,c}` matches any trimmed
/// member case-insensitively, anything else is a literal case-insensitive
/// match. The remaining fields describe the operation to run when the
/// trigger fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger name, used in result descriptions and logging.
    pub name: String,
    /// Module to run the triggered operation on.
    pub module: String,
    /// Environment to run the triggered operation in.
    pub environment: String,
    /// Operation to invoke when the trigger fires.
    pub operation: String,
    /// Pattern matched against the invoked operation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_target_operation: Option<String>,
    /// Pattern matched against the terminal state name of the model result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_result: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_deserializes_with_defaults() {
        let model: ModuleModel = serde_json::from_str("{}").unwrap();
        assert!(model.description.is_none());
        assert!(model.continue_on_failure.is_none());
        assert!(model.variables.is_empty());
        assert!(model.steps.is_empty());
        assert!(model.triggers.is_empty());
    }

    #[test]
    fn model_roundtrip() {
        let model = ModuleModel {
            description: Some("install web tier".to_string()),
            continue_on_failure: Some(false),
            variables: HashMap::from([("host".to_string(), "web01".to_string())]),
            steps: vec![ModelStep {
                description: "install server".to_string(),
                target_resource: "ssh-web01".to_string(),
                content: json!({ "command": "install ${host}" }),
            }],
            triggers: vec![Trigger {
                name: "retest".to_string(),
                module: "infrastructure".to_string(),
                environment: "production".to_string(),
                operation: "test".to_string(),
                on_target_operation: Some("deploy".to_string()),
                on_result: Some("{FAILURE,ERROR}".to_string()),
            }],
        };

        let json = serde_json::to_string(&model).unwrap();
        let parsed: ModuleModel = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.continue_on_failure, Some(false));
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.steps[0].target_resource, "ssh-web01");
        assert_eq!(parsed.triggers[0].on_result.as_deref(), Some("{FAILURE,ERROR}"));
    }

    #[test]
    fn trigger_patterns_are_optional() {
        let trigger: Trigger = serde_json::from_value(json!({
            "name": "always",
            "module": "m",
            "environment": "e",
            "operation": "test",
        }))
        .unwrap();
        assert!(trigger.on_target_operation.is_none());
        assert!(trigger.on_result.is_none());
    }
}
