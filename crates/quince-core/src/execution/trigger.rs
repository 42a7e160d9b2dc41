//! Trigger resolution.
//!
//! Triggers are declarative rules on a module model selecting follow-on
//! operations. Resolution narrows the model's triggers twice: first by the
//! operation that was invoked, then by the terminal state of the model
//! result. Both filters share one pattern grammar:
//!
//! - absent, empty or `*` matches anything
//! - `{a,b,c}` matches when any trimmed member equals the candidate,
//!   case-insensitively
//! - anything else is a literal case-insensitive match
//!
//! A list pattern missing its closing brace is taken literally and thus
//! matches nothing useful; resolution never fails.

use tracing::debug;

use quince_types::execution::ExecutionState;
use quince_types::module::Trigger;

/// Pattern matching any candidate.
pub const WILDCARD: &str = "*";

/// Triggers whose `on_target_operation` pattern matches the invoked
/// operation.
pub fn resolve_for_operation<'a>(
    triggers: impl IntoIterator<Item = &'a Trigger>,
    operation: &str,
) -> Vec<&'a Trigger> {
    triggers
        .into_iter()
        .filter(|trigger| matches_pattern(trigger.on_target_operation.as_deref(), operation))
        .collect()
}

/// Triggers whose `on_result` pattern matches the terminal state of the
/// model result.
pub fn resolve_for_result<'a>(
    triggers: impl IntoIterator<Item = &'a Trigger>,
    state: ExecutionState,
) -> Vec<&'a Trigger> {
    let matched: Vec<&Trigger> = triggers
        .into_iter()
        .filter(|trigger| matches_pattern(trigger.on_result.as_deref(), state.as_str()))
        .collect();
    debug!(state = %state, count = matched.len(), "triggers resolved for result");
    matched
}

/// One pattern against one candidate. Patterns are trimmed before
/// interpretation.
fn matches_pattern(pattern: Option<&str>, candidate: &str) -> bool {
    let pattern = match pattern {
        None => return true,
        Some(p) => p.trim(),
    };
    if pattern.is_empty() || pattern == WILDCARD {
        return true;
    }
    if let Some(body) = pattern.strip_prefix('{') {
        if let Some(members) = body.strip_suffix('}') {
            return members
                .split(',')
                .any(|member| member.trim().eq_ignore_ascii_case(candidate));
        }
        // Malformed list, fall through to a literal comparison.
    }
    pattern.eq_ignore_ascii_case(candidate)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
