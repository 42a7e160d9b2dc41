//! `${name}` substitution over text and step content.
//!
//! The engine substitutes eagerly and explicitly: step content is
//! transformed once, before the step executes, by walking the JSON value
//! and rewriting every string leaf. There is no lazy or on-access
//! substitution.
//!
//! Grammar: `${name}` is replaced by the resolved value; `$${` escapes to
//! a literal `${`; an unresolvable or unclosed reference is left verbatim
//! so the plugin sees exactly what the model author wrote. Substitution
//! never fails.

use serde_json::Value;
use tracing::{debug, warn};

use crate::substitution::variables::Variables;

/// Nesting depth bound for step content. Values nested deeper are left
/// untouched, with a warning, instead of risking a stack overflow.
pub const MAX_SUBSTITUTION_DEPTH: usize = 64;

/// Substitute `${name}` references in one string.
pub fn substitute_text(input: &str, variables: &dyn Variables) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let tail = &rest[dollar..];
        if let Some(after_escape) = tail.strip_prefix("$${") {
            out.push('$');
            out.push('{');
            rest = after_escape;
            continue;
        }
        let Some(after_open) = tail.strip_prefix("${") else {
            out.push('$');
            rest = &tail[1..];
            continue;
        };
        let Some(close) = after_open.find('}') else {
            // Unclosed reference, keep the rest verbatim.
            out.push_str(tail);
            return out;
        };
        let name = &after_open[..close];
        match variables.resolve(name) {
            Some(value) => out.push_str(&value),
            None => {
                debug!(name, "variable not resolvable, reference left verbatim");
                out.push_str(&tail[..close + 3]);
            }
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Substitute `${name}` references in every string leaf of a step content
/// value. Keys, numbers, booleans and nulls are untouched.
pub fn substitute_content(content: &Value, variables: &dyn Variables) -> Value {
    substitute_value(content, variables, 0)
}

fn substitute_value(value: &Value, variables: &dyn Variables, depth: usize) -> Value {
    if depth > MAX_SUBSTITUTION_DEPTH {
        warn!(depth, "step content nested too deep, left unsubstituted");
        return value.clone();
    }
    match value {
        Value::String(text) => Value::String(substitute_text(text, variables)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, variables, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute_value(item, variables, depth + 1)))
                .collect(),
        ),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::substitution::variables::MapVariables;

    fn vars() -> MapVariables {
        let mut vars = MapVariables::default();
        vars.insert("host", "web01");
        vars.insert("port", "8080");
        vars
    }

    #[test]
    fn replaces_references() {
        assert_eq!(
            substitute_text("http://${host}:${port}/", &vars()),
            "http://web01:8080/"
        );
    }

    #[test]
    fn reference_free_input_passes_through_unchanged() {
        let content = json!({ "command": "restart", "count": 2 });
        assert_eq!(substitute_content(&content, &vars()), content);
    }

    #[test]
    fn unresolvable_reference_is_left_verbatim() {
        assert_eq!(
            substitute_text("${host} and ${unknown}", &vars()),
            "web01 and ${unknown}"
        );
    }

    #[test]
    fn escaped_reference_becomes_literal() {
        assert_eq!(substitute_text("$${host}", &vars()), "${host}");
        assert_eq!(
            substitute_text("literal $${host}, real ${host}", &vars()),
            "literal ${host}, real web01"
        );
    }

    #[test]
    fn unclosed_reference_is_left_verbatim() {
        assert_eq!(substitute_text("${host and on", &vars()), "${host and on");
    }

    #[test]
    fn plain_dollars_pass_through() {
        assert_eq!(substitute_text("cost: $5 or $", &vars()), "cost: $5 or $");
    }

    #[test]
    fn empty_name_is_left_verbatim() {
        assert_eq!(substitute_text("${}", &vars()), "${}");
    }

    #[test]
    fn content_substitutes_string_leaves_only() {
        let content = json!({
            "command": "deploy --host ${host}",
            "retries": 3,
            "verbose": true,
            "targets": ["${host}", "${unknown}"],
            "nested": { "url": "http://${host}:${port}/" }
        });
        let substituted = substitute_content(&content, &vars());
        assert_eq!(
            substituted,
            json!({
                "command": "deploy --host web01",
                "retries": 3,
                "verbose": true,
                "targets": ["web01", "${unknown}"],
                "nested": { "url": "http://web01:8080/" }
            })
        );
    }

    #[test]
    fn keys_are_not_substituted() {
        let content = json!({ "${host}": "${host}" });
        let substituted = substitute_content(&content, &vars());
        assert_eq!(substituted, json!({ "${host}": "web01" }));
    }

    #[test]
    fn overly_deep_content_is_left_untouched() {
        let mut value = json!("${host}");
        for _ in 0..(MAX_SUBSTITUTION_DEPTH + 2) {
            value = json!([value]);
        }
        let substituted = substitute_content(&value, &vars());
        assert_eq!(substituted, value);
    }
}
