//! Variable substitution: `${name}` references in step content, resolved
//! eagerly before a step executes.

pub mod engine;
pub mod variables;

pub use engine::{substitute_content, substitute_text, MAX_SUBSTITUTION_DEPTH};
pub use variables::{CompositeVariables, MapVariables, Variables};
