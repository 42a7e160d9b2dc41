//! Variable sources for substitution.

use std::collections::HashMap;

/// A named set of values `${name}` references resolve against.
pub trait Variables: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// MapVariables
// ---------------------------------------------------------------------------

/// In-memory variable source backed by a map. The usual carrier of model
/// variables.
#[derive(Debug, Clone, Default)]
pub struct MapVariables {
    values: HashMap<String, String>,
}

impl MapVariables {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

impl From<HashMap<String, String>> for MapVariables {
    fn from(values: HashMap<String, String>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<(String, String)> for MapVariables {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Variables for MapVariables {
    fn resolve(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// CompositeVariables
// ---------------------------------------------------------------------------

/// Layered variable source dispatching on a dotted prefix.
///
/// `${deploy.host}` resolves `host` against the source registered under
/// the `deploy` prefix. Names without a registered prefix fall back to the
/// default source, when one is set.
#[derive(Default)]
pub struct CompositeVariables {
    sources: Vec<(String, Box<dyn Variables>)>,
    fallback: Option<Box<dyn Variables>>,
}

impl CompositeVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under a prefix. Builder style.
    pub fn with_source(mut self, prefix: impl Into<String>, source: impl Variables + 'static) -> Self {
        self.sources.push((prefix.into(), Box::new(source)));
        self
    }

    /// Register the source for names without a known prefix.
    pub fn with_fallback(mut self, source: impl Variables + 'static) -> Self {
        self.fallback = Some(Box::new(source));
        self
    }
}

impl Variables for CompositeVariables {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some((prefix, rest)) = name.split_once('.') {
            if let Some((_, source)) = self.sources.iter().find(|(p, _)| p == prefix) {
                return source.resolve(rest);
            }
        }
        self.fallback.as_ref().and_then(|source| source.resolve(name))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_variables_resolve() {
        let mut vars = MapVariables::default();
        vars.insert("host", "web01");
        assert_eq!(vars.resolve("host").as_deref(), Some("web01"));
        assert_eq!(vars.resolve("port"), None);
    }

    #[test]
    fn composite_dispatches_on_prefix() {
        let mut deploy = MapVariables::default();
        deploy.insert("host", "web01");
        let mut fallback = MapVariables::default();
        fallback.insert("host", "local");

        let vars = CompositeVariables::new()
            .with_source("deploy", deploy)
            .with_fallback(fallback);

        assert_eq!(vars.resolve("deploy.host").as_deref(), Some("web01"));
        assert_eq!(vars.resolve("host").as_deref(), Some("local"));
        assert_eq!(vars.resolve("test.host"), None);
    }
}
