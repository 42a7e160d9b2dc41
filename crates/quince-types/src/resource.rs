//! Resource and credential records.
//!
//! Both are immutable value records resolved by external collaborators (the
//! resource repository and credential provider) and passed by reference into
//! the session handling layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A named external resource a session can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier, unique within an environment.
    pub id: String,
    /// Identifier of the plugin that owns sessions for this resource.
    pub plugin_id: String,
    /// Plugin-specific connection properties (host, port, paths, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl Resource {
    /// Create a resource with no properties.
    pub fn new(id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin_id: plugin_id.into(),
            properties: HashMap::new(),
        }
    }

    /// Look up a connection property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Login credential for a resource.
///
/// The `Debug` implementation redacts the password so credentials can be
/// traced without leaking secrets into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Credential identifier.
    pub id: String,
    /// User name.
    pub user: String,
    /// Password. Redacted from `Debug` output.
    pub password: String,
}

impl Credential {
    /// Create a new credential.
    pub fn new(
        id: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_property_lookup() {
        let mut resource = Resource::new("ssh-web01", "ssh");
        resource
            .properties
            .insert("host".to_string(), "web01.internal".to_string());

        assert_eq!(resource.property("host"), Some("web01.internal"));
        assert_eq!(resource.property("port"), None);
    }

    #[test]
    fn credential_debug_redacts_password() {
        let credential = Credential::new("weblogic-admin", "admin", "hunter2");
        let debug = format!("{credential:?}");
        assert!(debug.contains("weblogic-admin"));
        assert!(debug.contains("admin"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn credential_serde_roundtrip_keeps_password() {
        let credential = Credential::new("c", "u", "secret");
        let json = serde_json::to_string(&credential).unwrap();
        let parsed: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.password, "secret");
    }
}
