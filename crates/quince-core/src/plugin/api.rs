//! Plugin contract: operations, sessions and their faults.
//!
//! Plugins implement [`Operation`] and optionally [`Session`]. Both traits
//! use RPITIT and cannot be trait objects directly; [`BoxOperation`] and
//! [`BoxSession`] provide type-erased wrappers via object-safe `*Dyn`
//! companion traits with boxed futures and blanket implementations.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use quince_types::resource::{Credential, Resource};

use crate::execution::result::{ExecutionResult, ResultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fault raised by a session while connecting or disconnecting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SessionError {
    message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fault raised by plugin execution. Converted by the command runner into
/// an `Error` result node, except for `Interrupted` which settles the node
/// as `Interrupted`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    /// Connecting the session failed even after retrying.
    #[error("connect to resource '{resource}' failed after {attempts} attempts: {cause}")]
    Connect {
        resource: String,
        attempts: u32,
        cause: SessionError,
    },
    /// Disconnecting the session failed even after retrying.
    #[error("disconnect from resource '{resource}' failed: {cause}")]
    Disconnect {
        resource: String,
        cause: SessionError,
    },
    /// The operation itself faulted.
    #[error("operation failed: {0}")]
    Operation(String),
    /// A plugin violated the engine contract (unknown resource, missing
    /// session, malformed step content).
    #[error("plugin contract violation: {0}")]
    Contract(String),
    /// Execution stopped cooperatively; not a fault.
    #[error("execution interrupted: {0}")]
    Interrupted(String),
}

impl From<ResultError> for PluginError {
    fn from(error: ResultError) -> Self {
        match error {
            ResultError::Interrupted(reason) => PluginError::Interrupted(reason),
            ResultError::Completed(description) => PluginError::Contract(format!(
                "cannot report into completed result '{description}'"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A connection to an external resource, with an explicit lifecycle.
///
/// Sessions are single-use: connect, hand to one operation, disconnect.
pub trait Session: Send {
    fn connect<'a>(
        &'a mut self,
        resource: &'a Resource,
        credential: Option<&'a Credential>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send + 'a;

    fn disconnect(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send + '_;
}

/// Object-safe version of [`Session`] with boxed futures.
pub trait SessionDyn: Send {
    fn connect_boxed<'a>(
        &'a mut self,
        resource: &'a Resource,
        credential: Option<&'a Credential>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>>;

    fn disconnect_boxed(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + '_>>;
}

impl<T: Session> SessionDyn for T {
    fn connect_boxed<'a>(
        &'a mut self,
        resource: &'a Resource,
        credential: Option<&'a Credential>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + 'a>> {
        Box::pin(self.connect(resource, credential))
    }

    fn disconnect_boxed(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + '_>> {
        Box::pin(self.disconnect())
    }
}

/// Type-erased session.
pub struct BoxSession {
    inner: Box<dyn SessionDyn>,
}

impl BoxSession {
    /// Wrap a concrete [`Session`] in a type-erased box.
    pub fn new<T: Session + 'static>(session: T) -> Self {
        Self {
            inner: Box::new(session),
        }
    }

    pub async fn connect(
        &mut self,
        resource: &Resource,
        credential: Option<&Credential>,
    ) -> Result<(), SessionError> {
        self.inner.connect_boxed(resource, credential).await
    }

    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.inner.disconnect_boxed().await
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// One executable plugin operation.
///
/// The operation receives the substituted step content, the connected
/// session when the plugin declared one, and the result node to report
/// into. Operations own the completion of their result node; a node left
/// `Executing` is forced to `Error` when the parent computes its state.
/// Long-running operations should poll
/// [`ExecutionResult::continue_execution`] at safe points and settle as
/// `Interrupted` when it turns false.
pub trait Operation: Send + Sync {
    fn execute<'a>(
        &'a self,
        content: &'a Value,
        session: Option<&'a mut BoxSession>,
        result: &'a ExecutionResult,
    ) -> impl Future<Output = Result<(), PluginError>> + Send + 'a;
}

/// Object-safe version of [`Operation`] with boxed futures.
pub trait OperationDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        content: &'a Value,
        session: Option<&'a mut BoxSession>,
        result: &'a ExecutionResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;
}

impl<T: Operation> OperationDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        content: &'a Value,
        session: Option<&'a mut BoxSession>,
        result: &'a ExecutionResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>> {
        Box::pin(self.execute(content, session, result))
    }
}

/// Type-erased operation.
pub struct BoxOperation {
    inner: Box<dyn OperationDyn>,
}

impl BoxOperation {
    /// Wrap a concrete [`Operation`] in a type-erased box.
    pub fn new<T: Operation + 'static>(operation: T) -> Self {
        Self {
            inner: Box::new(operation),
        }
    }

    pub async fn execute(
        &self,
        content: &Value,
        session: Option<&mut BoxSession>,
        result: &ExecutionResult,
    ) -> Result<(), PluginError> {
        self.inner.execute_boxed(content, session, result).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Operation for Echo {
        async fn execute(
            &self,
            content: &Value,
            _session: Option<&'_ mut BoxSession>,
            result: &ExecutionResult,
        ) -> Result<(), PluginError> {
            result.complete_as_successful(content.to_string());
            Ok(())
        }
    }

    struct Flaky;

    impl Session for Flaky {
        async fn connect(
            &mut self,
            _resource: &Resource,
            _credential: Option<&'_ Credential>,
        ) -> Result<(), SessionError> {
            Err(SessionError::new("connection refused"))
        }

        async fn disconnect(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn boxed_operation_delegates() {
        let operation = BoxOperation::new(Echo);
        let result = ExecutionResult::root("step");
        operation
            .execute(&serde_json::json!("hello"), None, &result)
            .await
            .unwrap();
        assert!(!result.is_executing());
    }

    #[tokio::test]
    async fn boxed_session_delegates() {
        let mut session = BoxSession::new(Flaky);
        let resource = Resource::new("r", "p");
        let err = session.connect(&resource, None).await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        session.disconnect().await.unwrap();
    }

    #[test]
    fn interruption_converts_from_result_error() {
        let err: PluginError = ResultError::Interrupted("cancelled".to_string()).into();
        assert!(matches!(err, PluginError::Interrupted(_)));
    }
}
