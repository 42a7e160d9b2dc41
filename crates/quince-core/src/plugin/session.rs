//! Session-handled operation execution.
//!
//! [`SessionHandler`] wraps one plugin operation with the session
//! lifecycle: connect with retry, execute exactly once, disconnect with
//! retry. Session-less operations skip the lifecycle entirely. Every
//! lifecycle event is narrated into the result node under the `Session`
//! message key, so a failed connect is diagnosable from the result tree
//! alone.
//!
//! A disconnect failure after the operation already faulted never masks
//! the operation's fault; it is demoted to a session message.

use tokio::time::sleep;
use tracing::{debug, warn};

use quince_types::resource::{Credential, Resource};
use serde_json::Value;

use crate::execution::result::{msg, ExecutionResult};
use crate::plugin::api::{BoxOperation, BoxSession, PluginError, SessionError};
use crate::plugin::retry::RetryPolicy;

/// Executes one operation against one resource within a session lifecycle.
pub struct SessionHandler {
    operation: BoxOperation,
    resource: Resource,
    credential: Option<Credential>,
    retry: RetryPolicy,
}

impl SessionHandler {
    pub fn new(
        operation: BoxOperation,
        resource: Resource,
        credential: Option<Credential>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            operation,
            resource,
            credential,
            retry,
        }
    }

    /// Run the operation, managing the session around it.
    ///
    /// With no session the operation runs directly. With a session the
    /// flow is connect (retried), execute once, disconnect (retried); the
    /// disconnect runs even when the operation faulted.
    pub async fn execute(
        &self,
        content: &Value,
        session: Option<BoxSession>,
        result: &ExecutionResult,
    ) -> Result<(), PluginError> {
        let Some(mut session) = session else {
            result.add_message(msg::SESSION, "Operation runs without a session.");
            return self.operation.execute(content, None, result).await;
        };

        self.connect_with_retry(&mut session, result).await?;
        let outcome = self.operation.execute(content, Some(&mut session), result).await;
        match self.disconnect_with_retry(&mut session, result).await {
            Ok(()) => outcome,
            Err(disconnect_error) => match outcome {
                // The operation went fine, so the disconnect failure is the
                // step's fault.
                Ok(()) => Err(disconnect_error),
                // Never mask the operation's fault with a cleanup failure.
                Err(operation_error) => {
                    warn!(
                        resource = %self.resource.id,
                        error = %disconnect_error,
                        "session disconnect failed during cleanup"
                    );
                    result.add_message(
                        msg::SESSION,
                        format!("Session disconnect failed during cleanup: {disconnect_error}"),
                    );
                    Err(operation_error)
                }
            },
        }
    }

    async fn connect_with_retry(
        &self,
        session: &mut BoxSession,
        result: &ExecutionResult,
    ) -> Result<(), PluginError> {
        result.add_message(
            msg::SESSION,
            format!("Connecting to resource [{}].", self.resource.id),
        );
        let mut attempt = 1u32;
        loop {
            match session.connect(&self.resource, self.credential.as_ref()).await {
                Ok(()) => {
                    result.add_message(msg::SESSION, "Session connected.");
                    return Ok(());
                }
                Err(cause) if self.retry.should_retry(attempt) => {
                    debug!(
                        resource = %self.resource.id,
                        attempt,
                        error = %cause,
                        "session connect failed, retrying"
                    );
                    result.add_message(
                        msg::SESSION,
                        format!(
                            "Connect attempt {attempt} of {} failed: {cause}. Retrying in {:?}.",
                            self.retry.max_attempts,
                            self.retry.delay()
                        ),
                    );
                    sleep(self.retry.delay()).await;
                    attempt += 1;
                }
                Err(cause) => {
                    result.add_message(
                        msg::SESSION,
                        format!(
                            "Connect attempt {attempt} of {} failed: {cause}. Giving up.",
                            self.retry.max_attempts
                        ),
                    );
                    return Err(PluginError::Connect {
                        resource: self.resource.id.clone(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }

    async fn disconnect_with_retry(
        &self,
        session: &mut BoxSession,
        result: &ExecutionResult,
    ) -> Result<(), PluginError> {
        let mut attempt = 1u32;
        loop {
            match session.disconnect().await {
                Ok(()) => {
                    result.add_message(msg::SESSION, "Session disconnected.");
                    return Ok(());
                }
                Err(cause) if self.retry.should_retry(attempt) => {
                    debug!(
                        resource = %self.resource.id,
                        attempt,
                        error = %cause,
                        "session disconnect failed, retrying"
                    );
                    result.add_message(
                        msg::SESSION,
                        format!(
                            "Disconnect attempt {attempt} of {} failed: {cause}. Retrying in {:?}.",
                            self.retry.max_attempts,
                            self.retry.delay()
                        ),
                    );
                    sleep(self.retry.delay()).await;
                    attempt += 1;
                }
                Err(cause) => {
                    result.add_message(
                        msg::SESSION,
                        format!(
                            "Disconnect attempt {attempt} of {} failed: {cause}. Giving up.",
                            self.retry.max_attempts
                        ),
                    );
                    return Err(PluginError::Disconnect {
                        resource: self.resource.id.clone(),
                        cause,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use crate::plugin::api::{Operation, Session};

    #[derive(Default)]
    struct Counters {
        connects: AtomicU32,
        disconnects: AtomicU32,
        executions: AtomicU32,
    }

    struct CountingSession {
        counters: Arc<Counters>,
        /// Number of leading connect calls that fail.
        failing_connects: u32,
        disconnect_fails: bool,
    }

    impl Session for CountingSession {
        async fn connect(
            &mut self,
            _resource: &Resource,
            _credential: Option<&'_ Credential>,
        ) -> Result<(), SessionError> {
            let attempt = self.counters.connects.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failing_connects {
                Err(SessionError::new("connection refused"))
            } else {
                Ok(())
            }
        }

        async fn disconnect(&mut self) -> Result<(), SessionError> {
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.disconnect_fails {
                Err(SessionError::new("broken pipe"))
            } else {
                Ok(())
            }
        }
    }

    struct CountingOperation {
        counters: Arc<Counters>,
        fail: bool,
    }

    impl Operation for CountingOperation {
        async fn execute(
            &self,
            _content: &Value,
            _session: Option<&'_ mut BoxSession>,
            result: &ExecutionResult,
        ) -> Result<(), PluginError> {
            self.counters.executions.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PluginError::Operation("operation blew up".to_string()))
            } else {
                result.complete_as_successful("ok");
                Ok(())
            }
        }
    }

    fn handler(counters: &Arc<Counters>, fail_operation: bool, attempts: u32) -> SessionHandler {
        SessionHandler::new(
            BoxOperation::new(CountingOperation {
                counters: counters.clone(),
                fail: fail_operation,
            }),
            Resource::new("db-main", "jdbc"),
            Some(Credential::new("cred", "svc", "pw")),
            RetryPolicy::immediate(attempts),
        )
    }

    fn session(counters: &Arc<Counters>, failing_connects: u32, disconnect_fails: bool) -> BoxSession {
        BoxSession::new(CountingSession {
            counters: counters.clone(),
            failing_connects,
            disconnect_fails,
        })
    }

    #[tokio::test]
    async fn sessionless_operation_runs_directly() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        handler(&counters, false, 3)
            .execute(&json!({}), None, &result)
            .await
            .unwrap();
        assert_eq!(counters.executions.load(Ordering::SeqCst), 1);
        assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
        assert_eq!(
            result.message(msg::SESSION).as_deref(),
            Some("Operation runs without a session.")
        );
    }

    #[tokio::test]
    async fn connect_retries_then_succeeds() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        handler(&counters, false, 3)
            .execute(&json!({}), Some(session(&counters, 2, false)), &result)
            .await
            .unwrap();

        assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
        assert_eq!(counters.executions.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
        let narration = result.message(msg::SESSION).unwrap();
        assert!(narration.contains("Connect attempt 1 of 3 failed"));
        assert!(narration.contains("Connect attempt 2 of 3 failed"));
        assert!(narration.contains("Session connected."));
    }

    #[tokio::test]
    async fn connect_gives_up_after_max_attempts() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        let err = handler(&counters, false, 3)
            .execute(&json!({}), Some(session(&counters, 99, false)), &result)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Connect { attempts: 3, .. }));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
        assert_eq!(counters.executions.load(Ordering::SeqCst), 0);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn operation_fault_still_disconnects_once() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        let err = handler(&counters, true, 3)
            .execute(&json!({}), Some(session(&counters, 0, false)), &result)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Operation(_)));
        assert_eq!(counters.executions.load(Ordering::SeqCst), 1);
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disconnect_failure_fails_a_successful_step() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        let err = handler(&counters, false, 2)
            .execute(&json!({}), Some(session(&counters, 0, true)), &result)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Disconnect { .. }));
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disconnect_failure_never_masks_operation_fault() {
        let counters = Arc::new(Counters::default());
        let result = ExecutionResult::root("step");
        let err = handler(&counters, true, 2)
            .execute(&json!({}), Some(session(&counters, 0, true)), &result)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Operation(_)));
        assert_eq!(counters.disconnects.load(Ordering::SeqCst), 2);
        let narration = result.message(msg::SESSION).unwrap();
        assert!(narration.contains("Session disconnect failed during cleanup"));
    }
}
