//! The execution result tree.
//!
//! Every unit of work in an execution reports into one shared tree of
//! result nodes. [`ExecutionResult`] is a cheap-to-clone handle to a node:
//! clones refer to the same node, and handles can be passed freely between
//! tasks. Children hold weak references to their parent, so dropping the
//! root handle releases the whole tree.
//!
//! A node starts in `Executing` and transitions exactly once into a
//! terminal state. Terminal nodes accept no further transitions, no new
//! children and no message changes to their state; late calls are logged
//! and ignored rather than panicking. Growing the tree is guarded by the
//! node's [`ContinuationPolicy`]: once the policy says stop, `add_child`
//! refuses with [`ResultError::Interrupted`] and the refusing node settles
//! as `Interrupted`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use quince_types::execution::ExecutionState;

use crate::execution::continuation::ContinuationPolicy;
use crate::execution::notification::{ExecutionNotification, ResultNotifier};

// ---------------------------------------------------------------------------
// Message keys
// ---------------------------------------------------------------------------

/// Well-known message keys used by the engine. Plugins may add their own
/// keys; keys are free-form strings and insertion order is preserved.
pub mod msg {
    /// General progress and completion messages.
    pub const MESSAGE: &str = "Message";
    /// Human-readable description of what went wrong.
    pub const ERROR_MESSAGE: &str = "Error Message";
    /// Cause chain of the fault that errored the node.
    pub const ERROR_CAUSE: &str = "Error Cause";
    /// Aggregated summary of child outcomes, written by
    /// [`ExecutionResult::complete_as_computed`](super::ExecutionResult::complete_as_computed).
    pub const COMPOSITE_RESULT: &str = "Composite Result";
    /// Session lifecycle narration (connect attempts, disconnects).
    pub const SESSION: &str = "Session";
}

/// Error message attached to children that were still `Executing` when
/// their parent computed its aggregate state.
pub const FORCED_ERROR_MESSAGE: &str =
    "State is forced to error because it was not set explicitly.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the result tree refused to grow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResultError {
    /// The continuation policy says execution must stop.
    #[error("execution interrupted: {0}")]
    Interrupted(String),
    /// The target node is already in a terminal state.
    #[error("result '{0}' is already completed")]
    Completed(String),
}

// ---------------------------------------------------------------------------
// Node internals
// ---------------------------------------------------------------------------

struct ResultNode {
    id: Uuid,
    description: RwLock<String>,
    state: RwLock<ExecutionState>,
    started_at: DateTime<Utc>,
    started: Instant,
    /// Frozen on the transition into a terminal state.
    duration: RwLock<Option<Duration>>,
    /// Keyed messages in insertion order. Appends to an existing key join
    /// with a newline.
    messages: RwLock<Vec<(String, String)>>,
    children: RwLock<Vec<ExecutionResult>>,
    parent: Weak<ResultNode>,
    policy: Arc<ContinuationPolicy>,
    /// Present on the root node only; fires once on the root's terminal
    /// transition.
    notifier: Option<ResultNotifier>,
    notified: AtomicBool,
}

/// Weak handle to a result node, used by the continuation policy to record
/// the failed result without keeping the tree alive.
#[derive(Debug, Clone)]
pub(crate) struct WeakResult(Weak<ResultNode>);

impl WeakResult {
    pub(crate) fn upgrade(&self) -> Option<ExecutionResult> {
        self.0.upgrade().map(|node| ExecutionResult { node })
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Handle to one node of the execution result tree.
///
/// Equality is node identity: two handles are equal when they refer to the
/// same node.
#[derive(Clone)]
pub struct ExecutionResult {
    node: Arc<ResultNode>,
}

impl ExecutionResult {
    /// Create a root node with a fresh continuation policy and no
    /// completion notifier.
    pub fn root(description: impl Into<String>) -> Self {
        Self::root_with(description, Arc::new(ContinuationPolicy::new()), None)
    }

    /// Create a root node with an explicit policy and an optional notifier
    /// that fires once when the root reaches a terminal state.
    pub fn root_with(
        description: impl Into<String>,
        policy: Arc<ContinuationPolicy>,
        notifier: Option<ResultNotifier>,
    ) -> Self {
        Self {
            node: Arc::new(ResultNode {
                id: Uuid::now_v7(),
                description: RwLock::new(description.into()),
                state: RwLock::new(ExecutionState::Executing),
                started_at: Utc::now(),
                started: Instant::now(),
                duration: RwLock::new(None),
                messages: RwLock::new(Vec::new()),
                children: RwLock::new(Vec::new()),
                parent: Weak::new(),
                policy,
                notifier,
                notified: AtomicBool::new(false),
            }),
        }
    }

    // -- tree structure ----------------------------------------------------

    /// Add a child node, sharing this node's continuation policy.
    ///
    /// Refuses when this node is already terminal, and refuses with
    /// [`ResultError::Interrupted`] when the continuation policy says
    /// execution must stop. In the latter case this node settles as
    /// `Interrupted` so the abort is visible in the tree.
    pub fn add_child(
        &self,
        description: impl Into<String>,
    ) -> Result<ExecutionResult, ResultError> {
        let description = description.into();

        if self.state().is_terminal() {
            warn!(
                result = %self.description(),
                child = %description,
                "refusing child on completed result"
            );
            return Err(ResultError::Completed(self.description()));
        }

        if !self.node.policy.continue_execution() {
            let reason = self.stop_reason();
            self.add_message(msg::MESSAGE, &reason);
            self.set_state(ExecutionState::Interrupted);
            return Err(ResultError::Interrupted(reason));
        }

        let child = ExecutionResult {
            node: Arc::new(ResultNode {
                id: Uuid::now_v7(),
                description: RwLock::new(description),
                state: RwLock::new(ExecutionState::Executing),
                started_at: Utc::now(),
                started: Instant::now(),
                duration: RwLock::new(None),
                messages: RwLock::new(Vec::new()),
                children: RwLock::new(Vec::new()),
                parent: Arc::downgrade(&self.node),
                policy: Arc::clone(&self.node.policy),
                notifier: None,
                notified: AtomicBool::new(false),
            }),
        };
        write_lock(&self.node.children).push(child.clone());
        Ok(child)
    }

    /// Parent node, if any. `None` for the root.
    pub fn parent(&self) -> Option<ExecutionResult> {
        self.node.parent.upgrade().map(|node| ExecutionResult { node })
    }

    /// Root of the tree this node belongs to.
    pub fn root_result(&self) -> ExecutionResult {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Whether this node is the root of its tree.
    pub fn is_root(&self) -> bool {
        self.node.parent.upgrade().is_none()
    }

    /// Snapshot of the current children, in insertion order.
    pub fn children(&self) -> Vec<ExecutionResult> {
        read_lock(&self.node.children).clone()
    }

    /// Children currently in the given state.
    pub fn children_with_state(&self, state: ExecutionState) -> Vec<ExecutionResult> {
        read_lock(&self.node.children)
            .iter()
            .filter(|child| child.state() == state)
            .cloned()
            .collect()
    }

    /// The continuation policy shared by every node of this tree.
    pub fn continuation_policy(&self) -> Arc<ContinuationPolicy> {
        Arc::clone(&self.node.policy)
    }

    /// Convenience for `continuation_policy().continue_execution()`.
    pub fn continue_execution(&self) -> bool {
        self.node.policy.continue_execution()
    }

    /// Request cooperative cancellation of the whole tree.
    pub fn cancel(&self) {
        self.node.policy.cancel();
    }

    // -- accessors ---------------------------------------------------------

    /// Stable node identifier.
    pub fn id(&self) -> Uuid {
        self.node.id
    }

    /// Node description.
    pub fn description(&self) -> String {
        read_lock(&self.node.description).clone()
    }

    /// Replace the node description.
    pub fn set_description(&self, description: impl Into<String>) {
        *write_lock(&self.node.description) = description.into();
    }

    /// Current state.
    pub fn state(&self) -> ExecutionState {
        *read_lock(&self.node.state)
    }

    /// Whether the node is still running.
    pub fn is_executing(&self) -> bool {
        self.state() == ExecutionState::Executing
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.node.started_at
    }

    /// Elapsed time; frozen once the node reaches a terminal state.
    pub fn duration(&self) -> Duration {
        read_lock(&self.node.duration).unwrap_or_else(|| self.node.started.elapsed())
    }

    // -- messages ----------------------------------------------------------

    /// All messages, in insertion order.
    pub fn messages(&self) -> Vec<(String, String)> {
        read_lock(&self.node.messages).clone()
    }

    /// Message content for a key.
    pub fn message(&self, key: &str) -> Option<String> {
        read_lock(&self.node.messages)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, content)| content.clone())
    }

    /// Append message content under a key. Appends to an existing key join
    /// with a newline; new keys keep insertion order.
    pub fn add_message(&self, key: impl Into<String>, content: impl Into<String>) {
        let key = key.into();
        let content = content.into();
        let mut messages = write_lock(&self.node.messages);
        match messages.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                existing.push('\n');
                existing.push_str(&content);
            }
            None => messages.push((key, content)),
        }
    }

    /// Set message content under a key, replacing any existing content.
    pub fn add_or_replace_message(&self, key: impl Into<String>, content: impl Into<String>) {
        let key = key.into();
        let content = content.into();
        let mut messages = write_lock(&self.node.messages);
        match messages.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = content,
            None => messages.push((key, content)),
        }
    }

    // -- completion --------------------------------------------------------

    /// Complete as `Success` with a progress message.
    pub fn complete_as_successful(&self, message: impl Into<String>) {
        self.add_message(msg::MESSAGE, message);
        self.set_state(ExecutionState::Success);
    }

    /// Complete as `Failure`: the step ran, its outcome was negative.
    pub fn complete_as_failure(&self, message: impl Into<String>) {
        self.add_message(msg::ERROR_MESSAGE, message);
        self.set_state(ExecutionState::Failure);
    }

    /// Complete as `Error` from a fault, recording its message and cause
    /// chain.
    pub fn complete_as_error(&self, error: &(dyn std::error::Error + 'static)) {
        self.add_message(msg::ERROR_MESSAGE, error.to_string());
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        if !causes.is_empty() {
            self.add_message(msg::ERROR_CAUSE, causes.join("\n"));
        }
        self.set_state(ExecutionState::Error);
    }

    /// Complete as `Interrupted`: the step stopped voluntarily after
    /// observing cancellation or a continuation stop.
    pub fn complete_as_interrupted(&self, message: impl Into<String>) {
        self.add_message(msg::MESSAGE, message);
        self.set_state(ExecutionState::Interrupted);
    }

    /// Complete with a state aggregated from the children.
    ///
    /// Children still `Executing` are first forced to `Error`. The
    /// aggregate is then the worst child outcome: any `Error` child makes
    /// this node `Error`; otherwise any `Failure` makes it `Failure`;
    /// otherwise any `Interrupted` makes it `Interrupted`; otherwise
    /// `Success`. A node with no children computes to `Success`. A summary
    /// of child outcomes is recorded under the composite message key.
    pub fn complete_as_computed(&self, message: impl Into<String>) {
        if self.state().is_terminal() {
            warn!(
                result = %self.description(),
                state = %self.state(),
                "ignoring computed completion on completed result"
            );
            return;
        }

        let children = self.children();
        for child in &children {
            if child.is_executing() {
                child.add_message(msg::ERROR_MESSAGE, FORCED_ERROR_MESSAGE);
                child.set_state(ExecutionState::Error);
            }
        }

        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut errors = 0usize;
        let mut interrupted = 0usize;
        for child in &children {
            match child.state() {
                ExecutionState::Success => successes += 1,
                ExecutionState::Failure => failures += 1,
                ExecutionState::Error => errors += 1,
                ExecutionState::Interrupted => interrupted += 1,
                ExecutionState::Executing => {}
            }
        }

        let computed = if errors > 0 {
            ExecutionState::Error
        } else if failures > 0 {
            ExecutionState::Failure
        } else if interrupted > 0 {
            ExecutionState::Interrupted
        } else {
            ExecutionState::Success
        };

        self.add_or_replace_message(
            msg::COMPOSITE_RESULT,
            format!(
                "{successes} successful, {failures} failed, {errors} in error, \
                 {interrupted} interrupted, {} total.",
                children.len()
            ),
        );
        self.add_message(msg::MESSAGE, message);
        self.set_state(computed);
    }

    // -- snapshots ---------------------------------------------------------

    /// Immutable, serializable snapshot of this node and its subtree.
    pub fn snapshot(&self) -> ResultSnapshot {
        ResultSnapshot {
            id: self.id(),
            description: self.description(),
            state: self.state(),
            started_at: self.started_at(),
            duration_ms: self.duration().as_millis() as u64,
            messages: self.messages(),
            children: self.children().iter().map(ExecutionResult::snapshot).collect(),
        }
    }

    // -- internals ---------------------------------------------------------

    pub(crate) fn downgrade(&self) -> WeakResult {
        WeakResult(Arc::downgrade(&self.node))
    }

    fn stop_reason(&self) -> String {
        if self.node.policy.is_cancelled() {
            return "Execution was cancelled.".to_string();
        }
        match self.node.policy.failed_result() {
            Some(failed) => format!(
                "Execution stopped after '{}' did not succeed.",
                failed.description()
            ),
            None => "Execution stopped.".to_string(),
        }
    }

    /// Transition into a terminal state. Idempotence guard: a second
    /// transition is logged and ignored.
    fn set_state(&self, new_state: ExecutionState) {
        {
            let mut state = write_lock(&self.node.state);
            if state.is_terminal() {
                warn!(
                    result = %self.description(),
                    current = %*state,
                    requested = %new_state,
                    "ignoring state transition on completed result"
                );
                return;
            }
            *state = new_state;
        }
        if new_state.is_terminal() {
            let mut duration = write_lock(&self.node.duration);
            if duration.is_none() {
                *duration = Some(self.node.started.elapsed());
            }
        }
        debug!(result = %self.description(), state = %new_state, "result completed");

        if new_state.is_terminal() && new_state != ExecutionState::Success {
            self.node.policy.record_failed(self);
        }
        if new_state.is_terminal() && self.is_root() {
            if let Some(notifier) = &self.node.notifier {
                if !self.node.notified.swap(true, Ordering::SeqCst) {
                    notifier.publish(ExecutionNotification {
                        state: new_state,
                        result: self.snapshot(),
                    });
                }
            }
        }
    }
}

impl PartialEq for ExecutionResult {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for ExecutionResult {}

impl std::fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionResult")
            .field("id", &self.node.id)
            .field("description", &self.description())
            .field("state", &self.state())
            .field("children", &read_lock(&self.node.children).len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ResultSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a result subtree, safe to serialize and ship to
/// listeners and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub id: Uuid,
    pub description: String,
    pub state: ExecutionState,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub messages: Vec<(String, String)>,
    pub children: Vec<ResultSnapshot>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
