//! Continuation policy: the shared decision of whether execution keeps
//! going.
//!
//! One policy instance is shared by every node of a result tree. It is
//! lock-free: the continue-on-failure directive locks on first set, the
//! failed result records at most once, and cancellation is a plain atomic
//! flag. All reads are safe from any thread at any time.
//!
//! Cancellation is advisory. Setting the flag never kills a running step;
//! running steps are expected to poll [`ContinuationPolicy::continue_execution`]
//! at safe points and settle themselves as `Interrupted`.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::execution::result::{ExecutionResult, WeakResult};

/// Engine default when no directive is given: keep executing after a
/// failed step.
pub const DEFAULT_CONTINUE_ON_FAILURE: bool = true;

/// Shared continuation state of one execution.
#[derive(Debug, Default)]
pub struct ContinuationPolicy {
    /// Locks on first set; later sets are ignored.
    continue_on_failure: OnceLock<bool>,
    cancelled: AtomicBool,
    /// First non-successful result recorded while continue-on-failure is
    /// disabled. Held weakly so the policy never keeps a tree alive.
    failed: OnceLock<WeakResult>,
}

impl ContinuationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    // -- continue-on-failure directive -------------------------------------

    /// Lock the directive to "keep going after failures". No-op if the
    /// directive is already locked.
    pub fn enable_continue_on_failure(&self) {
        let _ = self.continue_on_failure.set(true);
    }

    /// Lock the directive to "stop at the first failure". No-op if the
    /// directive is already locked.
    pub fn disable_continue_on_failure(&self) {
        let _ = self.continue_on_failure.set(false);
    }

    /// Current directive, falling back to the engine default when unset.
    pub fn is_continue_on_failure(&self) -> bool {
        *self
            .continue_on_failure
            .get()
            .unwrap_or(&DEFAULT_CONTINUE_ON_FAILURE)
    }

    // -- cancellation ------------------------------------------------------

    /// Raise the cancellation flag. Idempotent, never blocks.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("execution cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    // -- failed result -----------------------------------------------------

    /// Record a non-successful result. Only recorded while the directive is
    /// "stop at the first failure"; at most one result is ever kept.
    pub(crate) fn record_failed(&self, result: &ExecutionResult) {
        if self.is_continue_on_failure() {
            return;
        }
        if self.failed.set(result.downgrade()).is_ok() {
            debug!(result = %result.description(), "first failed result recorded");
        }
    }

    /// The recorded failed result, if any is recorded and still alive.
    pub fn failed_result(&self) -> Option<ExecutionResult> {
        self.failed.get().and_then(WeakResult::upgrade)
    }

    // -- the decision ------------------------------------------------------

    /// Whether execution should keep going: not cancelled, and either the
    /// directive allows continuing after failures or nothing has failed.
    pub fn continue_execution(&self) -> bool {
        !self.is_cancelled() && (self.is_continue_on_failure() || self.failed.get().is_none())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
