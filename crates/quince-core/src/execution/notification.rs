//! Completion notifications.
//!
//! A root result carries an optional [`ResultNotifier`]. On the root's
//! terminal transition a notification with a snapshot of the whole tree is
//! pushed onto a bounded channel; a single consumer task fans it out to
//! registered listeners. Publishing never blocks the worker: when the
//! channel is full the notification is dropped with a warning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quince_types::execution::ExecutionState;

use crate::execution::result::ResultSnapshot;

/// Default channel capacity of a [`NotificationDispatcher`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Notification and listener
// ---------------------------------------------------------------------------

/// Published once when a root result reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNotification {
    /// Terminal state of the root.
    pub state: ExecutionState,
    /// Snapshot of the full result tree at completion time.
    pub result: ResultSnapshot,
}

/// Receives completion notifications. Implementations must be fast; slow
/// work should be handed off, the consumer task processes notifications
/// one at a time.
pub trait ResultListener: Send + Sync {
    fn on_completed(&self, notification: &ExecutionNotification);
}

// ---------------------------------------------------------------------------
// Notifier and dispatcher
// ---------------------------------------------------------------------------

/// Sending half handed to root results. Cloneable; publishing is
/// non-blocking.
#[derive(Debug, Clone)]
pub struct ResultNotifier {
    tx: mpsc::Sender<ExecutionNotification>,
}

impl ResultNotifier {
    pub(crate) fn publish(&self, notification: ExecutionNotification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(state = %n.state, "notification channel full, dropping completion notification");
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                debug!(state = %n.state, "notification dispatcher stopped, dropping completion notification");
            }
        }
    }
}

/// Owns the notification channel and the consumer task fanning
/// notifications out to listeners.
pub struct NotificationDispatcher {
    tx: mpsc::Sender<ExecutionNotification>,
    consumer: JoinHandle<()>,
}

impl NotificationDispatcher {
    /// Start a dispatcher with the default channel capacity. Requires a
    /// running tokio runtime.
    pub fn new(listeners: Vec<Arc<dyn ResultListener>>) -> Self {
        Self::with_capacity(listeners, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Start a dispatcher with an explicit channel capacity.
    pub fn with_capacity(listeners: Vec<Arc<dyn ResultListener>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExecutionNotification>(capacity);
        let consumer = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                debug!(state = %notification.state, "dispatching completion notification");
                for listener in &listeners {
                    listener.on_completed(&notification);
                }
            }
        });
        Self { tx, consumer }
    }

    /// A notifier handle to attach to root results.
    pub fn notifier(&self) -> ResultNotifier {
        ResultNotifier {
            tx: self.tx.clone(),
        }
    }

    /// Close the channel and wait for in-flight notifications to be
    /// delivered.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.consumer.await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::execution::continuation::ContinuationPolicy;
    use crate::execution::result::ExecutionResult;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ExecutionState>>,
    }

    impl ResultListener for Recorder {
        fn on_completed(&self, notification: &ExecutionNotification) {
            self.seen.lock().unwrap().push(notification.state);
        }
    }

    #[tokio::test]
    async fn root_completion_reaches_listeners() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(vec![recorder.clone()]);

        let root = ExecutionResult::root_with(
            "op",
            Arc::new(ContinuationPolicy::new()),
            Some(dispatcher.notifier()),
        );
        root.add_child("step").unwrap().complete_as_successful("ok");
        root.complete_as_computed("done");
        dispatcher.shutdown().await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[ExecutionState::Success]);
    }

    #[tokio::test]
    async fn child_completion_does_not_notify() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(vec![recorder.clone()]);

        let root = ExecutionResult::root_with(
            "op",
            Arc::new(ContinuationPolicy::new()),
            Some(dispatcher.notifier()),
        );
        root.add_child("step").unwrap().complete_as_failure("nope");
        dispatcher.shutdown().await;

        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let dispatcher = NotificationDispatcher::with_capacity(Vec::new(), 1);
        let notifier = dispatcher.notifier();

        // The consumer has no listeners and drains quickly, so saturate the
        // channel directly through the sender half.
        let root = ExecutionResult::root_with(
            "op",
            Arc::new(ContinuationPolicy::new()),
            Some(notifier.clone()),
        );
        let snapshot = root.snapshot();
        for _ in 0..16 {
            notifier.publish(ExecutionNotification {
                state: ExecutionState::Success,
                result: snapshot.clone(),
            });
        }
        dispatcher.shutdown().await;
    }
}
