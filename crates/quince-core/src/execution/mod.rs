//! Execution: the result tree, the continuation policy that governs its
//! growth, step running, trigger resolution and completion notification.

pub mod continuation;
pub mod notification;
pub mod result;
pub mod runner;
pub mod task;
pub mod trigger;

pub use continuation::ContinuationPolicy;
pub use notification::{
    ExecutionNotification, NotificationDispatcher, ResultListener, ResultNotifier,
};
pub use result::{ExecutionResult, ResultError, ResultSnapshot};
pub use runner::run_step;
pub use task::{OperationTask, PluginBinding, PluginResolver, TriggerInvoker};
