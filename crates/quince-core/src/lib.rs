//! Orchestration engine for Quince.
//!
//! The engine runs declarative module models against environments: every
//! unit of work reports into a shared [`execution::ExecutionResult`] tree,
//! a lock-free [`execution::ContinuationPolicy`] decides whether execution
//! keeps going after failures, plugin sessions are connected with retry,
//! and triggers select follow-on operations once a model has finished.

pub mod execution;
pub mod plugin;
pub mod substitution;
