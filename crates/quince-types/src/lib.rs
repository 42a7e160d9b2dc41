//! Shared domain types for Quince.
//!
//! This crate contains the core domain types used across the Quince
//! automation engine: execution states, module models, triggers, resources
//! and credentials.
//!
//! Zero infrastructure dependencies -- only serde.

pub mod execution;
pub mod module;
pub mod resource;
