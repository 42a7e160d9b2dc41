//! Plugin layer: the contract plugins implement and the session handling
//! the engine wraps around them.

pub mod api;
pub mod retry;
pub mod session;

pub use api::{BoxOperation, BoxSession, Operation, PluginError, Session, SessionError};
pub use retry::RetryPolicy;
pub use session::SessionHandler;
