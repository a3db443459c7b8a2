//! `opsgate-sessions` — session persistence for the clustered server.
//!
//! One store handle is constructed per worker before the middleware pipeline
//! is assembled; the session middleware shares it across all concurrent
//! requests of that worker.

pub mod error;
pub mod session;
pub mod sid;
pub mod store;

mod mongo;
mod redis_store;

pub use error::SessionError;
pub use session::{Session, SessionData};
pub use sid::{SessionId, SessionKey};
pub use store::SessionStore;
