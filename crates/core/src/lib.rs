//! `opsgate-core` — process-wide foundation for the clustered server.
//!
//! Holds the immutable configuration model and the identifier newtypes shared
//! by every other crate. No I/O beyond reading the environment at startup.

pub mod config;
pub mod id;

pub use config::{Config, ConfigError, Environment, RedisConfig, SessionStoreKind};
pub use id::UserId;
