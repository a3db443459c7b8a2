//! `opsgate-cluster` — worker supervision and cross-worker shared state.
//!
//! The controller owns a [`Supervisor`] that keeps a fixed number of workers
//! alive, plus the process-wide [`SharedState`] (application cache + event
//! bus) that workers consume read-mostly.

pub mod bus;
pub mod cache;
pub mod state;
pub mod supervisor;

pub use bus::{ClusterBus, ClusterEvent};
pub use cache::AppCache;
pub use state::SharedState;
pub use supervisor::{
    BackoffPolicy, ShutdownHandle, Supervisor, WorkerError, WorkerId, WorkerMonitor, WorkerState,
    target_workers,
};
