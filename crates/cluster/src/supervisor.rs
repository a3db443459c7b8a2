//! Worker supervision.
//!
//! The original deployment target forked one OS process per CPU and reforked
//! on every exit, unconditionally. That respawn loop is modeled here as an
//! explicit per-slot state machine (`Starting → Running → Crashed → Backoff`
//! and back, `Terminated` on shutdown) with a configurable [`BackoffPolicy`].
//! `BackoffPolicy::none()` reproduces the unthrottled behavior; the default
//! policy throttles crash loops instead.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

type StateBoard = Arc<Mutex<HashMap<WorkerId, WorkerState>>>;

/// Index of one worker slot, 1-based (worker 0 is the controller's slot in
/// log output, never a real worker).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Terminal result of one worker run.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Crashed,
    Backoff,
    Terminated,
}

/// Restart throttling for crashed workers.
///
/// Exponential: `base * 2^(n-1)` for the n-th consecutive crash, capped at
/// `max`. A worker that stays up longer than `stable_after` resets its crash
/// counter.
#[derive(Debug, Copy, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub stable_after: Duration,
}

impl BackoffPolicy {
    /// Immediate unconditional refork. Crash loops spin at full speed; only
    /// use where availability beats everything else.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            stable_after: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, consecutive_crashes: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let shift = consecutive_crashes.saturating_sub(1).min(16);
        self.base
            .saturating_mul(2u32.saturating_pow(shift))
            .min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(10),
            stable_after: Duration::from_secs(30),
        }
    }
}

/// Effective worker count: detected processing units clamped by the
/// configured cap, never below one.
pub fn target_workers(detected: usize, cap: usize) -> usize {
    detected.min(cap).max(1)
}

/// Asks the supervisor to move every slot to `Terminated`.
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// Read-only view of every slot's current state.
#[derive(Clone)]
pub struct WorkerMonitor {
    states: StateBoard,
}

impl WorkerMonitor {
    pub fn state_of(&self, worker: WorkerId) -> Option<WorkerState> {
        self.states.lock().unwrap().get(&worker).copied()
    }

    pub fn states(&self) -> HashMap<WorkerId, WorkerState> {
        self.states.lock().unwrap().clone()
    }
}

#[derive(Debug, Copy, Clone)]
struct Slot {
    worker: WorkerId,
    consecutive_crashes: u32,
    started_at: Instant,
}

/// Keeps `count` workers alive until shut down.
pub struct Supervisor {
    policy: BackoffPolicy,
    shutdown: watch::Receiver<bool>,
    states: StateBoard,
}

impl Supervisor {
    pub fn new(policy: BackoffPolicy) -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                policy,
                shutdown: rx,
                states: StateBoard::default(),
            },
            ShutdownHandle(tx),
        )
    }

    /// Handle for observing slot states while `run` is in flight.
    pub fn monitor(&self) -> WorkerMonitor {
        WorkerMonitor {
            states: self.states.clone(),
        }
    }

    /// Spawn `count` workers from `factory` and refork on every exit —
    /// crash, error return, or panic alike — preserving the target count
    /// until the shutdown handle fires.
    pub async fn run<F, Fut>(mut self, count: usize, factory: F)
    where
        F: Fn(WorkerId) -> Fut,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let mut set: JoinSet<Result<(), WorkerError>> = JoinSet::new();
        let mut slots: HashMap<tokio::task::Id, Slot> = HashMap::new();

        for index in 1..=count as u32 {
            let worker = WorkerId::new(index);
            self.states
                .lock()
                .unwrap()
                .insert(worker, WorkerState::Starting);
            let states = self.states.clone();
            let fut = factory(worker);
            let handle = set.spawn(async move {
                states.lock().unwrap().insert(worker, WorkerState::Running);
                fut.await
            });
            tracing::info!(worker = worker.index(), "worker forked");
            slots.insert(
                handle.id(),
                Slot {
                    worker,
                    consecutive_crashes: 0,
                    started_at: Instant::now(),
                },
            );
        }

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("supervisor shutting down; terminating workers");
                        set.abort_all();
                        while set.join_next().await.is_some() {}
                        let mut states = self.states.lock().unwrap();
                        for slot in slots.values() {
                            states.insert(slot.worker, WorkerState::Terminated);
                        }
                        break;
                    }
                }
                joined = set.join_next_with_id() => {
                    let Some(result) = joined else { break };
                    let (id, reason) = match result {
                        Ok((id, Ok(()))) => (id, "exited cleanly".to_string()),
                        Ok((id, Err(err))) => (id, err.to_string()),
                        Err(join_err) => {
                            let id = join_err.id();
                            let reason = if join_err.is_panic() {
                                format!("panicked: {}", panic_message(join_err.into_panic()))
                            } else {
                                "aborted".to_string()
                            };
                            (id, reason)
                        }
                    };

                    let Some(mut slot) = slots.remove(&id) else { continue };
                    self.states
                        .lock()
                        .unwrap()
                        .insert(slot.worker, WorkerState::Crashed);
                    slot.consecutive_crashes =
                        if slot.started_at.elapsed() >= self.policy.stable_after {
                            1
                        } else {
                            slot.consecutive_crashes + 1
                        };

                    let delay = self.policy.delay_for(slot.consecutive_crashes);
                    tracing::warn!(
                        worker = slot.worker.index(),
                        %reason,
                        crashes = slot.consecutive_crashes,
                        backoff_ms = delay.as_millis() as u64,
                        "worker died; restarting"
                    );

                    self.states.lock().unwrap().insert(
                        slot.worker,
                        if delay.is_zero() {
                            WorkerState::Starting
                        } else {
                            WorkerState::Backoff
                        },
                    );

                    // The replacement flips its own slot to Running once the
                    // backoff delay has actually elapsed.
                    let worker = slot.worker;
                    let states = self.states.clone();
                    let fut = factory(worker);
                    let handle = set.spawn(async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        states.lock().unwrap().insert(worker, WorkerState::Running);
                        fut.await
                    });
                    slot.started_at = Instant::now();
                    slots.insert(handle.id(), slot);
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
