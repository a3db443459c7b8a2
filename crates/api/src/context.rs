//! Per-request context.
//!
//! Every request carries a [`RequestContext`] from the moment it enters the
//! pipeline. Handlers and middleware reach it through the request extensions;
//! nothing here relies on ambient task-local state.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use opsgate_cluster::WorkerId;

/// Inbound correlation headers copied verbatim into the request log.
const TRACKED_HEADERS: [&str; 7] = [
    "scenario_id",
    "run_id",
    "thread_id",
    "user_id",
    "bop_id",
    "operation_id",
    "txn_id",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Structured record of one request, emitted when the response completes.
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub scenario_id: Option<String>,
    pub run_id: Option<String>,
    pub thread_id: Option<String>,
    pub user_id: Option<String>,
    pub bop_id: Option<String>,
    pub operation_id: Option<String>,
    pub transaction_id: Option<String>,
    pub status: RequestStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub node_id: String,
}

impl RequestLog {
    /// Build the initial record from the inbound headers. Absent headers stay
    /// `None`; a request with no correlation headers is still a valid request.
    pub fn from_headers(headers: &HeaderMap, node_id: String) -> Self {
        let tracked = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let [scenario_id, run_id, thread_id, user_id, bop_id, operation_id, transaction_id] =
            TRACKED_HEADERS.map(tracked);

        Self {
            scenario_id,
            run_id,
            thread_id,
            user_id,
            bop_id,
            operation_id,
            transaction_id,
            status: RequestStatus::Success,
            error: None,
            started_at: Utc::now(),
            node_id,
        }
    }
}

/// Node identifier stamped on every request log of a worker.
pub fn node_id(worker: WorkerId) -> String {
    format!("CLUSTER_NODE_{}", worker.index())
}

/// Shared handle to the request's log record.
///
/// Cloned into the fault boundary and any middleware that annotates the
/// record; the boundary snapshots it exactly once, when the response is done.
#[derive(Clone)]
pub struct RequestContext {
    started: Instant,
    log: Arc<Mutex<RequestLog>>,
}

impl RequestContext {
    pub fn new(log: RequestLog) -> Self {
        Self {
            started: Instant::now(),
            log: Arc::new(Mutex::new(log)),
        }
    }

    /// Flip the record to an error outcome. The first error message wins;
    /// later faults on the same request keep the original cause.
    pub fn mark_error(&self, message: impl Into<String>) {
        let mut log = self.log.lock().unwrap();
        log.status = RequestStatus::Error;
        if log.error.is_none() {
            log.error = Some(message.into());
        }
    }

    /// Record the authenticated user once identity is established.
    pub fn set_user(&self, user: impl Into<String>) {
        self.log.lock().unwrap().user_id = Some(user.into());
    }

    pub fn snapshot(&self) -> RequestLog {
        self.log.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Authenticated identity for a request, present only when the session
/// carried one.
#[derive(Clone)]
pub struct PrincipalContext(opsgate_auth::Principal);

impl PrincipalContext {
    pub fn new(principal: opsgate_auth::Principal) -> Self {
        Self(principal)
    }

    pub fn principal(&self) -> &opsgate_auth::Principal {
        &self.0
    }
}
