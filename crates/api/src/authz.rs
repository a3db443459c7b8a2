//! Route-level authorization guard.
//!
//! Enforcement happens at the route boundary, before the handler runs, while
//! the access rules themselves live in `opsgate-auth` and know nothing about
//! HTTP. Denials negotiate their shape on the `Accept` header: browsers get
//! the access-denied page, API clients get plain text.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use opsgate_auth::{AccessControl, AuthError};

use crate::context::PrincipalContext;

const ACCESS_DENIED_VIEW: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/views/access-denied.html"));

const ACCESS_DENIED_TEXT: &str = "You don't have permission to this action.";

/// State for one guarded route: the shared rule set plus the action the
/// route requires.
#[derive(Clone)]
pub struct Guard {
    pub access: Arc<AccessControl>,
    pub action: &'static str,
}

pub async fn require_action(State(guard): State<Guard>, req: Request, next: Next) -> Response {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .map(|ctx| ctx.principal().clone());

    if guard.access.can(principal.as_ref(), guard.action) {
        next.run(req).await
    } else {
        denial_response(req.headers(), guard.action)
    }
}

pub fn denial_response(headers: &HeaderMap, action: &str) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if accept.contains("html") {
        let body = ACCESS_DENIED_VIEW.replace("{{action}}", action);
        (StatusCode::FORBIDDEN, Html(body)).into_response()
    } else {
        (StatusCode::FORBIDDEN, ACCESS_DENIED_TEXT).into_response()
    }
}

/// Baseline role rules, registered before any route mounts.
pub async fn default_roles(access: Arc<AccessControl>) -> Result<(), AuthError> {
    access.allow_role("manage-platform", "admin");
    // Any authenticated identity may use the platform.
    access.grant("use-platform", |principal| principal.map(|_| true));
    Ok(())
}
