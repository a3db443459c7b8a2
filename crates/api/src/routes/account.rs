//! Login, logout, and the admin-guarded status endpoint.

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use opsgate_auth::{Authenticator, Principal, Role};
use opsgate_cluster::SharedState;
use opsgate_core::UserId;
use opsgate_sessions::Session;

use crate::authz::{Guard, require_action};
use crate::context::PrincipalContext;
use crate::errors::ApiError;
use crate::routes::RouteContext;

#[derive(Debug, Deserialize)]
struct LoginRequest {
    name: String,
    #[serde(default)]
    roles: Vec<String>,
}

pub fn register(router: Router, ctx: &RouteContext) -> Router {
    let admin = Guard {
        access: ctx.access.clone(),
        action: "manage-platform",
    };
    let platform = Guard {
        access: ctx.access.clone(),
        action: "use-platform",
    };

    router
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route(
            "/account/profile",
            get(profile)
                .layer(axum::middleware::from_fn_with_state(platform, require_action)),
        )
        .route(
            "/admin/status",
            get(admin_status)
                .layer(axum::middleware::from_fn_with_state(admin, require_action)),
        )
}

async fn login(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<Arc<Authenticator>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let principal = Principal::new(
        UserId::new(),
        body.name,
        body.roles.into_iter().map(Role::new).collect(),
    );
    auth.sign_in(&session, &principal)
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "identifier": principal.identifier.to_string(),
    })))
}

async fn logout(
    Extension(session): Extension<Session>,
    Extension(auth): Extension<Arc<Authenticator>>,
) -> impl IntoResponse {
    auth.sign_out(&session);
    Json(json!({ "ok": true }))
}

// The use-platform guard only admits authenticated identities, so the
// extension is always present here.
async fn profile(Extension(identity): Extension<PrincipalContext>) -> impl IntoResponse {
    let principal = identity.principal();
    Json(json!({
        "identifier": principal.identifier.to_string(),
        "name": &principal.name,
        "roles": &principal.roles,
    }))
}

async fn admin_status(Extension(state): Extension<SharedState>) -> impl IntoResponse {
    Json(json!({ "cache_entries": state.cache.len() }))
}
