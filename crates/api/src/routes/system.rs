//! Liveness and identity introspection endpoints.

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::context::{PrincipalContext, RequestContext};
use crate::routes::RouteContext;

pub fn register(router: Router, _ctx: &RouteContext) -> Router {
    router
        .route("/health", get(health))
        .route("/whoami", get(whoami))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn whoami(
    principal: Option<Extension<PrincipalContext>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    let node_id = ctx.snapshot().node_id;
    match principal {
        Some(Extension(identity)) => {
            let principal = identity.principal();
            Json(json!({
                "authenticated": true,
                "identifier": principal.identifier.to_string(),
                "name": &principal.name,
                "roles": &principal.roles,
                "node_id": node_id,
            }))
        }
        None => Json(json!({ "authenticated": false, "node_id": node_id })),
    }
}
