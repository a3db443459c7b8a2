//! Application assembly: the full middleware pipeline in its mounting order.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_http::compression::CompressionLayer;

use opsgate_auth::{AccessControl, AuthError, Authenticator};
use opsgate_cluster::{SharedState, WorkerId};
use opsgate_core::Config;
use opsgate_sessions::{SessionKey, SessionStore};

use crate::authz;
use crate::context;
use crate::middleware::{self, AuthState, BoundaryState, SessionState};
use crate::routes::{self, RouteContext, RouteModule};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the worker's router: routes first, static assets as the fallback,
/// and the middleware pipeline wrapped around both.
///
/// Layer order in the `ServiceBuilder` is outermost first, mirroring the
/// registration order the pipeline requires. Compression is the one layer
/// outside the fault boundary: the boundary appends plaintext fault chunks
/// to guarded streams, and those must pass through the encoder with the
/// rest of the body.
pub async fn build_app(
    cfg: &Config,
    store: Arc<SessionStore>,
    shared: SharedState,
    worker: WorkerId,
    modules: &[RouteModule],
) -> Result<Router, AuthError> {
    let auth = Arc::new(Authenticator::new());
    let access = Arc::new(AccessControl::new());

    let ctx = RouteContext {
        base_dir: std::env::current_dir().unwrap_or_default(),
        auth: auth.clone(),
        access: access.clone(),
    };
    let routed = routes::mount(&ctx, modules, authz::default_roles).await?;

    // Unmatched paths fall through to static assets, then to the views.
    let assets = ServeDir::new(&cfg.public_dir).fallback(ServeDir::new(&cfg.views_dir));

    let boundary = BoundaryState {
        node_id: context::node_id(worker),
        development: cfg.environment.is_development(),
    };
    let sessions = SessionState {
        store,
        key: SessionKey::new(&cfg.session_secret),
        ttl: Duration::from_secs(cfg.session_ttl_secs),
    };

    Ok(Router::new()
        .merge(routed)
        .fallback_service(assets)
        .layer(
            ServiceBuilder::new()
                .layer(CompressionLayer::new())
                .layer(axum::middleware::from_fn_with_state(
                    boundary,
                    middleware::fault_boundary,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(axum::middleware::from_fn(middleware::method_override))
                .layer(axum::middleware::from_fn_with_state(
                    sessions,
                    middleware::session,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    AuthState { auth: auth.clone() },
                    middleware::authenticate,
                ))
                .layer(axum::middleware::from_fn(middleware::propagate_identity))
                .layer(Extension(access))
                .layer(Extension(auth))
                .layer(Extension(shared)),
        ))
}
