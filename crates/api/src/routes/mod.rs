//! Route modules and the mounting sequence.
//!
//! Each module owns its endpoints and registers them against a shared
//! [`RouteContext`]. Mounting is explicitly ordered and strictly after role
//! initialization, so no guarded route is ever reachable before the rules it
//! guards with exist.

pub mod account;
pub mod system;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

use opsgate_auth::{AccessControl, AuthError, Authenticator};

/// Everything a route module gets to work with: where the application lives
/// on disk, the authenticator, and the shared access-control handle.
#[derive(Clone)]
pub struct RouteContext {
    pub base_dir: PathBuf,
    pub auth: Arc<Authenticator>,
    pub access: Arc<AccessControl>,
}

pub type Registrar = fn(Router, &RouteContext) -> Router;

#[derive(Copy, Clone)]
pub struct RouteModule {
    pub name: &'static str,
    pub register: Registrar,
}

/// Route modules mounted at startup, in order.
pub const MODULES: &[RouteModule] = &[
    RouteModule {
        name: "system",
        register: system::register,
    },
    RouteModule {
        name: "account",
        register: account::register,
    },
];

/// Run role initialization to completion, then mount every module.
pub async fn mount<Fut>(
    ctx: &RouteContext,
    modules: &[RouteModule],
    init_roles: impl FnOnce(Arc<AccessControl>) -> Fut,
) -> Result<Router, AuthError>
where
    Fut: Future<Output = Result<(), AuthError>>,
{
    init_roles(ctx.access.clone()).await?;

    let mut router = Router::new();
    for module in modules {
        tracing::debug!(module = module.name, "mounting route module");
        router = (module.register)(router, ctx);
    }
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn role_init_failure_prevents_mounting() {
        let ctx = RouteContext {
            base_dir: PathBuf::new(),
            auth: Arc::new(Authenticator::new()),
            access: Arc::new(AccessControl::new()),
        };

        let result = mount(&ctx, MODULES, |_access| async {
            Err(AuthError::Codec(serde_json::from_str::<i32>("x").unwrap_err()))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn all_modules_mount_after_role_init() {
        let ctx = RouteContext {
            base_dir: PathBuf::new(),
            auth: Arc::new(Authenticator::new()),
            access: Arc::new(AccessControl::new()),
        };
        let access = ctx.access.clone();

        let router = mount(&ctx, MODULES, move |a| async move {
            a.allow_role("manage-platform", "admin");
            Ok(())
        })
        .await;
        assert!(router.is_ok());

        // Rules registered during init are live once mount returns.
        assert!(!access.can(None, "manage-platform"));
    }
}
