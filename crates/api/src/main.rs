use std::sync::Arc;

use anyhow::Context as _;

use opsgate_cluster::{BackoffPolicy, SharedState, Supervisor, WorkerError, WorkerId, target_workers};
use opsgate_core::Config;
use opsgate_sessions::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    match std::env::var("LOG_LEVEL").ok().and_then(|raw| raw.parse().ok()) {
        Some(level) => opsgate_observability::init_with_level(level),
        None => opsgate_observability::init(),
    }

    let cfg = Arc::new(Config::from_env().context("loading configuration")?);

    // Shared state is seeded on the controller before any worker starts.
    let shared = SharedState::new();
    shared.cache.initialize([(
        "app.booted_at".to_string(),
        serde_json::json!(chrono::Utc::now().to_rfc3339()),
    )]);

    let count = target_workers(num_cpus::get(), cfg.worker_cap);
    tracing::info!(workers = count, port = cfg.port, "controller starting");

    let (supervisor, handle) = Supervisor::new(BackoffPolicy::default());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown();
        }
    });

    let clustered = count > 1;
    supervisor
        .run(count, move |worker| {
            worker_main(cfg.clone(), shared.clone(), worker, clustered)
        })
        .await;

    Ok(())
}

async fn worker_main(
    cfg: Arc<Config>,
    shared: SharedState,
    worker: WorkerId,
    clustered: bool,
) -> Result<(), WorkerError> {
    // Cross-worker notifications (cache invalidation and friends).
    let events_state = shared.clone();
    tokio::spawn(async move {
        let mut events = events_state.bus.subscribe();
        while let Ok(event) = events.recv().await {
            events_state.handle_event(&event);
        }
    });

    // The session store gates everything below it: the pipeline is only
    // assembled, and the port only opened, once the backend is reachable.
    let store = SessionStore::connect(&cfg)
        .await
        .map_err(|err| WorkerError::Failed(err.to_string()))?;
    tracing::info!(worker = worker.index(), store = ?store.kind(), "session store ready");

    let app = opsgate_api::app::build_app(
        &cfg,
        Arc::new(store),
        shared,
        worker,
        opsgate_api::routes::MODULES,
    )
    .await
    .map_err(|err| WorkerError::Failed(err.to_string()))?;

    opsgate_api::server::serve(app, &cfg, worker, clustered)
        .await
        .map_err(|err| WorkerError::Failed(err.to_string()))
}
