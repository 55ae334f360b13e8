//! Daemon wiring — store, change feed, controller and API server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use canary_core::CanarydConfig;
use canary_rollout::feed::{self, DEFAULT_FEED_CAPACITY};
use canary_rollout::{Controller, ControllerContext, Reconciler};
use canary_state::StateStore;

fn open_store(data_dir: Option<&PathBuf>) -> anyhow::Result<StateStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let db_path = dir.join("canaryd.redb");
            let store = StateStore::open(&db_path)?;
            info!(path = ?db_path, "state store opened");
            Ok(store)
        }
        None => {
            warn!("no data directory given, state is kept in memory");
            Ok(StateStore::open_in_memory()?)
        }
    }
}

/// Build the controller described by `config` on top of `store`.
pub fn build_controller(store: &StateStore, config: &CanarydConfig) -> Controller {
    let repo = Arc::new(store.clone());
    let ctx = ControllerContext::from_config(repo.clone(), config);
    info!(
        canary_replicas = ctx.settings.canary_replicas,
        scale_step = ctx.settings.scale_step,
        baseline_floor = ctx.settings.baseline_floor,
        rollback_on_delete = ctx.settings.rollback_on_delete,
        max_attempts = ctx.retry.max_attempts,
        "controller configured"
    );
    Controller::new(Reconciler::new(ctx))
        .with_namespace(config.namespace())
        .with_resync(repo, config.resync_interval_secs().map(Duration::from_secs))
}

pub async fn run_daemon(config: CanarydConfig, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    info!("canaryd starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(data_dir.as_ref())?;
    let controller = build_controller(&store, &config);
    let (feed, feed_rx) = feed::channel(DEFAULT_FEED_CAPACITY);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start controller ───────────────────────────────────────

    let controller_handle = tokio::spawn(controller.run(feed_rx, shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = canary_api::build_router(store, feed);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port()));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_handle = spawn_server(listener, router, shutdown_tx.subscribe());

    supervise(server_handle, controller_handle, shutdown_tx, ctrl_c()).await?;

    info!("canaryd stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never
/// resolves rather than shutting the daemon down.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Serve `router` until the shutdown flag flips.
fn spawn_server(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    })
}

/// Wait for the shutdown signal while watching both tasks. Either task
/// ending before the signal stops the other and fails the daemon.
async fn supervise(
    mut server: JoinHandle<std::io::Result<()>>,
    mut controller: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        _ = signal => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            server.await??;
            if let Err(e) = controller.await {
                warn!(error = %e, "controller task failed during shutdown");
            }
            Ok(())
        }
        joined = &mut controller => {
            let _ = shutdown_tx.send(true);
            match server.await {
                Ok(Err(e)) => warn!(error = %e, "API server failed while stopping"),
                Err(e) => warn!(error = %e, "API server task failed while stopping"),
                Ok(Ok(())) => {}
            }
            match joined {
                Ok(()) => Err(anyhow::anyhow!("controller stopped before shutdown was requested")),
                Err(e) => Err(anyhow::anyhow!("controller task failed: {e}")),
            }
        }
        served = &mut server => {
            let _ = shutdown_tx.send(true);
            if let Err(e) = controller.await {
                warn!(error = %e, "controller task failed during shutdown");
            }
            served??;
            Err(anyhow::anyhow!("API server stopped before shutdown was requested"))
        }
    }
}
