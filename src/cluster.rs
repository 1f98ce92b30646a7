//! Serving topology: a primary thread that owns the listening socket and a
//! set of worker threads, each running its own single-threaded runtime with
//! its own connection pool. All workers accept from the same kernel socket,
//! so the kernel spreads incoming connections across them; no state is
//! shared between workers. The primary respawns any worker that dies and
//! coordinates graceful shutdown on SIGINT/SIGTERM.

use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::api;
use crate::config::Config;
use crate::db;
use crate::db::schema;
use crate::state::AppState;

/// Run the serving shell to completion. Returns once every worker has
/// drained and exited after a shutdown signal.
pub fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let worker_count = if config.cluster_workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        config.cluster_workers
    };

    // Schema setup happens once, before any worker serves traffic.
    bootstrap(&config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .with_context(|| format!("failed to bind {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to set listener non-blocking")?;
    tracing::info!(%addr, workers = worker_count, "listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (exit_tx, exit_rx) = std_mpsc::channel::<usize>();

    for index in 0..worker_count {
        spawn_worker(
            index,
            config.clone(),
            &listener,
            shutdown_rx.clone(),
            exit_tx.clone(),
        )?;
    }

    // Signal watcher owns the shutdown sender; workers see the flip through
    // their receivers. The thread parks afterwards so the channel stays
    // open (dropping the sender would read as shutdown to every worker).
    std::thread::Builder::new()
        .name("abr-signals".to_string())
        .spawn(move || {
            match wait_for_signal() {
                Ok(()) => {
                    tracing::info!("shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
                Err(err) => tracing::error!("signal watcher failed: {err:#}"),
            }
            loop {
                std::thread::park();
            }
        })
        .context("failed to spawn signal watcher")?;

    // Monitor workers: respawn crashes, count down exits during shutdown.
    let mut alive = worker_count;
    while alive > 0 {
        let index = exit_rx
            .recv()
            .context("all worker handles dropped unexpectedly")?;
        if *shutdown_rx.borrow() {
            alive -= 1;
            tracing::info!(worker = index, remaining = alive, "worker exited");
        } else {
            tracing::warn!(worker = index, "worker died, respawning");
            spawn_worker(
                index,
                config.clone(),
                &listener,
                shutdown_rx.clone(),
                exit_tx.clone(),
            )?;
        }
    }

    tracing::info!("all workers drained, exiting");
    Ok(())
}

/// One-time startup work: apply the schema through a short-lived pool.
fn bootstrap(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build bootstrap runtime")?;
    runtime.block_on(async {
        let pool = db::serving_pool(&config.database).await?;
        schema::migrate(&pool)
            .await
            .context("schema migration failed")?;
        pool.close().await;
        Ok::<_, anyhow::Error>(())
    })?;
    tracing::info!("schema ready");
    Ok(())
}

fn spawn_worker(
    index: usize,
    config: Arc<Config>,
    listener: &TcpListener,
    shutdown_rx: watch::Receiver<bool>,
    exit_tx: std_mpsc::Sender<usize>,
) -> Result<()> {
    let listener = listener
        .try_clone()
        .context("failed to clone listener for worker")?;

    std::thread::Builder::new()
        .name(format!("abr-worker-{index}"))
        .spawn(move || {
            if let Err(err) = worker_main(index, config, listener, shutdown_rx) {
                tracing::error!(worker = index, "worker failed: {err:#}");
            }
            let _ = exit_tx.send(index);
        })
        .with_context(|| format!("failed to spawn worker {index}"))?;
    Ok(())
}

/// Worker body: own runtime, own pool, shared socket. On shutdown the
/// server stops accepting, drains in-flight requests, then the pool closes.
fn worker_main(
    index: usize,
    config: Arc<Config>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build worker runtime")?;

    runtime.block_on(async move {
        let state = AppState::new(config).await.map_err(|err| {
            anyhow::anyhow!("worker {index} failed to connect store: {err}")
        })?;
        let app = api::router(state.clone());

        let listener = tokio::net::TcpListener::from_std(listener)
            .context("failed to adopt listener into runtime")?;

        tracing::info!(worker = index, "worker serving");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                // Completes on signal or if the primary goes away.
                let _ = shutdown_rx.changed().await;
            })
            .await
            .context("serve failed")?;

        state.repository.close().await;
        tracing::info!(worker = index, "worker pool closed");
        Ok(())
    })
}

fn wait_for_signal() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime.block_on(async {
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .context("failed to install SIGTERM handler")?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => result.context("ctrl-c handler failed")?,
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("ctrl-c handler failed")?;
        }
        Ok(())
    })
}
