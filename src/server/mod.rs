//! Daemon bootstrap and accept loop.
//!
//! [`run`] wires the storage handle, telemetry pipeline, and listener
//! together, then services connections until a termination signal
//! arrives. The pieces are exposed separately so integration tests can
//! bind an ephemeral port and drive a real server in-process.

pub mod cli;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub use cli::Cli;

use crate::config::Settings;
use crate::db::Store;
use crate::handler::Broker;
use crate::telemetry::{self, IlpSink, MetricSink, MongoSink};

/// Bind the configured port and run the broker until shutdown.
///
/// # Errors
/// Returns any failure binding the listener, connecting the store, or
/// accepting connections.
pub async fn run(settings: Settings) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .with_context(|| format!("error binding port {}", settings.port))?;
    info!("docd listening on {}", listener.local_addr()?);
    serve(listener, settings).await
}

/// Run the broker on an already bound listener.
///
/// # Errors
/// Returns any failure connecting the store or running the accept loop.
pub async fn serve(listener: TcpListener, settings: Settings) -> Result<()> {
    let store = Store::connect(&settings)
        .await
        .context("error connecting to the backing store")?;
    store.ensure_history_indices().await;

    let sink: Box<dyn MetricSink> = match settings.ilp.clone() {
        Some(ilp) => Box::new(IlpSink::new(ilp)),
        None => Box::new(MongoSink::new(&store, &settings.metrics.namespace())),
    };
    let (collector, telemetry_worker) = telemetry::spawn(&settings.metrics, sink);
    let broker = Arc::new(Broker::new(store, collector));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut join_set = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("TCP service started");
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    spawn_session(socket, peer, Arc::clone(&broker), &shutdown_rx, &mut join_set);
                }
                Err(error) => warn!("accept error: {error}"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(result) = join_set.join_next().await {
        if let Err(error) = result {
            warn!("task error: {error}");
        }
    }

    // The broker holds the last collector clone; dropping it closes the
    // queue so the worker performs its final flush and exits.
    drop(broker);
    if let Err(error) = telemetry_worker.await {
        warn!("telemetry worker error: {error}");
    }
    info!("TCP service stopped");
    Ok(())
}

fn spawn_session(
    socket: TcpStream,
    peer: SocketAddr,
    broker: Arc<Broker>,
    shutdown_rx: &watch::Receiver<bool>,
    join_set: &mut JoinSet<()>,
) {
    let mut shutdown = shutdown_rx.clone();
    join_set.spawn(async move {
        if let Err(error) = session::serve(broker, socket, peer, &mut shutdown).await {
            warn!("connection error from {peer}: {error}");
        }
    });
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(error) = result {
                            warn!("failed to listen for Ctrl-C: {error}");
                        }
                    },
                    _ = term.recv() => {},
                }
            }
            Err(error) => {
                warn!("failed to install SIGTERM handler: {error}");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {error}");
    }
}
