//! Skyhook daemon entry point.
//!
//! Publishes `{fqdn -> ip}` records into etcd for healthy network-service
//! containers on this host and removes them when the containers die.

use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod bootstrap;
mod config;
mod dispatch;
mod error;
mod mapper;
mod reconciler;
mod runtime;
mod store;
#[cfg(test)]
mod testing;
mod types;

use config::Config;
use dispatch::{receive, watch, Dispatcher};
use reconciler::{Reconciler, Settings};
use runtime::{ContainerRuntime, DockerRuntime};
use store::{EtcdStore, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting skyhook with config: {:?}", cfg);

    // Clients; nothing useful can happen without both
    let store: Arc<dyn RecordStore> = Arc::new(
        EtcdStore::connect(&cfg.etcd_endpoint)
            .await
            .context("Setup of etcd client failed")?,
    );
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(
        DockerRuntime::connect(cfg.docker_endpoint.as_deref())
            .context("Setup of docker client failed")?,
    );

    let reconciler = Arc::new(Reconciler::new(runtime, store, Settings::from(&cfg)));
    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(reconciler, cfg.max_in_flight, shutdown.clone());

    // Event channel
    let (event_tx, event_rx) = mpsc::channel(cfg.event_buffer);

    // Bootstrap scan and event stream
    let watch_handle = tokio::spawn(watch(dispatcher.clone(), event_tx, shutdown.clone()));

    // Process incoming events
    let receive_handle = tokio::spawn(receive(dispatcher.clone(), event_rx, shutdown.clone()));

    // Graceful Shutdown
    wait_for_signal().await;
    shutdown.cancel();

    if let Err(e) = watch_handle.await {
        error!("Watcher task failed: {}", e);
    }
    if let Err(e) = receive_handle.await {
        error!("Receiver task failed: {}", e);
    }
    dispatcher.drain(cfg.shutdown_grace()).await;

    info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut term = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("Unable to listen for SIGTERM: {}", e);
            return wait_for_ctrl_c().await;
        }
    };
    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = term.recv() => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }
}
