mod config;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agrilink_core::SnapshotStore;
use agrilink_server::{FileSnapshotStore, MqttTransport, StationServer};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,agrilink_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("AgriLink station starting...");

    let config = Config::from_env()?;
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(&config.snapshot_path));

    let (transport_tx, transport_rx) = mpsc::channel(256);

    let server = StationServer::new(
        transport_tx,
        Some(snapshots.clone()),
        config.snapshot_interval(),
    );
    let handle = server.handle();

    let transport = MqttTransport::new(
        config.mqtt_settings(),
        handle.event_sender(),
        transport_rx,
    );

    let server_handle = tokio::spawn(server.run());
    let transport_handle = tokio::spawn(transport.run());

    tracing::info!(
        "AgriLink station ready, broker {}:{}, snapshots in {}",
        config.mqtt_host,
        config.mqtt_port,
        config.snapshot_path
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = server_handle => {
            tracing::warn!("Station server stopped");
        }
        _ = transport_handle => {
            tracing::warn!("MQTT transport stopped");
        }
    }

    // Final snapshot so a restart picks up where we left off.
    let snapshot = handle.snapshot().await;
    if let Err(e) = snapshots.save(&snapshot) {
        tracing::error!("Final snapshot save failed: {e}");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
