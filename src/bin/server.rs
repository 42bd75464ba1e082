//! Track Server
//!
//! Serves the track catalog over HTTP and streams tracks to clients over UDP.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_track_streamer::{
    config::AppConfig,
    control::{ControlEndpoint, ControlServer},
    network::StreamSender,
    tracks::Catalog,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting track server");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    let catalog = Catalog::load_dir(&config.server.music_dir)
        .with_context(|| format!("loading tracks from {}", config.server.music_dir.display()))?;

    println!("\n=== Tracks ===");
    for track in catalog.tracks() {
        println!("  [{}] {}", track.id, track.name);
    }
    println!();

    let sender = StreamSender::new(&config.stream)?;
    tracing::info!("Frame payload size: {} bytes", sender.max_payload());
    match config.server.default_peer {
        Some(peer) => tracing::info!("Default peer: {}", peer),
        None => tracing::info!("No default peer; clients must send ip and port"),
    }

    let endpoint = Arc::new(ControlEndpoint::new(catalog, sender, config.server.default_peer));
    let server = ControlServer::bind(&config.http_bind_addr(), endpoint).await?;
    server.serve().await?;

    Ok(())
}
