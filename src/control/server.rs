//! Control endpoint and its HTTP server

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::control::handlers;
use crate::error::{NetworkError, Result};
use crate::network::sender::{SessionReport, StreamSender};
use crate::tracks::{Catalog, Track};

/// A stream that has been started
pub struct StreamTicket {
    pub track: Track,
    pub destination: SocketAddr,
    /// Handle to the send task. Dropping it does not stop the session.
    pub session: JoinHandle<Result<SessionReport>>,
}

/// Validates stream requests and launches senders
pub struct ControlEndpoint {
    catalog: Arc<Catalog>,
    sender: StreamSender,
    default_peer: Option<SocketAddr>,
}

impl ControlEndpoint {
    pub fn new(catalog: Catalog, sender: StreamSender, default_peer: Option<SocketAddr>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            sender,
            default_peer,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Display names in track id order
    pub fn list_tracks(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Start streaming `track_id` to `requested`, or to the default peer when
    /// the request names no destination. Returns without waiting for the
    /// transfer. Nothing is spawned when the track id is out of range.
    pub fn handle(&self, track_id: usize, requested: Option<SocketAddr>) -> Result<StreamTicket> {
        let track = self.catalog.get(track_id)?.clone();
        let destination = requested.or(self.default_peer).ok_or_else(|| {
            NetworkError::InvalidDestination(
                "no ip/port given and no default peer configured".into(),
            )
        })?;

        tracing::info!("Starting stream of track {} ({}) to {}", track.id, track.name, destination);
        let session = self.sender.spawn(track.clone(), destination);

        Ok(StreamTicket {
            track,
            destination,
            session,
        })
    }
}

/// Shared handler state
pub type AppState = Arc<ControlEndpoint>;

/// HTTP routes of the control plane
pub fn router(endpoint: AppState) -> Router {
    Router::new()
        .route("/tracks", get(handlers::list_tracks))
        .route("/stream/:track_id", get(handlers::start_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(endpoint)
}

/// Control endpoint HTTP server
pub struct ControlServer {
    listener: TcpListener,
    endpoint: AppState,
}

impl ControlServer {
    pub async fn bind(addr: &str, endpoint: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        Ok(Self { listener, endpoint })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits
    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!("Control endpoint listening on http://{}", addr);
        axum::serve(self.listener, router(self.endpoint).into_make_service()).await?;
        Ok(())
    }

    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let result = self.serve().await;
            if let Err(e) = &result {
                tracing::error!("Control server stopped: {}", e);
            }
            result
        })
    }
}
