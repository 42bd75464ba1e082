//! HTTP API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

use crate::control::server::AppState;
use crate::error::{Error, NetworkError, TrackError};

const INVALID_TRACK: &str = "Invalid track ID";

/// Receiver address supplied by the client
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub ip: Option<String>,
    pub port: Option<String>,
}

/// List track display names in id order
pub async fn list_tracks(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.list_tracks())
}

/// Start streaming a track to the requesting client
pub async fn start_stream(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> (StatusCode, String) {
    // Anything that is not a plain catalog index is simply an unknown track
    let track_id = match parse_track_id(&track_id) {
        Some(id) if id < state.catalog().len() => id,
        _ => return (StatusCode::NOT_FOUND, INVALID_TRACK.to_string()),
    };

    let requested = match resolve_destination(&query).await {
        Ok(requested) => requested,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.handle(track_id, requested) {
        Ok(ticket) => (
            StatusCode::OK,
            format!(
                "Started streaming track {} via UDP to {}:{}",
                ticket.track.id,
                ticket.destination.ip(),
                ticket.destination.port()
            ),
        ),
        Err(Error::Track(TrackError::NotFound(_))) => {
            (StatusCode::NOT_FOUND, INVALID_TRACK.to_string())
        }
        Err(e @ Error::Network(NetworkError::InvalidDestination(_))) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Decimal digits only; `usize::from_str` alone would also take `+1`.
fn parse_track_id(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// `ip` and `port` must come together. The host may be a literal address or
/// a name.
async fn resolve_destination(query: &StreamQuery) -> Result<Option<SocketAddr>, NetworkError> {
    let (host, port) = match (&query.ip, &query.port) {
        (None, None) => return Ok(None),
        (Some(host), Some(port)) => (host.trim(), port.trim()),
        _ => {
            return Err(NetworkError::InvalidDestination(
                "ip and port must be given together".into(),
            ))
        }
    };

    if host.is_empty() {
        return Err(NetworkError::InvalidDestination("empty ip".into()));
    }
    let port = match port.parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => {
            return Err(NetworkError::InvalidDestination(format!(
                "bad port: {}",
                port
            )))
        }
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Some(SocketAddr::new(ip, port)));
    }

    tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(Some)
        .ok_or_else(|| NetworkError::InvalidDestination(format!("cannot resolve host: {}", host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::control::server::{router, ControlEndpoint};
    use crate::network::sender::StreamSender;
    use crate::tracks::Catalog;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tokio::net::UdpSocket;
    use tower::ServiceExt;

    fn app(paths: Vec<std::path::PathBuf>, default_peer: Option<SocketAddr>) -> axum::Router {
        router(Arc::new(ControlEndpoint::new(
            Catalog::from_paths(paths),
            StreamSender::new(&StreamConfig::standard()).unwrap(),
            default_peer,
        )))
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_list_tracks_json() {
        let app = app(vec!["m/a.wav".into(), "m/b.wav".into()], None);
        let (status, body) = get(app, "/tracks").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names, vec!["a.wav", "b.wav"]);
    }

    #[tokio::test]
    async fn test_out_of_range_sends_nothing() {
        let watcher = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = watcher.local_addr().unwrap();
        let app = app(vec!["m/a.wav".into(), "m/b.wav".into()], Some(addr));

        let uri = format!("/stream/5?ip=127.0.0.1&port={}", addr.port());
        let (status, body) = get(app.clone(), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, INVALID_TRACK.as_bytes());

        let (status, _) = get(app.clone(), "/stream/-1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/stream/+1?ip=127.0.0.1&port={}", addr.port());
        let (status, _) = get(app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let mut buf = [0u8; 16];
        let nothing = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            watcher.recv_from(&mut buf),
        )
        .await;
        assert!(nothing.is_err());
    }

    #[test]
    fn test_parse_track_id() {
        assert_eq!(parse_track_id("0"), Some(0));
        assert_eq!(parse_track_id("12"), Some(12));
        assert_eq!(parse_track_id("+1"), None);
        assert_eq!(parse_track_id(" 1"), None);
        assert_eq!(parse_track_id(""), None);
    }

    #[tokio::test]
    async fn test_bad_addressing_is_400() {
        let app = app(vec!["m/a.wav".into()], None);

        let (status, _) = get(app.clone(), "/stream/0?ip=127.0.0.1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(app.clone(), "/stream/0?ip=127.0.0.1&port=notaport").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(app.clone(), "/stream/0?ip=127.0.0.1&port=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(app.clone(), "/stream/0?ip=&port=5005").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // No query and no default peer
        let (status, _) = get(app, "/stream/0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_streams_listed_track() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        std::fs::write(&a, vec![1u8; 300]).unwrap();
        std::fs::write(&b, vec![2u8; 700]).unwrap();
        let app = app(vec![a, b], None);

        let (_, body) = get(app.clone(), "/tracks").await;
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names[1], "b.wav");

        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (status, body) = get(app, &format!("/stream/1?ip=127.0.0.1&port={}", port)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            format!("Started streaming track 1 via UDP to 127.0.0.1:{}", port)
        );

        let mut buf = [0u8; 2048];
        let (n, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[2u8; 700][..]);
        let (n, _) = listener.recv_from(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
