//! Client for the control endpoint

use reqwest::{StatusCode, Url};
use std::net::SocketAddr;

use crate::error::{Error, NetworkError, Result, TrackError};

fn connection_failed(e: reqwest::Error) -> Error {
    NetworkError::ConnectionFailed(e.to_string()).into()
}

/// Talks to a server's `/tracks` and `/stream/{id}` routes
#[derive(Debug, Clone)]
pub struct ControlClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ControlClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid server_url {}: {}", base_url, e)))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    /// Socket address of the control server, used to find which local
    /// interface the server can reach us on.
    pub async fn server_addr(&self) -> Result<SocketAddr> {
        let host = self
            .base_url
            .host_str()
            .ok_or_else(|| Error::Config(format!("server_url has no host: {}", self.base_url)))?;
        let port = self.base_url.port_or_known_default().unwrap_or(80);

        tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| NetworkError::ConnectionFailed(format!("cannot resolve {}", host)).into())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Track display names; index in the list is the track id
    pub async fn list_tracks(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("tracks")?)
            .send()
            .await
            .map_err(connection_failed)?;

        if !response.status().is_success() {
            return Err(NetworkError::ConnectionFailed(format!(
                "GET /tracks returned {}",
                response.status()
            ))
            .into());
        }
        response.json().await.map_err(connection_failed)
    }

    /// Ask the server to stream `track_id` to `destination` (or to its
    /// default peer). Returns the server's confirmation text.
    pub async fn request_stream(
        &self,
        track_id: usize,
        destination: Option<SocketAddr>,
    ) -> Result<String> {
        let mut request = self.http.get(self.url(&format!("stream/{}", track_id))?);
        if let Some(dest) = destination {
            request = request.query(&[("ip", dest.ip().to_string()), ("port", dest.port().to_string())]);
        }

        let response = request.send().await.map_err(connection_failed)?;
        let status = response.status();
        let body = response.text().await.map_err(connection_failed)?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(TrackError::NotFound(track_id).into()),
            s => Err(NetworkError::ConnectionFailed(format!("{}: {}", s, body.trim())).into()),
        }
    }
}
