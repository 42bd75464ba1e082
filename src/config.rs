//! Application configuration
//!
//! Loaded from TOML. Every section has defaults matching a single-host LAN
//! setup, so an empty file (or no file at all) yields a working config.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration shared by both binaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub stream: StreamConfig,
}

/// Control endpoint and catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
    /// Directory scanned for `.wav` tracks at startup
    pub music_dir: PathBuf,
    /// Destination used when a stream request carries no `ip`/`port`
    pub default_peer: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            music_dir: PathBuf::from("music"),
            default_peer: None,
        }
    }
}

/// Client-side receiver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the control endpoint
    pub server_url: String,
    /// Local address the stream receiver binds to
    pub listen_address: IpAddr,
    /// Local UDP port the stream receiver binds to
    pub udp_port: u16,
    /// Address advertised to the server; resolved from the route to the
    /// server when unset
    pub advertise_ip: Option<IpAddr>,
    /// Abort a receive after this long without a datagram
    pub receive_timeout_ms: Option<u64>,
    /// Save every completed stream here as a WAV file
    pub save_dir: Option<PathBuf>,
    /// Kernel receive buffer requested for the UDP socket
    pub recv_buffer_size: usize,
    /// Output device name; the host default when unset
    pub output_device: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://127.0.0.1:{}", DEFAULT_HTTP_PORT),
            listen_address: IpAddr::from([0, 0, 0, 0]),
            udp_port: DEFAULT_UDP_PORT,
            advertise_ip: None,
            receive_timeout_ms: None,
            save_dir: None,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            output_device: None,
        }
    }
}

impl ClientConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.udp_port)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

/// Data-plane framing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest datagram payload the sender emits
    pub max_payload: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_payload: STANDARD_MAX_PAYLOAD,
        }
    }
}

impl StreamConfig {
    /// Standard 1024-byte frames
    pub fn standard() -> Self {
        Self::default()
    }

    /// 4096-byte frames for fewer datagrams per track
    pub fn large() -> Self {
        Self {
            max_payload: LARGE_MAX_PAYLOAD,
        }
    }

    /// The first frame must hold the whole WAV header, and no frame may
    /// exceed what a single UDP datagram can carry.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload <= WAV_HEADER_LEN || self.max_payload > MAX_DATAGRAM_PAYLOAD {
            return Err(Error::Config(format!(
                "max_payload must be in {}..={}, got {}",
                WAV_HEADER_LEN + 1,
                MAX_DATAGRAM_PAYLOAD,
                self.max_payload
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load from an explicit path, else from the platform config directory,
    /// else fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// `<config dir>/udp-track-streamer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "udp-track-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        if self.client.recv_buffer_size == 0 {
            return Err(Error::Config("recv_buffer_size must be positive".into()));
        }
        Ok(())
    }

    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.http_port)
    }
}
