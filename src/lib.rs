//! # UDP Track Streamer
//!
//! Best-effort streaming of a server-hosted catalog of WAV tracks to clients
//! over UDP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              SERVER                                  │
//! │  ┌──────────────────┐        ┌───────────────────────────────────┐   │
//! │  │ Catalog          │◄───────│ Control Endpoint (control::server)│   │
//! │  │ (tracks::catalog)│        │  GET /tracks   GET /stream/{id}   │   │
//! │  └──────────────────┘        └─────────────────┬─────────────────┘   │
//! │                                                │ spawn per request   │
//! │                    ┌───────────────────────────┼──────────────┐      │
//! │                    ▼                           ▼              ▼      │
//! │             ┌─────────────┐             ┌─────────────┐              │
//! │             │StreamSender │             │StreamSender │    ...       │
//! │             │ own socket  │             │ own socket  │              │
//! │             └──────┬──────┘             └──────┬──────┘              │
//! │                    │ [chunk][chunk]..[chunk][ ] (empty = end)        │
//! └────────────────────┼───────────────────────────┼─────────────────────┘
//!                      │ UDP                       │ UDP
//!                      ▼                           ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              CLIENT                                  │
//! │  ┌──────────────────────┐   ┌──────────────────────────────────┐     │
//! │  │ StreamReceiver       │──►│ PlaybackController ──► AudioSink │     │
//! │  │ Idle→Listening→      │   │ Idle / Playing / Paused / Stopped│     │
//! │  │ Accumulating→Complete│   └──────────────────────────────────┘     │
//! │  └──────────────────────┘                                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames carry raw file bytes with no header of their own; the first frame
//! conventionally begins with the track's WAV header. There are no sequence
//! numbers, so loss and reordering pass through unnoticed.

pub mod audio;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod network;
pub mod tracks;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default HTTP port for the control endpoint
    pub const DEFAULT_HTTP_PORT: u16 = 5000;

    /// Default UDP port the client receives on
    pub const DEFAULT_UDP_PORT: u16 = 5005;

    /// Frame payload size for the standard profile
    pub const STANDARD_MAX_PAYLOAD: usize = 1024;

    /// Frame payload size for the large profile
    pub const LARGE_MAX_PAYLOAD: usize = 4096;

    /// Largest payload a single UDP/IPv4 datagram can carry
    pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

    /// Size of the canonical RIFF/WAVE header
    pub const WAV_HEADER_LEN: usize = 44;

    /// Receive-side datagram buffer; large enough for any profile
    pub const RECV_DATAGRAM_SIZE: usize = 65_536;

    /// Kernel socket receive buffer requested by the client
    pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4 * 1024 * 1024;

    /// Format assumed for a stream whose first frame has no WAV header
    pub const DEFAULT_CHANNELS: u16 = 2;
    pub const DEFAULT_SAMPLE_WIDTH: u16 = 2;
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
}
