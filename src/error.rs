//! Error types for the track streamer

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Frame and container errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// The first frame looked like a WAV header but could not be parsed
    #[error("Malformed audio header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Invalid payload size: {0}")]
    InvalidPayloadSize(usize),

    #[error("WAV write failed: {0}")]
    WriteFailed(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Receiver is not listening")]
    NotListening,

    #[error("Timeout")]
    Timeout,
}

/// Catalog errors
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Track not found: {0}")]
    NotFound(usize),

    #[error("Music directory unavailable: {0}")]
    LibraryUnavailable(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
