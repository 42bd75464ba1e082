//! Stream receiver
//!
//! Collects one stream's datagrams into a buffer until the empty
//! end-of-stream datagram arrives.
//!
//! ```text
//! Idle ──bind──► Listening ──first frame──► Accumulating ──sentinel──► Complete
//!                    │                          │
//!                    └──── error / timeout ─────┴────────────────────► Aborted
//! ```
//!
//! Payloads are appended in arrival order. Lost or reordered datagrams are
//! not detected, and a lost sentinel leaves the receiver waiting forever
//! unless a receive timeout is configured.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::codec::wav::write_wav_file;
use crate::codec::{AudioFormat, Frame, PcmClip, WavHeader};
use crate::config::ClientConfig;
use crate::constants::{DEFAULT_RECV_BUFFER_SIZE, RECV_DATAGRAM_SIZE};
use crate::error::{CodecError, Error, NetworkError, Result};
use crate::network::udp::bind_receiver_socket;

/// Receiver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Listening,
    Accumulating,
    Complete,
    Aborted,
}

/// A fully received stream, ready for playback
#[derive(Debug, Clone)]
pub struct ReceivedStream {
    /// Header parsed from the first frame, if it carried one
    pub header: Option<WavHeader>,
    /// Every payload byte in arrival order, header included
    pub buffer: Vec<u8>,
    /// Data frames received, not counting the sentinel
    pub frames: u64,
    /// Sender of the first frame
    pub source: Option<SocketAddr>,
}

impl ReceivedStream {
    /// Format from the header, or the headerless default
    pub fn format(&self) -> AudioFormat {
        self.header.map(|h| h.format).unwrap_or_default()
    }

    pub fn decode(&self) -> std::result::Result<PcmClip, CodecError> {
        PcmClip::decode(&self.buffer, self.header.as_ref())
    }

    /// Write the stream to `dir` as `received_<label>_<timestamp>.wav`
    pub fn save(&self, dir: &Path, label: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S%.3f");
        let path = dir.join(format!("received_{}_{}.wav", label, stamp));
        write_wav_file(&path, &self.buffer, self.header.as_ref(), self.format())?;
        Ok(path)
    }
}

/// Client-side receiver for a single stream
pub struct StreamReceiver {
    listen_addr: SocketAddr,
    recv_buffer_size: usize,
    timeout: Option<Duration>,
    state: ReceiverState,
    socket: Option<UdpSocket>,
    datagram: Vec<u8>,
    header: Option<WavHeader>,
    buffer: Vec<u8>,
    frames: u64,
    source: Option<SocketAddr>,
    completed: Option<ReceivedStream>,
}

impl StreamReceiver {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            timeout: None,
            state: ReceiverState::Idle,
            socket: None,
            datagram: vec![0u8; RECV_DATAGRAM_SIZE],
            header: None,
            buffer: Vec::new(),
            frames: 0,
            source: None,
            completed: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.listen_addr())
            .with_recv_buffer_size(config.recv_buffer_size)
            .with_timeout(config.receive_timeout())
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Abort with [`NetworkError::Timeout`] when no datagram arrives for
    /// `timeout`. Without it, a lost sentinel blocks forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Bound address; differs from the configured one when port 0 was asked
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Idle → Listening
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }
        if self.state != ReceiverState::Idle {
            return Err(NetworkError::NotListening.into());
        }

        let socket = bind_receiver_socket(self.listen_addr, self.recv_buffer_size)?;
        let local = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        self.socket = Some(socket);
        self.state = ReceiverState::Listening;
        tracing::info!("Listening for UDP frames on {}", local);
        Ok(local)
    }

    /// Wait for one datagram and apply it. Returns the state afterwards.
    pub async fn step(&mut self) -> Result<ReceiverState> {
        match self.state {
            ReceiverState::Listening | ReceiverState::Accumulating => {}
            ReceiverState::Complete | ReceiverState::Aborted => return Ok(self.state),
            ReceiverState::Idle => return Err(NetworkError::NotListening.into()),
        }

        let (len, from) = match self.recv_datagram().await {
            Ok(received) => received,
            Err(e) => return Err(self.abort(e)),
        };
        let frame = Frame::from_datagram(&self.datagram[..len]);

        if frame.is_sentinel() {
            tracing::info!(
                "Received end-of-stream marker after {} frames, {} bytes",
                self.frames,
                self.buffer.len()
            );
            self.complete();
            return Ok(self.state);
        }

        if self.state == ReceiverState::Listening {
            if WavHeader::is_riff(frame.payload()) {
                match WavHeader::parse(frame.payload()) {
                    Ok(header) => {
                        tracing::info!(
                            "Stream format: {} ch, {} bytes/sample, {} Hz",
                            header.format.channels,
                            header.format.sample_width,
                            header.format.sample_rate
                        );
                        self.header = Some(header);
                    }
                    Err(e) => return Err(self.abort(e.into())),
                }
            } else {
                tracing::debug!("First frame has no WAV header; assuming raw PCM");
            }
            self.source = Some(from);
            self.state = ReceiverState::Accumulating;
        }

        tracing::trace!("Received {} bytes from {}", len, from);
        self.buffer.extend_from_slice(frame.payload());
        self.frames += 1;
        Ok(self.state)
    }

    /// Hand over the finished stream. Yields it exactly once, and only in
    /// the Complete state.
    pub fn take_stream(&mut self) -> Option<ReceivedStream> {
        self.completed.take()
    }

    /// Bind if needed, then run until the sentinel arrives
    pub async fn receive(mut self) -> Result<ReceivedStream> {
        if self.state == ReceiverState::Idle {
            self.bind().await?;
        }
        while self.step().await? != ReceiverState::Complete {
            if self.state == ReceiverState::Aborted {
                return Err(NetworkError::NotListening.into());
            }
        }
        self.take_stream()
            .ok_or_else(|| NetworkError::ReceiveFailed("stream already taken".into()).into())
    }

    async fn recv_datagram(&mut self) -> Result<(usize, SocketAddr)> {
        let socket = self.socket.as_ref().ok_or(NetworkError::NotListening)?;
        let recv = socket.recv_from(&mut self.datagram);

        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| NetworkError::Timeout)?,
            None => recv.await,
        };
        received.map_err(|e| NetworkError::ReceiveFailed(e.to_string()).into())
    }

    fn complete(&mut self) {
        self.socket = None;
        self.state = ReceiverState::Complete;
        self.completed = Some(ReceivedStream {
            header: self.header.take(),
            buffer: std::mem::take(&mut self.buffer),
            frames: self.frames,
            source: self.source,
        });
    }

    fn abort(&mut self, error: Error) -> Error {
        tracing::warn!("Receive aborted after {} frames: {}", self.frames, error);
        self.socket = None;
        self.buffer = Vec::new();
        self.header = None;
        self.state = ReceiverState::Aborted;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::wav::wav_bytes;

    async fn bound() -> (StreamReceiver, UdpSocket, SocketAddr) {
        let mut receiver = StreamReceiver::new("127.0.0.1:0".parse().unwrap());
        assert_eq!(receiver.state(), ReceiverState::Idle);
        let addr = receiver.bind().await.unwrap();
        assert_eq!(receiver.state(), ReceiverState::Listening);
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (receiver, peer, addr)
    }

    #[tokio::test]
    async fn test_header_chunks_sentinel() {
        let (mut receiver, peer, addr) = bound().await;
        let wav = wav_bytes(2, 44_100, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let (header, body) = wav.split_at(44);
        let (chunk1, chunk2) = body.split_at(8);

        peer.send_to(header, addr).await.unwrap();
        assert_eq!(receiver.step().await.unwrap(), ReceiverState::Accumulating);
        peer.send_to(chunk1, addr).await.unwrap();
        assert_eq!(receiver.step().await.unwrap(), ReceiverState::Accumulating);
        peer.send_to(chunk2, addr).await.unwrap();
        assert_eq!(receiver.step().await.unwrap(), ReceiverState::Accumulating);
        peer.send_to(&[], addr).await.unwrap();
        assert_eq!(receiver.step().await.unwrap(), ReceiverState::Complete);
        assert!(receiver.local_addr().is_none());

        let stream = receiver.take_stream().unwrap();
        assert_eq!(stream.buffer, wav);
        assert_eq!(stream.frames, 3);
        assert_eq!(stream.header.unwrap().format.channels, 2);
        assert!(receiver.take_stream().is_none());

        let clip = stream.decode().unwrap();
        assert_eq!(clip.frames(), 4);
    }

    #[tokio::test]
    async fn test_headerless_stream() {
        let (receiver, peer, addr) = bound().await;
        let task = tokio::spawn(receiver.receive());

        peer.send_to(&[0u8; 100], addr).await.unwrap();
        peer.send_to(&[1u8; 20], addr).await.unwrap();
        peer.send_to(&[], addr).await.unwrap();

        let stream = task.await.unwrap().unwrap();
        assert!(stream.header.is_none());
        assert_eq!(stream.buffer.len(), 120);
        assert_eq!(stream.format(), AudioFormat::default());
    }

    #[tokio::test]
    async fn test_immediate_sentinel() {
        let (mut receiver, peer, addr) = bound().await;
        peer.send_to(&[], addr).await.unwrap();
        assert_eq!(receiver.step().await.unwrap(), ReceiverState::Complete);
        assert!(receiver.take_stream().unwrap().buffer.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_header_aborts() {
        let (mut receiver, peer, addr) = bound().await;
        let mut wav = wav_bytes(2, 44_100, &[0; 8]);
        wav[8..12].copy_from_slice(b"AVI ");

        peer.send_to(&wav, addr).await.unwrap();
        let err = receiver.step().await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::MalformedHeader(_))));
        assert_eq!(receiver.state(), ReceiverState::Aborted);
        assert!(receiver.take_stream().is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let (first, _peer, addr) = bound().await;
        let mut second = StreamReceiver::new(addr);
        let err = second.bind().await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::BindFailed(_))));
        assert_eq!(second.state(), ReceiverState::Idle);
        drop(first);
    }

    #[tokio::test]
    async fn test_timeout_aborts() {
        let mut receiver = StreamReceiver::new("127.0.0.1:0".parse().unwrap())
            .with_timeout(Some(Duration::from_millis(50)));
        receiver.bind().await.unwrap();

        let err = receiver.step().await.unwrap_err();
        assert!(matches!(err, Error::Network(NetworkError::Timeout)));
        assert_eq!(receiver.state(), ReceiverState::Aborted);
    }

    #[tokio::test]
    async fn test_step_before_bind() {
        let mut receiver = StreamReceiver::new("127.0.0.1:0".parse().unwrap());
        assert!(receiver.step().await.is_err());
    }

    #[tokio::test]
    async fn test_save_received_stream() {
        let dir = tempfile::tempdir().unwrap();
        let stream = ReceivedStream {
            header: None,
            buffer: vec![0u8; 16],
            frames: 1,
            source: None,
        };
        let path = stream.save(&dir.path().join("saved"), "track_0").unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("received_track_0_"));

        let written = std::fs::read(&path).unwrap();
        let header = WavHeader::parse(&written).unwrap();
        assert_eq!(header.data_len, 16);
    }
}
