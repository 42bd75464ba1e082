//! Stream sender
//!
//! Streams one track's file bytes to one destination. Every session binds its
//! own socket and opens its own file handle, so any number of sessions run
//! side by side without sharing state. Delivery is best-effort: nothing is
//! acknowledged or retransmitted.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::codec::Frame;
use crate::config::StreamConfig;
use crate::error::{Error, NetworkError, Result};
use crate::network::udp::bind_sender_socket;
use crate::tracks::Track;

/// Reads a byte source as a sequence of frames: full `max_payload` chunks,
/// a shorter final chunk, then one sentinel.
pub struct FrameReader<R> {
    reader: R,
    max_payload: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_payload: usize) -> Self {
        Self {
            reader,
            max_payload,
            finished: false,
        }
    }

    /// Next frame, or `None` once the sentinel has been produced
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        // A single read may return less than asked for; keep filling so that
        // only the last data frame is short.
        let mut chunk = BytesMut::zeroed(self.max_payload);
        let mut filled = 0;
        while filled < self.max_payload {
            let n = self.reader.read(&mut chunk[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finished = true;
            return Ok(Some(Frame::sentinel()));
        }
        chunk.truncate(filled);
        Ok(Some(Frame::data(chunk.freeze())))
    }
}

/// Outcome of a completed send session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub track_id: usize,
    pub destination: SocketAddr,
    /// Data frames, not counting the sentinel
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

/// Launches send sessions
#[derive(Debug, Clone, Copy)]
pub struct StreamSender {
    max_payload: usize,
}

impl StreamSender {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_payload: config.max_payload,
        })
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Stream `track` to `destination` and return once the sentinel is sent.
    ///
    /// A failure part-way through ends the session without a sentinel; the
    /// receiver is not told.
    pub async fn send(&self, track: &Track, destination: SocketAddr) -> Result<SessionReport> {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session_id, track = track.id, %destination);

        async move {
            let file = tokio::fs::File::open(&track.path).await?;
            let socket = bind_sender_socket(destination)?;
            let mut frames = FrameReader::new(file, self.max_payload);

            tracing::info!("Streaming {} via UDP", track.path.display());

            let mut frames_sent = 0u64;
            let mut bytes_sent = 0u64;
            while let Some(frame) = frames.next_frame().await? {
                socket
                    .send_to(frame.payload(), destination)
                    .await
                    .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

                if frame.is_sentinel() {
                    tracing::debug!("Sent end-of-stream marker");
                } else {
                    frames_sent += 1;
                    bytes_sent += frame.len() as u64;
                    tracing::trace!("Sent {} bytes", frame.len());
                }
            }

            tracing::info!("Finished: {} frames, {} bytes", frames_sent, bytes_sent);

            Ok::<_, Error>(SessionReport {
                session_id,
                track_id: track.id,
                destination,
                frames_sent,
                bytes_sent,
            })
        }
        .instrument(span)
        .await
    }

    /// Run a session on its own task. The caller may drop the handle; the
    /// session runs to completion or failure either way.
    pub fn spawn(&self, track: Track, destination: SocketAddr) -> JoinHandle<Result<SessionReport>> {
        let sender = *self;
        tokio::spawn(async move {
            let result = sender.send(&track, destination).await;
            if let Err(e) = &result {
                tracing::warn!("Stream of track {} to {} aborted: {}", track.id, destination, e);
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::udp::bind_receiver_socket;

    fn sender(max_payload: usize) -> StreamSender {
        StreamSender::new(&StreamConfig { max_payload }).unwrap()
    }

    /// Reader that hands out at most `step` bytes per read
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let end = (self.pos + self.step).min(self.data.len()).min(self.pos + buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..end]);
            self.pos = end;
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_frame_reader_fills_short_reads() {
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut reader = FrameReader::new(
            Trickle {
                data: data.clone(),
                pos: 0,
                step: 7,
            },
            128,
        );

        let mut lens = Vec::new();
        let mut joined = Vec::new();
        while let Some(frame) = reader.next_frame().await.unwrap() {
            lens.push(frame.len());
            joined.extend_from_slice(frame.payload());
        }
        assert_eq!(lens, vec![128, 128, 44, 0]);
        assert_eq!(joined, data);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn test_rejects_payload_smaller_than_header() {
        assert!(StreamSender::new(&StreamConfig { max_payload: 16 }).is_err());
    }

    #[tokio::test]
    async fn test_send_emits_chunks_then_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let source: Vec<u8> = (0..2500u32).map(|i| (i * 7) as u8).collect();
        std::fs::write(&path, &source).unwrap();
        let track = Track {
            id: 0,
            path,
            name: "t.wav".into(),
        };

        let listener = bind_receiver_socket("127.0.0.1:0".parse().unwrap(), 1 << 20).unwrap();
        let destination = listener.local_addr().unwrap();

        let report = sender(1024).send(&track, destination).await.unwrap();
        assert_eq!(report.frames_sent, 3);
        assert_eq!(report.bytes_sent, 2500);

        let mut buf = [0u8; 2048];
        let mut lens = Vec::new();
        let mut received = Vec::new();
        for _ in 0..4 {
            let (n, _) = listener.recv_from(&mut buf).await.unwrap();
            lens.push(n);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(lens, vec![1024, 1024, 452, 0]);
        assert_eq!(received, source);
    }

    #[tokio::test]
    async fn test_missing_file_aborts() {
        let track = Track {
            id: 3,
            path: "/definitely/not/here.wav".into(),
            name: "here.wav".into(),
        };
        let result = sender(1024)
            .spawn(track, "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
