//! Datagram framing
//!
//! A frame is exactly one datagram payload. There is no frame header: data
//! frames carry raw track bytes, and a zero-length frame marks end-of-stream.

use bytes::Bytes;

use crate::error::CodecError;

/// One datagram payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Data frame. Callers never pass an empty payload; that is the sentinel.
    pub fn data(payload: Bytes) -> Self {
        debug_assert!(!payload.is_empty(), "data frames are never empty");
        Self { payload }
    }

    /// End-of-stream marker
    pub fn sentinel() -> Self {
        Self {
            payload: Bytes::new(),
        }
    }

    /// Interpret a received datagram
    pub fn from_datagram(datagram: &[u8]) -> Self {
        Self {
            payload: Bytes::copy_from_slice(datagram),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Split `bytes` into consecutive chunks of at most `max_payload` bytes,
/// followed by exactly one sentinel.
pub fn split(bytes: &[u8], max_payload: usize) -> Result<Vec<Frame>, CodecError> {
    if max_payload == 0 {
        return Err(CodecError::InvalidPayloadSize(max_payload));
    }

    let shared = Bytes::copy_from_slice(bytes);
    let mut frames = Vec::with_capacity(bytes.len().div_ceil(max_payload) + 1);
    let mut offset = 0;
    while offset < shared.len() {
        let end = (offset + max_payload).min(shared.len());
        frames.push(Frame::data(shared.slice(offset..end)));
        offset = end;
    }
    frames.push(Frame::sentinel());

    Ok(frames)
}

/// Concatenate data payloads in order, stopping at the first sentinel.
pub fn reassemble<'a, I>(frames: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut out = Vec::new();
    for frame in frames {
        if frame.is_sentinel() {
            break;
        }
        out.extend_from_slice(frame.payload());
    }
    out
}
