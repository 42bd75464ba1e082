//! Data-plane framing and audio container handling
//!
//! `frame` chunks raw track bytes into datagram payloads and defines the
//! end-of-stream sentinel; `wav` reads the header carried by the first frame
//! and turns reassembled bytes into playable samples.

pub mod frame;
pub mod wav;

pub use frame::{reassemble, split, Frame};
pub use wav::{AudioFormat, PcmClip, SampleFormat, WavHeader};
