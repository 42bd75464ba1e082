//! Audio output module

pub mod device;
pub mod playback;
pub mod sink;

pub use device::{get_output_device, list_output_devices, AudioDevice};
pub use playback::{NowPlaying, PlaybackController, PlaybackState};
pub use sink::{AudioSink, CpalSink};
