//! Playback controller
//!
//! Owns the playback state and the sink. The transport never touches the
//! state; it only hands a finished [`ReceivedStream`] to [`PlaybackController::play`].
//!
//! ```text
//!            play                pause
//!   Idle ───────────► Playing ─────────► Paused
//!    ▲  ▲               │  ▲  ◄─────────   │
//!    │  │     stop      │  │    resume     │
//!    │  └───────────────┘  │               │
//!    │        stop         │ play          │
//!    └─────────────────────┼───────────────┘
//!                          │
//!         clip ends        │
//!   Playing ─────────► Stopped
//! ```
//!
//! `stop` from Stopped also returns to Idle. Calls that do not apply to the
//! current state are no-ops.

use crate::audio::sink::AudioSink;
use crate::codec::PcmClip;
use crate::error::Result;
use crate::network::receiver::ReceivedStream;

/// Playback lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing loaded
    Idle,
    Playing,
    Paused,
    /// The loaded clip played to its end
    Stopped,
}

/// What is currently loaded
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub channels: u16,
    pub sample_rate: u32,
    pub duration_secs: f32,
}

pub struct PlaybackController<S: AudioSink> {
    sink: S,
    state: PlaybackState,
    now_playing: Option<NowPlaying>,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: PlaybackState::Idle,
            now_playing: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        self.now_playing.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Decode a received stream and start playing it, replacing anything
    /// already loaded. On failure the controller is left Idle.
    pub fn play(&mut self, stream: ReceivedStream) -> Result<()> {
        let clip = stream.decode().map_err(|e| {
            self.stop();
            e
        })?;
        self.play_clip(clip)
    }

    pub fn play_clip(&mut self, clip: PcmClip) -> Result<()> {
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            self.stop();
        }

        let info = NowPlaying {
            channels: clip.channels,
            sample_rate: clip.sample_rate,
            duration_secs: clip.duration_secs(),
        };
        if let Err(e) = self.sink.load(clip) {
            self.state = PlaybackState::Idle;
            self.now_playing = None;
            return Err(e.into());
        }

        tracing::info!("Playback started ({:.1}s)", info.duration_secs);
        self.now_playing = Some(info);
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.sink.pause();
            self.state = PlaybackState::Paused;
            tracing::info!("Playback paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.sink.resume();
            self.state = PlaybackState::Playing;
            tracing::info!("Playback resumed");
        }
    }

    /// Halt output and discard the loaded clip. From Stopped this releases
    /// the finished clip.
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Idle {
            self.sink.stop();
            self.now_playing = None;
            self.state = PlaybackState::Idle;
            tracing::info!("Playback stopped");
        }
    }

    /// Notice a clip that has played to its end
    pub fn poll(&mut self) -> PlaybackState {
        if self.state == PlaybackState::Playing && self.sink.is_finished() {
            tracing::info!("Playback finished");
            self.state = PlaybackState::Stopped;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AudioError, Error};

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<&'static str>,
        loaded: Option<PcmClip>,
        finished: bool,
        fail_load: bool,
    }

    impl AudioSink for RecordingSink {
        fn load(&mut self, clip: PcmClip) -> std::result::Result<(), AudioError> {
            self.calls.push("load");
            if self.fail_load {
                return Err(AudioError::DeviceNotFound("test".into()));
            }
            self.loaded = Some(clip);
            Ok(())
        }
        fn pause(&mut self) {
            self.calls.push("pause");
        }
        fn resume(&mut self) {
            self.calls.push("resume");
        }
        fn stop(&mut self) {
            self.calls.push("stop");
            self.loaded = None;
        }
        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn stream(samples: &[i16]) -> ReceivedStream {
        ReceivedStream {
            header: None,
            buffer: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            frames: 1,
            source: None,
        }
    }

    fn playing() -> PlaybackController<RecordingSink> {
        let mut controller = PlaybackController::new(RecordingSink::default());
        controller.play(stream(&[0, 0, 100, 100])).unwrap();
        controller
    }

    #[test]
    fn test_play_pause_resume() {
        let mut c = playing();
        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(c.now_playing().unwrap().channels, 2);

        c.pause();
        assert_eq!(c.state(), PlaybackState::Paused);
        c.pause();
        assert_eq!(c.state(), PlaybackState::Paused);

        c.resume();
        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(c.sink().calls, vec!["load", "pause", "resume"]);
    }

    #[test]
    fn test_invalid_transitions_are_noops() {
        let mut c = PlaybackController::new(RecordingSink::default());
        c.resume();
        assert_eq!(c.state(), PlaybackState::Idle);
        c.pause();
        assert_eq!(c.state(), PlaybackState::Idle);
        c.stop();
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.sink().calls.is_empty());

        let mut c = playing();
        c.resume();
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stop_then_resume_stays_idle() {
        let mut c = playing();
        c.stop();
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.sink().loaded.is_none());
        assert!(c.now_playing().is_none());

        c.resume();
        assert_eq!(c.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_play_while_paused_restarts() {
        let mut c = playing();
        c.pause();
        c.play(stream(&[1, 1])).unwrap();

        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(c.sink().calls, vec!["load", "pause", "stop", "load"]);
        assert_eq!(c.sink().loaded.as_ref().unwrap().samples.len(), 2);
    }

    #[test]
    fn test_end_of_clip() {
        let mut c = playing();
        assert_eq!(c.poll(), PlaybackState::Playing);

        c.sink.finished = true;
        assert_eq!(c.poll(), PlaybackState::Stopped);

        c.pause();
        c.resume();
        assert_eq!(c.state(), PlaybackState::Stopped);

        c.play(stream(&[5, 5])).unwrap();
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stop_after_end_of_clip_releases_it() {
        let mut c = playing();
        c.sink.finished = true;
        assert_eq!(c.poll(), PlaybackState::Stopped);
        assert!(c.now_playing().is_some());

        c.stop();
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.now_playing().is_none());
        assert!(c.sink().loaded.is_none());
        assert_eq!(c.sink().calls, vec!["load", "stop"]);

        c.stop();
        assert_eq!(c.sink().calls, vec!["load", "stop"]);
    }

    #[test]
    fn test_sink_failure_leaves_idle() {
        let mut c = PlaybackController::new(RecordingSink {
            fail_load: true,
            ..Default::default()
        });
        let err = c.play(stream(&[0, 0])).unwrap_err();
        assert!(matches!(err, Error::Audio(AudioError::DeviceNotFound(_))));
        assert_eq!(c.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_undecodable_stream_is_rejected() {
        let mut c = PlaybackController::new(RecordingSink::default());
        let mut bad = stream(&[0, 0]);
        bad.header = Some(crate::codec::WavHeader {
            format: crate::codec::AudioFormat {
                sample_width: 5,
                ..Default::default()
            },
            data_offset: 0,
            data_len: 4,
        });
        assert!(matches!(c.play(bad), Err(Error::Codec(_))));
        assert_eq!(c.state(), PlaybackState::Idle);
        assert!(c.sink().calls.is_empty());
    }
}
