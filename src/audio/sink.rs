//! Audio output sinks
//!
//! [`CpalSink`] plays a decoded clip on an output device. The cpal stream is
//! owned by a dedicated thread, so the sink itself is `Send` and can live
//! wherever the playback controller lives.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{get_output_device, AudioDevice};
use crate::codec::PcmClip;
use crate::error::AudioError;

/// Something that can output a decoded clip
pub trait AudioSink {
    /// Replace whatever is loaded with `clip` and start output
    fn load(&mut self, clip: PcmClip) -> Result<(), AudioError>;

    /// Suspend output, keeping the position
    fn pause(&mut self);

    /// Continue from the paused position
    fn resume(&mut self);

    /// Halt output and drop the clip
    fn stop(&mut self);

    /// Whether the loaded clip has played to its end
    fn is_finished(&self) -> bool;
}

/// Read position into the clip being played
struct PlaybackCursor {
    samples: Vec<f32>,
    position: usize,
}

impl PlaybackCursor {
    fn finished(&self) -> bool {
        self.position >= self.samples.len()
    }
}

/// A clip playing on its own output thread
struct ActivePlayback {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    cursor: Arc<Mutex<PlaybackCursor>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ActivePlayback {
    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ActivePlayback {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Plays clips through cpal
pub struct CpalSink {
    device_name: Option<String>,
    active: Option<ActivePlayback>,
    error_tx: Sender<AudioError>,
    error_rx: Receiver<AudioError>,
}

impl CpalSink {
    /// Use the named output device, or the host default
    pub fn new(device_name: Option<String>) -> Self {
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        Self {
            device_name,
            active: None,
            error_tx,
            error_rx,
        }
    }

    /// Stream errors reported by the output callback since the last call
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl AudioSink for CpalSink {
    fn load(&mut self, clip: PcmClip) -> Result<(), AudioError> {
        self.stop();

        let device = get_output_device(self.device_name.as_deref())?;
        let supported = device.output_config_for(clip.channels, clip.sample_rate)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let samples = resample_linear(
            &remap_channels(&clip.samples, clip.channels, config.channels),
            config.channels,
            clip.sample_rate,
            config.sample_rate.0,
        );
        tracing::info!(
            "Playing {:.1}s on {} ({} ch, {} Hz, {:?})",
            clip.duration_secs(),
            device.name,
            config.channels,
            config.sample_rate.0,
            sample_format
        );

        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let cursor = Arc::new(Mutex::new(PlaybackCursor {
            samples,
            position: 0,
        }));
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let thread_running = running.clone();
        let thread_paused = paused.clone();
        let thread_cursor = cursor.clone();
        let error_tx = self.error_tx.clone();

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let stream = match build_stream(
                    device,
                    &config,
                    sample_format,
                    thread_cursor,
                    thread_paused,
                    error_tx,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping output
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let mut active = ActivePlayback {
            running,
            paused,
            cursor,
            thread_handle: Some(handle),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.active = Some(active);
                Ok(())
            }
            Ok(Err(e)) => {
                active.shutdown();
                Err(e)
            }
            Err(_) => {
                active.shutdown();
                Err(AudioError::StreamError("playback thread exited".into()))
            }
        }
    }

    fn pause(&mut self) {
        if let Some(active) = &self.active {
            active.paused.store(true, Ordering::SeqCst);
        }
    }

    fn resume(&mut self) {
        if let Some(active) = &self.active {
            active.paused.store(false, Ordering::SeqCst);
        }
    }

    fn stop(&mut self) {
        // Dropping joins the output thread
        self.active = None;
    }

    fn is_finished(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.cursor.lock().finished())
            .unwrap_or(true)
    }
}

fn build_stream(
    device: AudioDevice,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    cursor: Arc<Mutex<PlaybackCursor>>,
    paused: Arc<AtomicBool>,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(device, config, cursor, paused, error_tx),
        cpal::SampleFormat::I16 => build_typed::<i16>(device, config, cursor, paused, error_tx),
        cpal::SampleFormat::U16 => build_typed::<u16>(device, config, cursor, paused, error_tx),
        cpal::SampleFormat::I32 => build_typed::<i32>(device, config, cursor, paused, error_tx),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn build_typed<T>(
    device: AudioDevice,
    config: &cpal::StreamConfig,
    cursor: Arc<Mutex<PlaybackCursor>>,
    paused: Arc<AtomicBool>,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let silence = T::from_sample(0.0f32);
    device
        .into_inner()
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if paused.load(Ordering::Relaxed) {
                    data.fill(silence);
                    return;
                }
                // Never block the audio thread
                let Some(mut cursor) = cursor.try_lock() else {
                    data.fill(silence);
                    return;
                };
                let start = cursor.position.min(cursor.samples.len());
                let end = (start + data.len()).min(cursor.samples.len());
                let (head, tail) = data.split_at_mut(end - start);
                for (out, &sample) in head.iter_mut().zip(&cursor.samples[start..end]) {
                    *out = T::from_sample(sample);
                }
                tail.fill(silence);
                cursor.position = end;
            },
            move |err| {
                let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::CpalError(e.to_string()))
}

/// Map interleaved samples from `from` channels to `to` channels.
///
/// Mono is duplicated to every output channel, anything down-mixed to mono
/// is averaged, and otherwise output channel `c` takes input `c % from`.
pub fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }
    let (from, to) = (from as usize, to as usize);

    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

/// Linear-interpolation rate conversion of interleaved samples
pub fn resample_linear(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || channels == 0 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    let in_frames = samples.len() / channels;
    if in_frames == 0 {
        return Vec::new();
    }

    let out_frames = (in_frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let next = (idx + 1).min(in_frames - 1);
        for c in 0..channels {
            let a = samples[idx * channels + c];
            let b = samples[next * channels + c];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo() {
        assert_eq!(remap_channels(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_to_mono() {
        assert_eq!(remap_channels(&[0.25, 0.75, -1.0, 1.0], 2, 1), vec![0.5, 0.0]);
    }

    #[test]
    fn test_stereo_to_quad() {
        assert_eq!(
            remap_channels(&[1.0, 2.0], 2, 4),
            vec![1.0, 2.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_resample_doubles_frames() {
        let out = resample_linear(&[0.0, 1.0], 1, 22_050, 44_100);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_linear(&samples, 2, 48_000, 48_000), samples);
    }

    #[test]
    fn test_sink_without_clip_is_finished() {
        let sink = CpalSink::new(None);
        assert!(sink.is_finished());
        assert!(sink.check_errors().is_none());
    }
}
