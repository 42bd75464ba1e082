//! WAV container handling
//!
//! The first frame of a stream normally starts with the track's RIFF header.
//! `WavHeader::parse` reads it from that frame alone, so the header must fit
//! in one payload. Streams without a header are played with
//! [`AudioFormat::default`].

use std::io::Cursor;
use std::path::Path;

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, DEFAULT_SAMPLE_WIDTH};
use crate::error::CodecError;

/// Sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int,
    Float,
}

/// Channel count, sample width and rate of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
}

impl Default for AudioFormat {
    /// 16-bit stereo at 44.1 kHz
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            sample_width: DEFAULT_SAMPLE_WIDTH,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_format: SampleFormat::Int,
        }
    }
}

impl AudioFormat {
    fn from_spec(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_width: spec.bits_per_sample.div_ceil(8),
            sample_rate: spec.sample_rate,
            sample_format: match spec.sample_format {
                hound::SampleFormat::Int => SampleFormat::Int,
                hound::SampleFormat::Float => SampleFormat::Float,
            },
        }
    }

    fn to_spec(self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.sample_width * 8,
            sample_format: match self.sample_format {
                SampleFormat::Int => hound::SampleFormat::Int,
                SampleFormat::Float => hound::SampleFormat::Float,
            },
        }
    }

    /// Bytes per interleaved frame (one sample for every channel)
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }
}

/// Header parsed from the first frame of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format: AudioFormat,
    /// Offset of the first sample byte from the start of the stream
    pub data_offset: usize,
    /// Length of the `data` chunk as declared by the header
    pub data_len: usize,
}

impl WavHeader {
    /// Whether `bytes` starts with the RIFF magic, i.e. claims to be a header
    pub fn is_riff(bytes: &[u8]) -> bool {
        bytes.len() >= 4 && &bytes[..4] == b"RIFF"
    }

    /// Parse a RIFF/WAVE header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;

        let format = AudioFormat::from_spec(reader.spec());
        if format.channels == 0 {
            return Err(CodecError::MalformedHeader("zero channels".into()));
        }
        let data_len = reader.len() as usize * format.sample_width as usize;
        let data_offset = reader.into_inner().position() as usize;

        Ok(Self {
            format,
            data_offset,
            data_len,
        })
    }
}

/// Decoded, playable audio
#[derive(Debug, Clone, PartialEq)]
pub struct PcmClip {
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl PcmClip {
    /// Decode a reassembled stream. With a header, only the declared `data`
    /// chunk is decoded (truncated to what actually arrived); without one the
    /// whole buffer is raw PCM in the default format.
    pub fn decode(buffer: &[u8], header: Option<&WavHeader>) -> Result<Self, CodecError> {
        let (format, pcm) = match header {
            Some(header) => {
                let start = header.data_offset.min(buffer.len());
                let end = header.data_offset.saturating_add(header.data_len).min(buffer.len());
                (header.format, &buffer[start..end])
            }
            None => (AudioFormat::default(), buffer),
        };

        Ok(Self {
            samples: decode_samples(pcm, format)?,
            channels: format.channels,
            sample_rate: format.sample_rate,
        })
    }

    /// Number of interleaved frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Little-endian PCM bytes to `f32`. A trailing partial sample is dropped.
pub fn decode_samples(pcm: &[u8], format: AudioFormat) -> Result<Vec<f32>, CodecError> {
    let width = format.sample_width as usize;
    let convert: fn(&[u8]) -> f32 = match (format.sample_format, width) {
        (SampleFormat::Int, 1) => |b| (b[0] as f32 - 128.0) / 128.0,
        (SampleFormat::Int, 2) => |b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0,
        (SampleFormat::Int, 3) => {
            |b| (i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8) as f32 / 8_388_608.0
        }
        (SampleFormat::Int, 4) => {
            |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0
        }
        (SampleFormat::Float, 4) => |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        (sample_format, _) => {
            return Err(CodecError::UnsupportedSampleFormat(format!(
                "{:?} with {} bytes per sample",
                sample_format, width
            )))
        }
    };

    Ok(pcm.chunks_exact(width).map(convert).collect())
}

/// Write a received stream to disk as a WAV file. A stream that already
/// carries its header is written verbatim; raw PCM is wrapped in a header for
/// `format`.
pub fn write_wav_file(
    path: &Path,
    buffer: &[u8],
    header: Option<&WavHeader>,
    format: AudioFormat,
) -> Result<(), CodecError> {
    if header.is_some() {
        return std::fs::write(path, buffer).map_err(|e| CodecError::WriteFailed(e.to_string()));
    }

    let mut writer = hound::WavWriter::create(path, format.to_spec())
        .map_err(|e| CodecError::WriteFailed(e.to_string()))?;
    let width = format.sample_width as usize;
    for b in buffer.chunks_exact(width) {
        let written = match (format.sample_format, width) {
            (SampleFormat::Int, 1) => writer.write_sample((b[0] as i16 - 128) as i8),
            (SampleFormat::Int, 2) => writer.write_sample(i16::from_le_bytes([b[0], b[1]])),
            (SampleFormat::Int, 3) => {
                writer.write_sample(i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8)
            }
            (SampleFormat::Int, 4) => writer.write_sample(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            (SampleFormat::Float, 4) => writer.write_sample(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            (sample_format, _) => {
                return Err(CodecError::UnsupportedSampleFormat(format!(
                    "{:?} with {} bytes per sample",
                    sample_format, width
                )))
            }
        };
        written.map_err(|e| CodecError::WriteFailed(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| CodecError::WriteFailed(e.to_string()))
}

/// Build an in-memory 16-bit WAV file. Used by tests across the crate.
#[cfg(test)]
pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
