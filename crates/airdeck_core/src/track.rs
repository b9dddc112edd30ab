//! Track Buffers and Decoding
//!
//! A deck plays from a fully decoded, in-memory buffer. Decoding happens
//! once per track load, off the audio thread, through a [`TrackSource`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::LoadError;

/// Decoded audio: interleaved `f32` frames plus their format
#[derive(Debug, Clone, PartialEq)]
pub struct TrackBuffer {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
}

impl TrackBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(mut samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Build a buffer from per-frame values, e.g. `|frame, channel| ...`
    pub fn from_fn(
        frames: usize,
        channels: usize,
        sample_rate: u32,
        mut f: impl FnMut(usize, usize) -> f32,
    ) -> Self {
        let channels = channels.max(1);
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for channel in 0..channels {
                samples.push(f(frame, channel));
            }
        }
        Self::new(samples, channels, sample_rate)
    }

    /// Number of frames
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// All samples, interleaved
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Interleaved samples for frames `[start, end)`, clipped to the buffer
    pub fn frame_range(&self, start: usize, end: usize) -> &[f32] {
        let frames = self.frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// One frame's samples
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get(start..start + self.channels)
    }

    /// Track length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Anything that can turn a track path into a decoded buffer
///
/// Implementations are called from the control thread, never from the
/// audio callback, so they may block on I/O.
pub trait TrackSource: Send + Sync {
    fn decode(&self, path: &Path) -> Result<TrackBuffer, LoadError>;
}

/// Decodes audio files from disk with symphonia (WAV, MP3, FLAC, OGG/Vorbis, ...)
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl TrackSource for FileSource {
    fn decode(&self, path: &Path) -> Result<TrackBuffer, LoadError> {
        debug!(path = %path.display(), "Decoding track");

        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let unsupported = |reason: String| LoadError::Unsupported {
            path: path.to_path_buf(),
            reason,
        };
        let decode_failed = |reason: String| LoadError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| unsupported(e.to_string()))?;
        let mut format = probed.format;

        let (track_id, codec_params) = {
            let track = format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
                .ok_or_else(|| unsupported("no audio track".into()))?;
            (track.id, track.codec_params.clone())
        };

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unsupported(e.to_string()))?;

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count());
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                // Chained streams are not followed; the first one is the track
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(decode_failed(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = %path.display(), "Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(decode_failed(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count());

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        };

        let track = TrackBuffer::new(samples, channels, sample_rate);
        if track.is_empty() {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        debug!(
            path = %path.display(),
            frames = track.frames(),
            channels,
            sample_rate,
            "Track decoded"
        );
        Ok(track)
    }
}

/// Serves pre-decoded buffers by path
///
/// Handy for generated material (test tones, click tracks) that never
/// touches the filesystem.
#[derive(Debug, Default)]
pub struct MemorySource {
    tracks: RwLock<HashMap<PathBuf, TrackBuffer>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `track` under `path`, replacing any previous entry
    pub fn insert(&self, path: impl Into<PathBuf>, track: TrackBuffer) {
        self.tracks.write().insert(path.into(), track);
    }
}

impl TrackSource for MemorySource {
    fn decode(&self, path: &Path) -> Result<TrackBuffer, LoadError> {
        let track = self
            .tracks
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;

        if track.is_empty() {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(track)
    }
}
