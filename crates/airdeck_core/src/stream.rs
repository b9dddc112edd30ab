//! Deck Output Streams
//!
//! Each deck gets its own CPAL output stream opened at the native format
//! of its loaded track. The stream's callback is the only place a deck is
//! rendered during live playback.
//!
//! ```text
//! Control thread ── Deck (Mutex) ──> cpal callback ──> device
//!                                         │
//!                                         └── TrackEnded / errors ──> Event channel
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::deck::{Deck, RenderStatus};
use crate::error::{EngineError, EngineResult};
use crate::message::{Event, Side};

/// State shared between a stream's audio callback and the control thread
pub struct StreamMeter {
    /// Peak absolute sample of the last block (stored as f32 bits)
    peak_bits: AtomicU32,

    /// Callbacks serviced so far
    blocks: AtomicU64,

    /// Set by the callback when the deck ran off the end of its track
    ended: AtomicBool,
}

impl StreamMeter {
    pub fn new() -> Self {
        Self {
            peak_bits: AtomicU32::new(0.0_f32.to_bits()),
            blocks: AtomicU64::new(0),
            ended: AtomicBool::new(false),
        }
    }

    /// Record one rendered block
    pub fn record(&self, block: &[f32], status: RenderStatus) {
        let peak = block.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Relaxed);
        if status == RenderStatus::Ended {
            self.ended.store(true, Ordering::Relaxed);
        }
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Whether the track ended since the last call, clearing the flag
    pub fn take_ended(&self) -> bool {
        self.ended.swap(false, Ordering::Relaxed)
    }
}

impl Default for StreamMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// An open, playing output stream bound to one deck
///
/// Dropping it closes the stream.
pub struct DeckStream {
    /// The underlying CPAL stream (kept alive to maintain audio flow)
    #[allow(dead_code)]
    stream: Stream,

    side: Side,

    /// Format the stream was opened with
    channels: u16,
    sample_rate: u32,

    pub meter: Arc<StreamMeter>,
}

impl DeckStream {
    /// Open an output stream on `device` that renders `deck`.
    ///
    /// The stream uses the deck's current track format and starts playing
    /// immediately. Whether sound comes out is up to the deck's play flag.
    pub fn open(
        device: &Device,
        deck: Arc<Deck>,
        side: Side,
        config: &StreamConfig,
        event_sender: Sender<Event>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;

        let (channels, sample_rate) = deck.format();
        let channels = u16::try_from(channels)
            .map_err(|_| EngineError::ConfigError(format!("Unsupported channel count: {}", channels)))?;

        let cpal_config = CpalStreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let meter = Arc::new(StreamMeter::new());
        let stream = Self::build_output_stream(
            device,
            &cpal_config,
            deck,
            side,
            Arc::clone(&meter),
            event_sender,
        )?;

        stream
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        info!(
            %side,
            channels,
            sample_rate,
            buffer_size = config.buffer_size,
            latency_ms = config.latency_ms(sample_rate),
            "Deck stream opened"
        );

        Ok(Self {
            stream,
            side,
            channels,
            sample_rate,
            meter,
        })
    }

    fn build_output_stream(
        device: &Device,
        config: &CpalStreamConfig,
        deck: Arc<Deck>,
        side: Side,
        meter: Arc<StreamMeter>,
        event_sender: Sender<Event>,
    ) -> EngineResult<Stream> {
        let err_sender = event_sender.clone();
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    let status = deck.render_into(data, channels);
                    meter.record(data, status);

                    if status == RenderStatus::Ended {
                        let _ = event_sender.try_send(Event::TrackEnded { side });
                    }
                },
                move |err| {
                    let _ = err_sender.try_send(Event::error(err));
                },
                None,
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        Ok(stream)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Whether this stream still matches the deck's track format
    pub fn matches(&self, deck: &Deck) -> bool {
        let (channels, sample_rate) = deck.format();
        usize::from(self.channels) == channels && self.sample_rate == sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Peak level of the last rendered block (for UI meters)
    pub fn peak(&self) -> f32 {
        self.meter.peak()
    }
}

impl Drop for DeckStream {
    fn drop(&mut self) {
        debug!(side = %self.side, blocks = self.meter.blocks(), "Deck stream closed");
    }
}
