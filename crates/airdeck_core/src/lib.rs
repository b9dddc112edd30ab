//! Airdeck Core - Dual-Deck Playback Engine
//!
//! This crate provides the playback engine for Airdeck, including:
//! - Decks: decoded tracks with play/pause, volume, varispeed and fades
//! - A per-deck action gate that debounces noisy gesture input
//! - A session that routes left/right control events and runs crossfades
//! - One CPAL output stream per deck at the track's native format
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller Thread                         │
//! │  (CLI / gesture detector) ──commands──▶ Engine ◀──events──  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   Session ──▶ Gate ──▶ Deck A / Deck B (parking_lot Mutex)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ shared Arc<Deck>
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Audio Callbacks (one per deck)                │
//! │        Deck::render_into ──▶ cpal output stream             │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod deck;
mod device;
mod engine;
mod error;
mod gate;
mod message;
mod session;
mod settings;
mod stream;
mod track;

pub use config::{
    DeckConfig, EngineConfig, FadeConfig, FadeMode, GateConfig, StreamConfig, FADE_STEPS,
};
pub use deck::{Deck, DeckSnapshot, RenderStatus, MAX_SPEED, MAX_VOLUME, MIN_SPEED, MIN_VOLUME};
pub use device::OutputDevice;
pub use engine::AudioEngine;
pub use error::{EngineError, EngineResult, LoadError};
pub use gate::{ActionKind, Gate};
pub use message::{Action, Command, ControlEvent, Event, ParseEventError, Side};
pub use session::Session;
pub use settings::AirdeckSettings;
pub use stream::{DeckStream, StreamMeter};
pub use track::{FileSource, MemorySource, TrackBuffer, TrackSource};

// Re-export DSP types for convenience
pub use airdeck_dsp::{DspError, SteppedRamp};
