//! Message Types for Thread Communication
//!
//! Control events flow from the upstream producer -> Session
//! Commands flow from caller thread -> control thread
//! Events flow from control/audio threads -> caller thread

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deck::DeckSnapshot;
use crate::gate::ActionKind;

/// Which deck an event targets. Left drives deck A, Right drives deck B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// The opposite side (crossfade partner)
    pub fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// A control action and its payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "delta", rename_all = "snake_case")]
pub enum Action {
    /// Play/pause
    Toggle,

    /// Relative volume change, clamped to 0.0 - 1.0
    Volume(f32),

    /// Relative playback rate change, clamped to 0.5 - 2.0
    Speed(f32),

    /// Crossfade away from the event's side
    Fade,

    NextTrack,

    PreviousTrack,
}

impl Action {
    /// Gate kind this action is arbitrated under
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Toggle => ActionKind::Toggle,
            Action::Volume(_) => ActionKind::Volume,
            Action::Speed(_) => ActionKind::Speed,
            Action::Fade => ActionKind::Fade,
            Action::NextTrack | Action::PreviousTrack => ActionKind::Load,
        }
    }
}

/// A single event from the upstream producer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    pub side: Side,
    pub action: Action,
}

impl ControlEvent {
    pub fn new(side: Side, action: Action) -> Self {
        Self { side, action }
    }
}

/// Errors from parsing a textual control event
#[derive(Error, Debug, PartialEq)]
pub enum ParseEventError {
    #[error("Empty control event")]
    Empty,

    #[error("Unknown side '{0}' (expected left or right)")]
    UnknownSide(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Action '{0}' needs a numeric delta")]
    MissingDelta(String),

    #[error("Invalid delta '{0}'")]
    InvalidDelta(String),

    #[error("Unexpected trailing input '{0}'")]
    TrailingInput(String),
}

impl FromStr for Side {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "l" | "a" => Ok(Side::Left),
            "right" | "r" | "b" => Ok(Side::Right),
            _ => Err(ParseEventError::UnknownSide(s.to_string())),
        }
    }
}

/// Parses `<side> <action> [delta]`, e.g. `left volume -0.05` or `right fade`
impl FromStr for ControlEvent {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let side: Side = parts.next().ok_or(ParseEventError::Empty)?.parse()?;
        let name = parts
            .next()
            .ok_or_else(|| ParseEventError::UnknownAction(String::new()))?
            .to_ascii_lowercase();

        let mut delta = || -> Result<f32, ParseEventError> {
            let raw = parts
                .next()
                .ok_or_else(|| ParseEventError::MissingDelta(name.clone()))?;
            raw.parse::<f32>()
                .ok()
                .filter(|d| d.is_finite())
                .ok_or_else(|| ParseEventError::InvalidDelta(raw.to_string()))
        };

        let action = match name.as_str() {
            "toggle" | "play" | "pause" => Action::Toggle,
            "volume" | "vol" => Action::Volume(delta()?),
            "speed" | "pitch" => Action::Speed(delta()?),
            "fade" | "crossfade" => Action::Fade,
            "next" => Action::NextTrack,
            "prev" | "previous" => Action::PreviousTrack,
            _ => return Err(ParseEventError::UnknownAction(name.clone())),
        };

        if let Some(extra) = parts.next() {
            return Err(ParseEventError::TrailingInput(extra.to_string()));
        }

        Ok(ControlEvent { side, action })
    }
}

/// Commands sent from the caller to the control thread
#[derive(Debug, Clone)]
pub enum Command {
    /// Open output streams and begin rendering
    Start,

    /// Close output streams
    Stop,

    /// Route a control event to its deck
    Control(ControlEvent),

    /// Append a track to a deck's playlist
    AddTrack { side: Side, path: PathBuf },

    /// Request current state (triggers StateUpdate event)
    RequestState,

    /// Shutdown the control thread
    Shutdown,
}

/// Events sent back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Output streams opened
    Started,

    /// Output streams closed
    Stopped,

    /// Error occurred
    Error { message: String },

    /// A deck switched to a new track
    TrackLoaded { side: Side, path: String },

    /// A deck ran off the end of its track and stopped
    TrackEnded { side: Side },

    /// Current state snapshot
    StateUpdate {
        is_running: bool,
        decks: Vec<DeckSnapshot>,
    },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
