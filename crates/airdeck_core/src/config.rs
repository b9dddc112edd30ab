//! Engine, Deck and Stream Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gate::ActionKind;

/// Number of levels in a fade, endpoints included (1.0, 0.9, ..., 0.0)
pub const FADE_STEPS: usize = 11;

/// Negative or non-finite values collapse to zero
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Cooldowns applied by a deck's action gate, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum time between two admitted play/pause toggles
    pub toggle_cooldown_secs: f64,

    /// Minimum time between two admitted fades
    pub fade_cooldown_secs: f64,

    /// Minimum time between two admitted track changes
    pub load_cooldown_secs: f64,

    /// After any admitted action, all gated actions are blocked this long
    pub global_cooldown_secs: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            toggle_cooldown_secs: 0.3,
            fade_cooldown_secs: 0.7,
            load_cooldown_secs: 1.0,
            global_cooldown_secs: 1.0,
        }
    }
}

impl GateConfig {
    /// Gate with every cooldown disabled
    pub fn unthrottled() -> Self {
        Self {
            toggle_cooldown_secs: 0.0,
            fade_cooldown_secs: 0.0,
            load_cooldown_secs: 0.0,
            global_cooldown_secs: 0.0,
        }
    }

    /// Per-kind cooldown. Volume and speed are never gated.
    pub fn cooldown(&self, kind: ActionKind) -> Duration {
        let secs = match kind {
            ActionKind::Toggle => self.toggle_cooldown_secs,
            ActionKind::Fade => self.fade_cooldown_secs,
            ActionKind::Load => self.load_cooldown_secs,
            ActionKind::Volume | ActionKind::Speed => 0.0,
        };
        secs_to_duration(secs)
    }

    pub fn global_cooldown(&self) -> Duration {
        secs_to_duration(self.global_cooldown_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("toggle", self.toggle_cooldown_secs),
            ("fade", self.fade_cooldown_secs),
            ("load", self.load_cooldown_secs),
            ("global", self.global_cooldown_secs),
        ];
        for (name, secs) in fields {
            if !secs.is_finite() || secs < 0.0 {
                return Err(format!("Invalid {} cooldown: {}", name, secs));
            }
        }
        Ok(())
    }
}

/// How a deck executes a fade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeMode {
    /// The ramp is advanced by the render callback; the caller returns at once.
    /// With no stream open nothing renders, so the ramp holds its level until
    /// the session starts. Stopping a session settles any pending ramp.
    #[default]
    Cooperative,

    /// The caller holds the deck lock and sleeps through every step.
    /// Rendering on that deck stalls for the whole fade.
    Blocking,
}

/// Fade timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FadeConfig {
    /// How long each of the [`FADE_STEPS`] levels is held
    pub step_secs: f64,

    #[serde(default)]
    pub mode: FadeMode,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            step_secs: 0.1,
            mode: FadeMode::Cooperative,
        }
    }
}

impl FadeConfig {
    pub fn step_duration(&self) -> Duration {
        secs_to_duration(self.step_secs)
    }

    /// Total fade length (1.1s by default)
    pub fn total_duration(&self) -> Duration {
        secs_to_duration(self.step_secs * FADE_STEPS as f64)
    }

    /// Frames each step is held for at `sample_rate`, at least one
    pub fn frames_per_step(&self, sample_rate: u32) -> usize {
        ((self.step_secs * sample_rate as f64).round() as usize).max(1)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.step_secs.is_finite() || self.step_secs <= 0.0 || self.step_secs > 10.0 {
            return Err(format!("Invalid fade step: {}s", self.step_secs));
        }
        Ok(())
    }
}

/// Per-deck configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    pub gate: GateConfig,

    pub fade: FadeConfig,

    /// Volume a freshly constructed deck starts at (0.0 - 1.0)
    pub initial_volume: f32,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            fade: FadeConfig::default(),
            initial_volume: 1.0,
        }
    }
}

impl DeckConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.gate.validate()?;
        self.fade.validate()?;
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(format!("Invalid initial volume: {}", self.initial_volume));
        }
        Ok(())
    }
}

/// Audio output stream configuration
///
/// Sample rate and channel count are not configured here: every deck is
/// rendered at the native format of its loaded track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Buffer size in frames (lower = less latency, higher = more stability)
    pub buffer_size: u32,

    /// Output device name, or the system default when `None`
    #[serde(default)]
    pub output_device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            output_device: None,
        }
    }
}

impl StreamConfig {
    /// Calculate latency in milliseconds at the given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.buffer_size as f32 / sample_rate as f32) * 1000.0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size < 32 || self.buffer_size > 8192 {
            return Err(format!("Invalid buffer size: {}", self.buffer_size));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Settings shared by both decks
    pub deck: DeckConfig,

    /// Output stream settings
    pub stream: StreamConfig,
}

impl EngineConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                buffer_size: 128, // ~2.9ms at 44.1kHz
                output_device: None,
            },
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                buffer_size: 1024, // ~23ms at 44.1kHz
                output_device: None,
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.deck.validate()?;
        self.stream.validate()
    }
}
