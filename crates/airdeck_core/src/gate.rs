//! Action Gate
//!
//! Debounces discrete control actions. Upstream detectors report a held
//! gesture on every frame (30-60 times per second); the gate turns that
//! into a single admitted action followed by a quiet period.
//!
//! Two rules apply to gated kinds:
//! 1. Global throttle: any admitted action blocks every gated kind for
//!    `global_cooldown`.
//! 2. Per-kind cooldown: the same kind must wait strictly longer than its
//!    own cooldown since it was last admitted.
//!
//! Volume and speed are continuous controls and always pass.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

/// Kinds of control action known to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Toggle,
    Volume,
    Speed,
    Fade,
    Load,
}

impl ActionKind {
    pub const COUNT: usize = 5;

    pub const ALL: [ActionKind; Self::COUNT] = [
        ActionKind::Toggle,
        ActionKind::Volume,
        ActionKind::Speed,
        ActionKind::Fade,
        ActionKind::Load,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// Continuous controls bypass the gate entirely
    pub fn is_cooldown_exempt(self) -> bool {
        matches!(self, ActionKind::Volume | ActionKind::Speed)
    }
}

/// Per-deck cooldown arbiter
#[derive(Debug, Clone)]
pub struct Gate {
    cooldowns: [Duration; ActionKind::COUNT],
    global_cooldown: Duration,
    last_admitted: [Option<Instant>; ActionKind::COUNT],
    global_last_admitted: Option<Instant>,
}

impl Gate {
    pub fn new(config: &GateConfig) -> Self {
        let mut cooldowns = [Duration::ZERO; ActionKind::COUNT];
        for kind in ActionKind::ALL {
            cooldowns[kind.index()] = config.cooldown(kind);
        }

        Self {
            cooldowns,
            global_cooldown: config.global_cooldown(),
            last_admitted: [None; ActionKind::COUNT],
            global_last_admitted: None,
        }
    }

    /// Decide whether `kind` may run at `now`, recording it if so.
    ///
    /// Rejections leave the gate untouched.
    pub fn admit(&mut self, kind: ActionKind, now: Instant) -> bool {
        if kind.is_cooldown_exempt() {
            return true;
        }

        if let Some(global) = self.global_last_admitted {
            if now.saturating_duration_since(global) < self.global_cooldown {
                return false;
            }
        }

        let ready = match self.last_admitted[kind.index()] {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.cooldowns[kind.index()],
        };

        if ready {
            self.last_admitted[kind.index()] = Some(now);
            self.global_last_admitted = Some(now);
        }
        ready
    }

    /// Last time `kind` was admitted
    pub fn last_admitted(&self, kind: ActionKind) -> Option<Instant> {
        self.last_admitted[kind.index()]
    }

    pub fn cooldown(&self, kind: ActionKind) -> Duration {
        self.cooldowns[kind.index()]
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new(&GateConfig::default())
    }
}
