//! Deck: one independently controlled playback unit
//!
//! A deck owns a decoded track, a playlist, a play/pause flag, a cursor,
//! volume, speed and an optional fade in progress. Control calls arrive
//! from the control thread; [`Deck::render_into`] is called from the audio
//! callback. Both sides take the same lock, so every control operation is
//! atomic with respect to rendering.
//!
//! Gated actions (toggle, fade, track changes) go through the deck's
//! [`Gate`] first and silently do nothing when rejected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use airdeck_dsp::{apply_gain, consumed_frames, copy_frames, interpolate_first_channel, SteppedRamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{DeckConfig, FadeMode, FADE_STEPS};
use crate::error::{EngineError, EngineResult, LoadError};
use crate::gate::{ActionKind, Gate};
use crate::track::{TrackBuffer, TrackSource};

/// Volume range
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;

/// Playback rate range
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Speeds this close to 1.0 are treated as exactly 1.0
const UNITY_SPEED_TOLERANCE: f32 = 1e-4;

/// Outcome of one render call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The deck was paused; the block is silence
    Silent,

    /// The block is full of track audio
    Playing,

    /// The track ran out during this block and the deck stopped
    Ended,
}

/// Point-in-time view of a deck, for UIs and state events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSnapshot {
    pub name: String,
    pub playing: bool,
    pub volume: f32,
    pub speed: f32,
    pub fading: bool,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub channels: usize,
    pub sample_rate: u32,
    pub track_index: usize,
    pub track_path: Option<String>,
    pub playlist_len: usize,

    /// Peak output level of the last block sent to the device, 0.0 with
    /// no stream open
    #[serde(default)]
    pub peak: f32,
}

/// State shared between the control thread and the audio callback
struct DeckState {
    track: Arc<TrackBuffer>,
    playlist: Vec<PathBuf>,
    track_index: usize,
    /// File the current buffer was decoded from, `None` for in-memory tracks
    path: Option<PathBuf>,
    playing: bool,
    /// Next frame to play, always <= track length
    cursor: usize,
    volume: f32,
    speed: f32,
    fade: Option<SteppedRamp>,
}

impl DeckState {
    /// Swap in a new buffer, returning the old one so it can be dropped
    /// outside the lock.
    fn install(&mut self, track: Arc<TrackBuffer>, path: &Path) -> Arc<TrackBuffer> {
        self.path = Some(path.to_path_buf());
        self.cursor = 0;
        self.playing = false;
        self.settle_fade();
        std::mem::replace(&mut self.track, track)
    }

    /// Jump a pending fade straight to its final level
    fn settle_fade(&mut self) {
        if let Some(ramp) = self.fade.take() {
            self.volume = ramp.end();
        }
    }

    fn render(&mut self, out: &mut [f32], channels: usize) -> RenderStatus {
        out.fill(0.0);
        if channels == 0 {
            return RenderStatus::Silent;
        }

        let whole = out.len() - out.len() % channels;
        let block = &mut out[..whole];

        let status = if self.playing {
            self.render_track(block, channels)
        } else {
            RenderStatus::Silent
        };

        // A pending fade keeps moving while paused
        match self.fade.as_mut() {
            Some(ramp) => {
                ramp.apply(block, channels);
                self.volume = ramp.level();
                if ramp.is_finished() {
                    self.fade = None;
                }
            }
            None => apply_gain(block, self.volume),
        }

        status
    }

    /// Fill `out` from the cursor. `out` is zeroed and holds whole frames.
    fn render_track(&mut self, out: &mut [f32], channels: usize) -> RenderStatus {
        let frame_count = out.len() / channels;
        let total = self.track.frames();
        let span = consumed_frames(frame_count, self.speed);
        let start = self.cursor.min(total);
        let end = start.saturating_add(span).min(total);

        let written = {
            let chunk = self.track.frame_range(start, end);
            let track_channels = self.track.channels();
            if self.speed == 1.0 {
                copy_frames(chunk, track_channels, out, channels)
            } else {
                interpolate_first_channel(chunk, track_channels, span, out, channels)
            }
        };

        self.cursor = end;
        if written < frame_count {
            self.playing = false;
            RenderStatus::Ended
        } else {
            RenderStatus::Playing
        }
    }

    fn position_secs(&self) -> f64 {
        let rate = self.track.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.cursor as f64 / rate as f64
    }
}

/// A single playback deck
pub struct Deck {
    name: String,
    state: Mutex<DeckState>,
    gate: Mutex<Gate>,
    source: Arc<dyn TrackSource>,
    config: DeckConfig,
}

impl Deck {
    /// Create a deck and load the first entry of `playlist`.
    ///
    /// The deck starts paused at the start of the track.
    pub fn new(
        name: impl Into<String>,
        playlist: Vec<PathBuf>,
        source: Arc<dyn TrackSource>,
        config: DeckConfig,
    ) -> EngineResult<Self> {
        let name = name.into();
        let first = playlist
            .first()
            .ok_or_else(|| EngineError::ConfigError(format!("Deck {} has an empty playlist", name)))?;

        config.validate().map_err(EngineError::ConfigError)?;
        let track = source.decode(first)?;

        info!(
            deck = %name,
            path = %first.display(),
            tracks = playlist.len(),
            "Deck ready"
        );
        let path = Some(first.clone());
        Ok(Self::with_state(name, track, path, playlist, source, config))
    }

    /// Create a deck around an already decoded buffer and an empty playlist
    pub fn from_track(
        name: impl Into<String>,
        track: TrackBuffer,
        source: Arc<dyn TrackSource>,
        config: DeckConfig,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;
        Ok(Self::with_state(name.into(), track, None, Vec::new(), source, config))
    }

    fn with_state(
        name: String,
        track: TrackBuffer,
        path: Option<PathBuf>,
        playlist: Vec<PathBuf>,
        source: Arc<dyn TrackSource>,
        config: DeckConfig,
    ) -> Self {
        let state = DeckState {
            track: Arc::new(track),
            playlist,
            track_index: 0,
            path,
            playing: false,
            cursor: 0,
            volume: config.initial_volume,
            speed: 1.0,
            fade: None,
        };

        Self {
            name,
            state: Mutex::new(state),
            gate: Mutex::new(Gate::new(&config.gate)),
            source,
            config,
        }
    }

    fn admit(&self, kind: ActionKind) -> bool {
        let admitted = self.gate.lock().admit(kind, Instant::now());
        if !admitted {
            debug!(deck = %self.name, ?kind, "Action rejected by gate");
        }
        admitted
    }

    /// Decode `path` and make it the current track.
    ///
    /// Resets the cursor and pauses the deck. Volume and speed carry over.
    /// On failure the deck is left exactly as it was.
    pub fn load(&self, path: &Path) -> Result<(), LoadError> {
        let track = Arc::new(self.source.decode(path)?);
        let old = self.state.lock().install(track, path);
        drop(old);

        info!(deck = %self.name, path = %path.display(), "Track loaded");
        Ok(())
    }

    /// Append a track to the playlist
    pub fn add_track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state.lock();
        state.playlist.push(path);
        debug!(deck = %self.name, tracks = state.playlist.len(), "Track added to playlist");
    }

    /// Advance to the next playlist entry, wrapping at the end.
    ///
    /// Returns `Ok(false)` when the gate rejects the change or the playlist
    /// is empty. A failed load keeps the current track and index.
    pub fn next_track(&self) -> Result<bool, LoadError> {
        self.change_track(true)
    }

    /// Step back to the previous playlist entry, wrapping at the start
    pub fn previous_track(&self) -> Result<bool, LoadError> {
        self.change_track(false)
    }

    fn change_track(&self, forward: bool) -> Result<bool, LoadError> {
        if self.state.lock().playlist.is_empty() {
            debug!(deck = %self.name, "Playlist is empty");
            return Ok(false);
        }
        if !self.admit(ActionKind::Load) {
            return Ok(false);
        }

        let (index, path) = {
            let state = self.state.lock();
            let len = state.playlist.len();
            let index = if forward {
                (state.track_index + 1) % len
            } else {
                (state.track_index + len - 1) % len
            };
            (index, state.playlist[index].clone())
        };

        // Decode without holding the lock so the callback keeps running
        let track = Arc::new(self.source.decode(&path)?);
        let old = {
            let mut state = self.state.lock();
            state.track_index = index;
            state.install(track, &path)
        };
        drop(old);

        info!(deck = %self.name, index, path = %path.display(), "Track changed");
        Ok(true)
    }

    /// Flip play/pause. Returns whether the gate admitted the toggle.
    pub fn toggle(&self) -> bool {
        if !self.admit(ActionKind::Toggle) {
            return false;
        }

        let playing = {
            let mut state = self.state.lock();
            state.playing = !state.playing;
            state.playing
        };
        info!(deck = %self.name, playing, "Playback toggled");
        true
    }

    /// Nudge the volume by `delta`, clamped to 0.0 - 1.0.
    ///
    /// Cancels a fade in progress, starting from its current level.
    /// Returns the new volume.
    pub fn adjust_volume(&self, delta: f32) -> f32 {
        let mut state = self.state.lock();
        if !delta.is_finite() {
            return state.volume;
        }
        if state.fade.take().is_some() {
            debug!(deck = %self.name, "Fade cancelled by volume change");
        }
        state.volume = (state.volume + delta).clamp(MIN_VOLUME, MAX_VOLUME);
        debug!(deck = %self.name, volume = state.volume, "Volume changed");
        state.volume
    }

    /// Nudge the playback rate by `delta`, clamped to 0.5 - 2.0.
    /// Returns the new rate.
    pub fn adjust_speed(&self, delta: f32) -> f32 {
        let mut state = self.state.lock();
        if !delta.is_finite() {
            return state.speed;
        }
        let mut speed = (state.speed + delta).clamp(MIN_SPEED, MAX_SPEED);
        if (speed - 1.0).abs() < UNITY_SPEED_TOLERANCE {
            speed = 1.0;
        }
        state.speed = speed;
        debug!(deck = %self.name, speed, "Speed changed");
        speed
    }

    /// Ramp the volume from 1.0 to 0.0. Returns whether the gate admitted it.
    pub fn fade_out(&self) -> bool {
        self.fade(1.0, 0.0)
    }

    /// Ramp the volume from 0.0 to 1.0. Returns whether the gate admitted it.
    pub fn fade_in(&self) -> bool {
        self.fade(0.0, 1.0)
    }

    fn fade(&self, start: f32, end: f32) -> bool {
        if !self.admit(ActionKind::Fade) {
            return false;
        }

        let admitted = match self.config.fade.mode {
            FadeMode::Cooperative => self.start_fade(start, end),
            FadeMode::Blocking => self.run_blocking_fade(start, end),
        };
        if admitted {
            info!(
                deck = %self.name,
                from = start,
                to = end,
                mode = ?self.config.fade.mode,
                duration_ms = self.config.fade.total_duration().as_millis() as u64,
                "Fade admitted"
            );
        }
        admitted
    }

    /// Arm a ramp for the render callback to walk through
    fn start_fade(&self, start: f32, end: f32) -> bool {
        let mut state = self.state.lock();
        let frames_per_step = self.config.fade.frames_per_step(state.track.sample_rate());
        match SteppedRamp::new(start, end, FADE_STEPS, frames_per_step) {
            Ok(ramp) => {
                state.volume = ramp.level();
                state.fade = Some(ramp);
                true
            }
            Err(e) => {
                error!(deck = %self.name, "Cannot start fade: {}", e);
                false
            }
        }
    }

    /// Hold the lock and sleep through every step.
    ///
    /// Rendering on this deck stalls until the fade returns.
    fn run_blocking_fade(&self, start: f32, end: f32) -> bool {
        let ramp = match SteppedRamp::new(start, end, FADE_STEPS, 1) {
            Ok(ramp) => ramp,
            Err(e) => {
                error!(deck = %self.name, "Cannot start fade: {}", e);
                return false;
            }
        };
        let step = self.config.fade.step_duration();

        let mut state = self.state.lock();
        state.fade = None;
        for level in ramp.levels() {
            state.volume = level;
            debug!(deck = %self.name, volume = level, "Fade step");
            std::thread::sleep(step);
        }
        true
    }

    /// Jump a pending cooperative fade to its final level.
    ///
    /// Used when no stream will be rendering the deck to walk the ramp.
    pub fn settle_fade(&self) {
        let mut state = self.state.lock();
        if state.fade.is_some() {
            state.settle_fade();
            debug!(deck = %self.name, volume = state.volume, "Fade settled");
        }
    }

    /// Move the cursor to `frame`, clamped to the track length.
    /// Not gated; the play flag is left alone.
    pub fn seek(&self, frame: usize) {
        let mut state = self.state.lock();
        state.cursor = frame.min(state.track.frames());
        debug!(deck = %self.name, cursor = state.cursor, "Seek");
    }

    /// Render `frame_count` frames at the track's channel count
    pub fn render(&self, frame_count: usize) -> Vec<f32> {
        let mut state = self.state.lock();
        let channels = state.track.channels();
        let mut out = vec![0.0; frame_count * channels];
        state.render(&mut out, channels);
        out
    }

    /// Render into an interleaved device buffer with `channels` channels.
    ///
    /// Output channel `c` plays track channel `c % track_channels`. Any
    /// part of `out` not covered by track audio is zeroed.
    ///
    /// # Real-time Safety
    /// No allocations. Blocks only if a control call holds the deck lock.
    pub fn render_into(&self, out: &mut [f32], channels: usize) -> RenderStatus {
        self.state.lock().render(out, channels)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn speed(&self) -> f32 {
        self.state.lock().speed
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// Length of the current track in frames
    pub fn len_frames(&self) -> usize {
        self.state.lock().track.frames()
    }

    pub fn is_fading(&self) -> bool {
        self.state.lock().fade.is_some()
    }

    /// Channel count of the current track
    pub fn channels(&self) -> usize {
        self.state.lock().track.channels()
    }

    /// Sample rate of the current track
    pub fn sample_rate(&self) -> u32 {
        self.state.lock().track.sample_rate()
    }

    /// `(channels, sample_rate)` of the current track, read atomically
    pub fn format(&self) -> (usize, u32) {
        let state = self.state.lock();
        (state.track.channels(), state.track.sample_rate())
    }

    pub fn track_index(&self) -> usize {
        self.state.lock().track_index
    }

    /// File the current track was loaded from, `None` for in-memory tracks
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    pub fn playlist(&self) -> Vec<PathBuf> {
        self.state.lock().playlist.clone()
    }

    /// The current track buffer
    pub fn track(&self) -> Arc<TrackBuffer> {
        Arc::clone(&self.state.lock().track)
    }

    pub fn snapshot(&self) -> DeckSnapshot {
        let state = self.state.lock();
        DeckSnapshot {
            name: self.name.clone(),
            playing: state.playing,
            volume: state.volume,
            speed: state.speed,
            fading: state.fade.is_some(),
            position_secs: state.position_secs(),
            duration_secs: state.track.duration_secs(),
            channels: state.track.channels(),
            sample_rate: state.track.sample_rate(),
            track_index: state.track_index,
            track_path: state.path.as_ref().map(|p| p.display().to_string()),
            playlist_len: state.playlist.len(),
            peak: 0.0,
        }
    }
}

impl std::fmt::Debug for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FadeConfig, GateConfig};
    use crate::track::MemorySource;
    use std::thread;
    use std::time::Duration;

    /// Stereo track where left = frame index and right = -frame index
    fn ramp_track(frames: usize, sample_rate: u32) -> TrackBuffer {
        TrackBuffer::from_fn(frames, 2, sample_rate, |f, c| {
            if c == 0 {
                f as f32
            } else {
                -(f as f32)
            }
        })
    }

    fn constant_track(frames: usize, sample_rate: u32) -> TrackBuffer {
        TrackBuffer::from_fn(frames, 1, sample_rate, |_, _| 1.0)
    }

    fn deck_with(track: TrackBuffer, config: DeckConfig) -> Deck {
        Deck::from_track("A", track, Arc::new(MemorySource::new()), config).unwrap()
    }

    fn unthrottled() -> DeckConfig {
        DeckConfig {
            gate: GateConfig::unthrottled(),
            ..Default::default()
        }
    }

    fn start(deck: &Deck) {
        deck.state.lock().playing = true;
    }

    fn set_cursor(deck: &Deck, cursor: usize) {
        deck.state.lock().cursor = cursor;
    }

    /// Per-kind cooldowns are strict, so back-to-back calls need a tick
    fn tick() {
        std::thread::sleep(Duration::from_millis(2));
    }

    fn playlist_deck(config: DeckConfig) -> (Deck, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new());
        source.insert("a.wav", ramp_track(10, 100));
        source.insert("b.wav", ramp_track(20, 100));
        source.insert("c.wav", ramp_track(30, 100));
        let playlist = vec!["a.wav".into(), "b.wav".into(), "c.wav".into()];
        let deck = Deck::new("A", playlist, source.clone(), config).unwrap();
        (deck, source)
    }

    #[test]
    fn test_new_deck_defaults() {
        let (deck, _) = playlist_deck(DeckConfig::default());
        assert!(!deck.is_playing());
        assert_eq!(deck.cursor(), 0);
        assert_eq!(deck.volume(), 1.0);
        assert_eq!(deck.speed(), 1.0);
        assert_eq!(deck.track_index(), 0);
        assert_eq!(deck.track().frames(), 10);
    }

    #[test]
    fn test_new_deck_errors() {
        let source: Arc<dyn TrackSource> = Arc::new(MemorySource::new());

        let empty = Deck::new("A", Vec::new(), source.clone(), DeckConfig::default());
        assert!(matches!(empty, Err(EngineError::ConfigError(_))));

        let missing = Deck::new("A", vec!["nope.wav".into()], source.clone(), DeckConfig::default());
        assert!(matches!(missing, Err(EngineError::LoadError(_))));

        let bad_config = DeckConfig {
            initial_volume: 2.0,
            ..Default::default()
        };
        let invalid = Deck::from_track("A", ramp_track(10, 100), source, bad_config);
        assert!(matches!(invalid, Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_render_through_end_of_track() {
        let track = ramp_track(100, 44100);
        let deck = deck_with(track.clone(), DeckConfig::default());
        assert!(deck.toggle());

        let first = deck.render(40);
        assert_eq!(first.as_slice(), track.frame_range(0, 40));
        assert_eq!(deck.cursor(), 40);

        let second = deck.render(40);
        assert_eq!(second.as_slice(), track.frame_range(40, 80));
        assert_eq!(deck.cursor(), 80);
        assert!(deck.is_playing());

        let third = deck.render(40);
        assert_eq!(&third[..40], track.frame_range(80, 100));
        assert!(third[40..].iter().all(|s| *s == 0.0));
        assert_eq!(deck.cursor(), 100);
        assert!(!deck.is_playing());
    }

    #[test]
    fn test_partial_final_block() {
        let track = ramp_track(100, 44100);
        let deck = deck_with(track.clone(), DeckConfig::default());
        start(&deck);
        set_cursor(&deck, 93);

        let mut out = vec![9.0; 16 * 2];
        assert_eq!(deck.render_into(&mut out, 2), RenderStatus::Ended);
        assert_eq!(&out[..14], track.frame_range(93, 100));
        assert!(out[14..].iter().all(|s| *s == 0.0));
        assert!(!deck.is_playing());
        assert_eq!(deck.cursor(), 100);
    }

    #[test]
    fn test_paused_deck_is_silent_and_still() {
        let deck = deck_with(ramp_track(100, 44100), DeckConfig::default());
        set_cursor(&deck, 10);

        for _ in 0..5 {
            let mut out = vec![1.0; 32 * 2];
            assert_eq!(deck.render_into(&mut out, 2), RenderStatus::Silent);
            assert!(out.iter().all(|s| *s == 0.0));
        }
        assert_eq!(deck.cursor(), 10);
    }

    #[test]
    fn test_render_at_end_is_silent() {
        let deck = deck_with(ramp_track(100, 44100), DeckConfig::default());
        start(&deck);
        set_cursor(&deck, 100);

        let out = deck.render(8);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(!deck.is_playing());
        assert_eq!(deck.cursor(), 100);
    }

    #[test]
    fn test_volume_scales_output() {
        let deck = deck_with(ramp_track(100, 44100), DeckConfig::default());
        start(&deck);
        assert_eq!(deck.adjust_volume(-0.5), 0.5);

        let out = deck.render(10);
        for frame in 0..10 {
            assert_eq!(out[frame * 2], frame as f32 * 0.5);
            assert_eq!(out[frame * 2 + 1], -(frame as f32) * 0.5);
        }
    }

    #[test]
    fn test_volume_clamps() {
        let deck = deck_with(ramp_track(10, 100), DeckConfig::default());
        let starts = [0.0_f32, 0.3, 0.5, 1.0];
        let deltas = [-2.0_f32, -0.05, 0.0, 0.05, 2.0];

        for v0 in starts {
            for delta in deltas {
                deck.state.lock().volume = v0;
                let v = deck.adjust_volume(delta);
                assert_eq!(v, (v0 + delta).clamp(0.0, 1.0));
                assert!((0.0..=1.0).contains(&v));
            }
        }

        // Stays pinned at the bounds
        deck.state.lock().volume = 1.0;
        assert_eq!(deck.adjust_volume(0.05), 1.0);
        deck.state.lock().volume = 0.0;
        assert_eq!(deck.adjust_volume(-0.05), 0.0);

        // Garbage deltas are ignored
        assert_eq!(deck.adjust_volume(f32::NAN), 0.0);
    }

    #[test]
    fn test_speed_clamps_and_snaps() {
        let deck = deck_with(ramp_track(10, 100), DeckConfig::default());
        assert_eq!(deck.speed(), 1.0);

        assert_eq!(deck.adjust_speed(5.0), 2.0);
        assert_eq!(deck.adjust_speed(0.1), 2.0);
        assert_eq!(deck.adjust_speed(-5.0), 0.5);
        assert_eq!(deck.adjust_speed(-0.1), 0.5);

        // 0.5 + 0.1 * 5 accumulates rounding error but lands on unity
        for _ in 0..5 {
            deck.adjust_speed(0.1);
        }
        assert_eq!(deck.speed(), 1.0);
    }

    #[test]
    fn test_double_speed_render() {
        let deck = deck_with(ramp_track(200, 44100), DeckConfig::default());
        start(&deck);
        deck.adjust_speed(1.0);

        let out = deck.render(40);
        assert_eq!(deck.cursor(), 80);
        assert_eq!(out[0], 0.0);
        assert!((out[39 * 2] - 79.0).abs() < 1e-4);
        // First channel is broadcast
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(deck.is_playing());
    }

    #[test]
    fn test_half_speed_render() {
        let deck = deck_with(ramp_track(200, 44100), DeckConfig::default());
        start(&deck);
        deck.adjust_speed(-0.5);

        let out = deck.render(40);
        assert_eq!(deck.cursor(), 20);
        assert!((out[39 * 2] - 19.0).abs() < 1e-4);
        assert!(out.windows(2).step_by(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_varispeed_end_of_track() {
        let deck = deck_with(ramp_track(100, 44100), DeckConfig::default());
        start(&deck);
        deck.adjust_speed(1.0);
        set_cursor(&deck, 90);

        let mut out = vec![0.0; 40 * 2];
        assert_eq!(deck.render_into(&mut out, 2), RenderStatus::Ended);
        assert_eq!(deck.cursor(), 100);
        assert!(!deck.is_playing());
        assert!(out[10..].iter().all(|s| *s == 0.0));
        assert_eq!(out[0], 90.0);
    }

    #[test]
    fn test_seek_clamps() {
        let track = ramp_track(100, 44100);
        let deck = deck_with(track.clone(), DeckConfig::default());
        start(&deck);

        deck.seek(50);
        assert_eq!(deck.render(4).as_slice(), track.frame_range(50, 54));

        deck.seek(1000);
        assert_eq!(deck.cursor(), 100);
        assert!(deck.render(4).iter().all(|s| *s == 0.0));
        assert!(!deck.is_playing());
    }

    #[test]
    fn test_mono_track_on_stereo_device() {
        let track = TrackBuffer::from_fn(8, 1, 44100, |f, _| f as f32);
        let deck = deck_with(track, DeckConfig::default());
        start(&deck);

        let mut out = vec![0.0; 4 * 2];
        assert_eq!(deck.render_into(&mut out, 2), RenderStatus::Playing);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_zero_channels_is_harmless() {
        let deck = deck_with(ramp_track(10, 100), DeckConfig::default());
        start(&deck);
        let mut out = vec![1.0; 4];
        assert_eq!(deck.render_into(&mut out, 0), RenderStatus::Silent);
        assert_eq!(deck.cursor(), 0);
    }

    #[test]
    fn test_toggle_is_gated() {
        let deck = deck_with(ramp_track(10, 100), DeckConfig::default());
        assert!(deck.toggle());
        assert!(deck.is_playing());

        // Within the cooldown the second toggle is dropped
        assert!(!deck.toggle());
        assert!(deck.is_playing());
    }

    #[test]
    fn test_toggle_twice_unthrottled() {
        let deck = deck_with(ramp_track(10, 100), unthrottled());
        assert!(deck.toggle());
        tick();
        assert!(deck.toggle());
        assert!(!deck.is_playing());
    }

    #[test]
    fn test_cooperative_fade_out() {
        // 100 Hz at 0.1s per step: 10 frames per level
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        start(&deck);

        assert!(deck.fade_out());
        assert!(deck.is_fading());
        assert_eq!(deck.volume(), 1.0);

        for step in 0..FADE_STEPS {
            let expected = (10 - step) as f32 / 10.0;
            let out = deck.render(10);
            assert!(out.iter().all(|s| *s == expected), "step {}", step);
        }

        assert!(!deck.is_fading());
        assert_eq!(deck.volume(), 0.0);
        assert!(deck.render(10).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_cooperative_fade_in_spans_blocks() {
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        start(&deck);
        deck.state.lock().volume = 0.0;

        assert!(deck.fade_in());
        // A 15-frame block straddles the first two levels
        let out = deck.render(15);
        assert!(out[..10].iter().all(|s| *s == 0.0));
        assert!(out[10..].iter().all(|s| *s == 0.1));

        let rest = deck.render(95);
        assert_eq!(*rest.last().unwrap(), 1.0);
        assert!(!deck.is_fading());
        assert_eq!(deck.volume(), 1.0);
    }

    #[test]
    fn test_fade_advances_while_paused() {
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        assert!(deck.fade_out());

        let out = deck.render(110);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(deck.cursor(), 0);
        assert!(!deck.is_fading());
        assert_eq!(deck.volume(), 0.0);
    }

    #[test]
    fn test_fade_is_gated() {
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        assert!(deck.fade_out());
        assert!(!deck.fade_in());
        assert_eq!(deck.volume(), 1.0);
    }

    #[test]
    fn test_volume_change_cancels_fade() {
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        start(&deck);
        assert!(deck.fade_out());
        deck.render(25);
        assert_eq!(deck.volume(), 0.8);

        let volume = deck.adjust_volume(-0.1);
        assert!((volume - 0.7).abs() < 1e-6);
        assert!(!deck.is_fading());

        let out = deck.render(10);
        assert!(out.iter().all(|s| (*s - volume).abs() < 1e-6));
    }

    #[test]
    fn test_blocking_fade() {
        let config = DeckConfig {
            fade: FadeConfig {
                step_secs: 0.01,
                mode: FadeMode::Blocking,
            },
            ..Default::default()
        };
        let deck = deck_with(constant_track(1000, 100), config);

        let started = Instant::now();
        assert!(deck.fade_out());
        assert!(started.elapsed() >= Duration::from_millis(110));
        assert_eq!(deck.volume(), 0.0);
        assert!(!deck.is_fading());
    }

    #[test]
    fn test_blocking_fade_holds_lock_against_render() {
        let config = DeckConfig {
            gate: GateConfig::unthrottled(),
            fade: FadeConfig {
                step_secs: 0.02,
                mode: FadeMode::Blocking,
            },
            ..Default::default()
        };
        let deck = Arc::new(deck_with(constant_track(48000 * 60, 48000), config));
        start(&deck);

        let fader = {
            let deck = Arc::clone(&deck);
            thread::spawn(move || deck.fade_out())
        };

        let mut block = vec![0.0_f32; 64];
        let mut longest_wait = Duration::ZERO;
        let mut levels = Vec::new();
        loop {
            let done = fader.is_finished();
            let started = Instant::now();
            deck.render_into(&mut block, 1);
            longest_wait = longest_wait.max(started.elapsed());

            let level = block[0];
            assert!(
                block.iter().all(|s| *s == level),
                "block mixes gain levels: {:?}",
                block
            );
            assert!(
                (level * 10.0 - (level * 10.0).round()).abs() < 1e-4,
                "level {} is not a 10% step",
                level
            );
            levels.push(level);
            if done {
                break;
            }
        }

        assert!(fader.join().unwrap());
        // The fade never releases the lock between steps
        assert!(levels.iter().all(|l| *l == 1.0 || *l == 0.0), "{:?}", levels);
        assert_eq!(levels.last().copied(), Some(0.0));
        assert!(longest_wait >= Duration::from_millis(100), "{:?}", longest_wait);
    }

    #[test]
    fn test_settle_fade() {
        let deck = deck_with(constant_track(1000, 100), DeckConfig::default());
        assert!(deck.fade_out());
        assert!(deck.is_fading());
        assert_eq!(deck.volume(), 1.0);

        deck.settle_fade();
        assert!(!deck.is_fading());
        assert_eq!(deck.volume(), 0.0);

        // Nothing pending leaves the volume alone
        deck.adjust_volume(0.5);
        deck.settle_fade();
        assert_eq!(deck.volume(), 0.5);
    }

    #[test]
    fn test_load_reports_loaded_path() {
        let (deck, source) = playlist_deck(unthrottled());
        assert_eq!(deck.current_path(), Some(PathBuf::from("a.wav")));

        source.insert("outside.wav", ramp_track(40, 100));
        deck.load(Path::new("outside.wav")).unwrap();
        assert_eq!(deck.track_index(), 0);
        assert_eq!(deck.current_path(), Some(PathBuf::from("outside.wav")));
        assert_eq!(deck.snapshot().track_path.as_deref(), Some("outside.wav"));

        // A failed load keeps reporting the file that is still playing
        assert!(deck.load(Path::new("missing.wav")).is_err());
        assert_eq!(deck.current_path(), Some(PathBuf::from("outside.wav")));

        assert!(deck.next_track().unwrap());
        assert_eq!(deck.current_path(), Some(PathBuf::from("b.wav")));
    }

    #[test]
    fn test_in_memory_track_has_no_path() {
        let deck = deck_with(ramp_track(10, 100), DeckConfig::default());
        deck.add_track("later.wav");
        assert_eq!(deck.current_path(), None);
        assert_eq!(deck.snapshot().track_path, None);
    }

    #[test]
    fn test_load_resets_position() {
        let source = Arc::new(MemorySource::new());
        source.insert("next.wav", ramp_track(50, 48000));
        let deck = Deck::from_track("A", ramp_track(100, 44100), source, DeckConfig::default()).unwrap();
        start(&deck);
        set_cursor(&deck, 60);
        deck.adjust_volume(-0.25);

        deck.load(Path::new("next.wav")).unwrap();
        assert_eq!(deck.cursor(), 0);
        assert!(!deck.is_playing());
        assert_eq!(deck.track().frames(), 50);
        assert_eq!(deck.sample_rate(), 48000);
        assert_eq!(deck.volume(), 0.75);
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let deck = deck_with(ramp_track(100, 44100), DeckConfig::default());
        start(&deck);
        set_cursor(&deck, 60);

        let err = deck.load(Path::new("missing.wav")).unwrap_err();
        assert_eq!(err.path(), Path::new("missing.wav"));
        assert!(deck.is_playing());
        assert_eq!(deck.cursor(), 60);
        assert_eq!(deck.track().frames(), 100);
    }

    #[test]
    fn test_playlist_wraps_both_ways() {
        let (deck, _) = playlist_deck(unthrottled());

        assert!(deck.next_track().unwrap());
        assert_eq!(deck.track_index(), 1);
        assert_eq!(deck.len_frames(), 20);
        assert_eq!(deck.current_path(), Some(PathBuf::from("b.wav")));

        tick();
        assert!(deck.next_track().unwrap());
        tick();
        assert!(deck.next_track().unwrap());
        assert_eq!(deck.track_index(), 0);
        assert_eq!(deck.track().frames(), 10);

        tick();
        assert!(deck.previous_track().unwrap());
        assert_eq!(deck.track_index(), 2);
        assert_eq!(deck.track().frames(), 30);
    }

    #[test]
    fn test_track_change_is_gated() {
        let (deck, _) = playlist_deck(DeckConfig::default());
        assert!(deck.next_track().unwrap());
        assert!(!deck.next_track().unwrap());
        assert_eq!(deck.track_index(), 1);
    }

    #[test]
    fn test_failed_track_change_keeps_index() {
        let (deck, _) = playlist_deck(unthrottled());
        deck.add_track("missing.wav");
        assert_eq!(deck.playlist().len(), 4);

        // Walk back from a to the missing entry at the end
        assert!(deck.previous_track().is_err());
        assert_eq!(deck.track_index(), 0);
        assert_eq!(deck.track().frames(), 10);
    }

    #[test]
    fn test_empty_playlist_track_change() {
        let deck = deck_with(ramp_track(10, 100), unthrottled());
        assert!(!deck.next_track().unwrap());
        assert!(!deck.previous_track().unwrap());
        assert_eq!(deck.track_index(), 0);
    }

    #[test]
    fn test_snapshot() {
        let (deck, _) = playlist_deck(DeckConfig::default());
        start(&deck);
        deck.render(5);

        let snapshot = deck.snapshot();
        assert_eq!(snapshot.name, "A");
        assert!(snapshot.playing);
        assert!((snapshot.position_secs - 0.05).abs() < 1e-9);
        assert!((snapshot.duration_secs - 0.1).abs() < 1e-9);
        assert_eq!(snapshot.track_path.as_deref(), Some("a.wav"));
        assert_eq!(snapshot.playlist_len, 3);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: DeckSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
