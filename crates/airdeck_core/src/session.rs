//! Dual-Deck Session
//!
//! Routes control events to deck A (left) or deck B (right), runs
//! crossfades across both decks, and owns the output streams. A session
//! lives on the control thread: cpal streams are not `Send`.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::deck::{Deck, DeckSnapshot};
use crate::device::OutputDevice;
use crate::error::{EngineError, EngineResult};
use crate::message::{Action, ControlEvent, Event, Side};
use crate::stream::DeckStream;

pub struct Session {
    deck_a: Arc<Deck>,
    deck_b: Option<Arc<Deck>>,
    config: StreamConfig,
    event_sender: Sender<Event>,

    /// Output device, held only while running
    device: Option<cpal::Device>,
    stream_a: Option<DeckStream>,
    stream_b: Option<DeckStream>,
}

impl Session {
    pub fn new(
        deck_a: Arc<Deck>,
        deck_b: Option<Arc<Deck>>,
        config: StreamConfig,
        event_sender: Sender<Event>,
    ) -> Self {
        Self {
            deck_a,
            deck_b,
            config,
            event_sender,
            device: None,
            stream_a: None,
            stream_b: None,
        }
    }

    /// The deck on `side`, if there is one
    pub fn deck(&self, side: Side) -> Option<&Arc<Deck>> {
        match side {
            Side::Left => Some(&self.deck_a),
            Side::Right => self.deck_b.as_ref(),
        }
    }

    fn stream_slot(&mut self, side: Side) -> &mut Option<DeckStream> {
        match side {
            Side::Left => &mut self.stream_a,
            Side::Right => &mut self.stream_b,
        }
    }

    pub fn is_running(&self) -> bool {
        self.device.is_some()
    }

    /// Open one output stream per deck
    pub fn start(&mut self) -> EngineResult<()> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        let device = OutputDevice::resolve(self.config.output_device.as_deref())?;
        let stream_a = self.open_stream(&device, Side::Left)?;
        // On failure stream_a is dropped here, closing it
        let stream_b = self.open_stream(&device, Side::Right)?;

        self.stream_a = stream_a;
        self.stream_b = stream_b;
        self.device = Some(device);
        info!(decks = self.decks().count(), "Session started");
        Ok(())
    }

    /// Close every output stream.
    ///
    /// Nothing walks a cooperative fade once its stream is gone, so pending
    /// fades jump to their final level.
    pub fn stop(&mut self) -> EngineResult<()> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }

        self.stream_a = None;
        self.stream_b = None;
        self.device = None;
        for (_, deck) in self.decks() {
            deck.settle_fade();
        }
        info!("Session stopped");
        Ok(())
    }

    fn open_stream(&self, device: &cpal::Device, side: Side) -> EngineResult<Option<DeckStream>> {
        let Some(deck) = self.deck(side) else {
            return Ok(None);
        };
        let stream = DeckStream::open(
            device,
            Arc::clone(deck),
            side,
            &self.config,
            self.event_sender.clone(),
        )?;
        Ok(Some(stream))
    }

    /// Reopen `side`'s stream if its deck changed format under it
    fn refresh_stream(&mut self, side: Side) -> EngineResult<()> {
        let Some(device) = self.device.clone() else {
            return Ok(());
        };
        let Some(deck) = self.deck(side).cloned() else {
            return Ok(());
        };

        let stale = match self.stream_slot(side).as_ref() {
            Some(stream) => !stream.matches(&deck),
            None => true,
        };
        if !stale {
            return Ok(());
        }

        let (channels, sample_rate) = deck.format();
        debug!(%side, channels, sample_rate, "Track format changed, reopening stream");

        // The old stream must go before the device is asked for a new one
        *self.stream_slot(side) = None;
        let stream = self.open_stream(&device, side)?;
        *self.stream_slot(side) = stream;
        Ok(())
    }

    /// Apply one control event.
    ///
    /// Events for a missing deck and actions the gate rejects are dropped
    /// without error. Failed track loads and stream reopen failures are
    /// returned.
    pub fn handle(&mut self, event: ControlEvent) -> EngineResult<()> {
        let ControlEvent { side, action } = event;
        let Some(deck) = self.deck(side).cloned() else {
            debug!(%side, ?action, "No deck on this side, event ignored");
            return Ok(());
        };

        match action {
            Action::Toggle => {
                deck.toggle();
            }
            Action::Volume(delta) => {
                deck.adjust_volume(delta);
            }
            Action::Speed(delta) => {
                deck.adjust_speed(delta);
            }
            Action::Fade => self.crossfade(side),
            Action::NextTrack => self.change_track(side, &deck, true)?,
            Action::PreviousTrack => self.change_track(side, &deck, false)?,
        }
        Ok(())
    }

    /// Fade `side` out, then fade the other deck in if there is one.
    /// Each deck gates its half independently.
    pub fn crossfade(&self, side: Side) {
        let Some(deck) = self.deck(side) else {
            debug!(%side, "No deck on this side, crossfade ignored");
            return;
        };

        let out = deck.fade_out();
        let into = self
            .deck(side.other())
            .map(|other| other.fade_in())
            .unwrap_or(false);
        debug!(%side, faded_out = out, faded_in = into, "Crossfade");
    }

    fn change_track(&mut self, side: Side, deck: &Deck, forward: bool) -> EngineResult<()> {
        let changed = if forward {
            deck.next_track()
        } else {
            deck.previous_track()
        };

        match changed {
            Ok(true) => {
                if let Some(path) = deck.current_path() {
                    let _ = self.event_sender.send(Event::TrackLoaded {
                        side,
                        path: path.display().to_string(),
                    });
                }
                self.refresh_stream(side)
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(%side, "Track change failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Append a track to `side`'s playlist
    pub fn add_track(&self, side: Side, path: PathBuf) -> EngineResult<()> {
        let deck = self.deck(side).ok_or(EngineError::NoDeck(side))?;
        deck.add_track(path);
        Ok(())
    }

    fn decks(&self) -> impl Iterator<Item = (Side, &Arc<Deck>)> {
        std::iter::once((Side::Left, &self.deck_a))
            .chain(self.deck_b.as_ref().map(|deck| (Side::Right, deck)))
    }

    fn stream(&self, side: Side) -> Option<&DeckStream> {
        match side {
            Side::Left => self.stream_a.as_ref(),
            Side::Right => self.stream_b.as_ref(),
        }
    }

    /// Deck state plus the output level each open stream last produced
    pub fn snapshots(&self) -> Vec<DeckSnapshot> {
        self.decks()
            .map(|(side, deck)| DeckSnapshot {
                peak: self.stream(side).map_or(0.0, DeckStream::peak),
                ..deck.snapshot()
            })
            .collect()
    }

    /// Housekeeping between commands: surfaces what the audio callbacks
    /// could not log themselves.
    pub fn tick(&self) {
        for stream in [&self.stream_a, &self.stream_b].into_iter().flatten() {
            if stream.meter.take_ended() {
                info!(side = %stream.side(), "Track ended");
            }
        }
    }
}
