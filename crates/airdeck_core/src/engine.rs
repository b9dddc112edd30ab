//! Audio Engine - Main Entry Point
//!
//! The AudioEngine owns a control thread that holds the [`Session`] and
//! coordinates communication between the caller and the audio callbacks.
//!
//! # Architecture
//!
//! ```text
//! caller ──Command──▶ control thread (Session) ──render──▶ cpal callbacks
//!   ▲                        │                                  │
//!   └─────────Event──────────┴──────────────Event───────────────┘
//! ```
//!
//! Cpal streams are not `Send`, so the session is built on the control
//! thread and never leaves it. Decks are shared by `Arc` so the caller can
//! still read their state directly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::deck::Deck;
use crate::device::OutputDevice;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, ControlEvent, Event, Side};
use crate::session::Session;

/// The main audio engine controller
///
/// This struct lives on the caller's thread and communicates with the
/// control thread via channels.
pub struct AudioEngine {
    /// Channel for sending commands to the control thread
    command_sender: Sender<Command>,

    /// Channel for receiving events from the control thread and callbacks
    event_receiver: Receiver<Event>,

    /// Handle to the control thread
    control_thread: Option<JoinHandle<()>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Whether output streams are open
    is_running: Arc<AtomicBool>,

    deck_a: Arc<Deck>,
    deck_b: Option<Arc<Deck>>,

    config: EngineConfig,
}

impl AudioEngine {
    /// Create an engine around one or two decks
    pub fn new(deck_a: Deck, deck_b: Option<Deck>, config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;

        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = unbounded::<Event>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));

        let deck_a = Arc::new(deck_a);
        let deck_b = deck_b.map(Arc::new);

        // Clone for the control thread
        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);
        let deck_a_clone = Arc::clone(&deck_a);
        let deck_b_clone = deck_b.clone();
        let stream_config = config.stream.clone();

        let control_thread = thread::Builder::new()
            .name("airdeck-control".into())
            .spawn(move || {
                let session = Session::new(
                    deck_a_clone,
                    deck_b_clone,
                    stream_config,
                    event_sender.clone(),
                );
                Self::control_thread_main(
                    session,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                );
            })
            .map_err(|e| EngineError::ConfigError(format!("Failed to spawn control thread: {}", e)))?;

        Ok(Self {
            command_sender,
            event_receiver,
            control_thread: Some(control_thread),
            shutdown_flag,
            is_running,
            deck_a,
            deck_b,
            config,
        })
    }

    /// Open the output streams
    pub fn start(&self) -> EngineResult<()> {
        self.send_command(Command::Start)
    }

    /// Close the output streams
    pub fn stop(&self) -> EngineResult<()> {
        self.send_command(Command::Stop)
    }

    /// Route a control event to its deck
    pub fn send(&self, event: ControlEvent) -> EngineResult<()> {
        self.send_command(Command::Control(event))
    }

    /// Append a track to a deck's playlist
    pub fn add_track(&self, side: Side, path: impl Into<PathBuf>) -> EngineResult<()> {
        self.send_command(Command::AddTrack {
            side,
            path: path.into(),
        })
    }

    /// Request state update
    pub fn request_state(&self) -> EngineResult<()> {
        self.send_command(Command::RequestState)
    }

    /// Check if the output streams are open
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event (blocking)
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    /// Get next event, giving up after `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// The deck on `side`, for direct state reads
    pub fn deck(&self, side: Side) -> Option<&Arc<Deck>> {
        match side {
            Side::Left => Some(&self.deck_a),
            Side::Right => self.deck_b.as_ref(),
        }
    }

    /// Get all available output devices
    pub fn list_devices(&self) -> EngineResult<Vec<OutputDevice>> {
        OutputDevice::enumerate()
    }

    /// Get current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Send command to the control thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// Control thread main loop
    fn control_thread_main(
        mut session: Session,
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
    ) {
        info!("Control thread started");

        while !shutdown_flag.load(Ordering::SeqCst) {
            // Timeout so the shutdown flag and stream housekeeping get a look in
            match command_receiver.recv_timeout(Duration::from_millis(16)) {
                Ok(command) => match command {
                    Command::Start => match session.start() {
                        Ok(()) => {
                            is_running.store(true, Ordering::SeqCst);
                            let _ = event_sender.send(Event::Started);
                        }
                        Err(e) => {
                            error!("Failed to start session: {}", e);
                            let _ = event_sender.send(Event::error(e));
                        }
                    },

                    Command::Stop => match session.stop() {
                        Ok(()) => {
                            is_running.store(false, Ordering::SeqCst);
                            let _ = event_sender.send(Event::Stopped);
                        }
                        Err(e) => {
                            warn!("Failed to stop session: {}", e);
                            let _ = event_sender.send(Event::error(e));
                        }
                    },

                    Command::Control(event) => {
                        if let Err(e) = session.handle(event) {
                            warn!(side = %event.side, "Control event failed: {}", e);
                            let _ = event_sender.send(Event::error(e));
                        }
                    }

                    Command::AddTrack { side, path } => {
                        if let Err(e) = session.add_track(side, path) {
                            warn!("Failed to add track: {}", e);
                            let _ = event_sender.send(Event::error(e));
                        }
                    }

                    Command::RequestState => {
                        let _ = event_sender.send(Event::StateUpdate {
                            is_running: session.is_running(),
                            decks: session.snapshots(),
                        });
                    }

                    Command::Shutdown => {
                        info!("Shutdown requested");
                        break;
                    }
                },
                Err(RecvTimeoutError::Timeout) => session.tick(),
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Command channel disconnected");
                    break;
                }
            }
        }

        // Cleanup
        drop(session);
        is_running.store(false, Ordering::SeqCst);
        info!("Control thread shutting down");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        // Signal shutdown
        self.shutdown_flag.store(true, Ordering::SeqCst);

        // Send shutdown command
        let _ = self.command_sender.send(Command::Shutdown);

        // Wait for the control thread to finish
        if let Some(handle) = self.control_thread.take() {
            let _ = handle.join();
        }
    }
}
