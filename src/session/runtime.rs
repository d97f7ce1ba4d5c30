//! Event-loop thread hosting the session manager

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::state::{SessionView, SharedSessionView, UiEvent};
use super::{Command, LoopEvent, SessionManager};
use crate::api::gemini_live::{GeminiLiveTransport, LiveTransport};
use crate::audio::{AudioBackend, CpalBackend};
use crate::config::Config;

/// Display refresh tick driving volume smoothing (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Builds the audio backend and transport on the loop thread, so neither
/// has to be `Send`.
pub type BackendFactory =
    Box<dyn FnOnce() -> (Box<dyn AudioBackend>, Box<dyn LiveTransport>) + Send + 'static>;

/// Handle to a running session loop. Dropping it shuts the loop down.
pub struct SessionHandle {
    tx: mpsc::Sender<LoopEvent>,
    view: SharedSessionView,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Start a session loop on the host's default audio devices.
    pub fn spawn(
        config: Config,
        ui_tx: Option<mpsc::Sender<UiEvent>>,
    ) -> std::io::Result<Self> {
        Self::spawn_with(
            config,
            ui_tx,
            Box::new(|| {
                (
                    Box::new(CpalBackend) as Box<dyn AudioBackend>,
                    Box::new(GeminiLiveTransport::new()) as Box<dyn LiveTransport>,
                )
            }),
        )
    }

    pub fn spawn_with(
        config: Config,
        ui_tx: Option<mpsc::Sender<UiEvent>>,
        factory: BackendFactory,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let view: SharedSessionView = Arc::new(Mutex::new(SessionView::default()));

        let loop_tx = tx.clone();
        let loop_view = Arc::clone(&view);
        let thread = std::thread::Builder::new()
            .name("session-loop".to_string())
            .spawn(move || {
                let (backend, transport) = factory();
                let manager =
                    SessionManager::new(backend, transport, config, loop_tx, loop_view, ui_tx);
                run_event_loop(manager, rx);
            })?;

        Ok(Self {
            tx,
            view,
            thread: Some(thread),
        })
    }

    /// Copy of the current view.
    pub fn snapshot(&self) -> SessionView {
        match self.view.lock() {
            Ok(view) => view.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn start_recording(&self) {
        self.send(Command::StartRecording);
    }

    pub fn stop_recording(&self) {
        self.send(Command::StopRecording);
    }

    fn send(&self, command: Command) {
        if self.tx.send(LoopEvent::Command(command)).is_err() {
            tracing::warn!(?command, "Session loop is gone");
        }
    }

    /// Disconnect and wait for the loop thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(LoopEvent::Command(Command::Shutdown));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Session loop panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drive `manager` until shutdown: events in arrival order, plus a frame tick.
pub fn run_event_loop(mut manager: SessionManager, rx: mpsc::Receiver<LoopEvent>) {
    tracing::debug!("Session loop started");
    let mut next_frame = Instant::now() + FRAME_INTERVAL;

    loop {
        let timeout = next_frame.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                if !manager.handle_event(event) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                manager.disconnect();
                break;
            }
        }

        let now = Instant::now();
        if now >= next_frame {
            manager.on_frame(now);
            next_frame = now + FRAME_INTERVAL;
        }
    }

    tracing::debug!("Session loop stopped");
}
