//! Session lifecycle: connection state machine, audio routing and teardown.
//!
//! [`SessionManager`] lives on a single event-loop thread and owns every
//! per-connection resource. Asynchronous results (handshake, session
//! messages, capture output) come back as [`LoopEvent`]s tagged with the
//! generation of the connection that produced them. Teardown bumps the
//! generation, so anything arriving late from an old connection is dropped.

pub mod runtime;
pub mod state;
pub mod transcript;

pub use runtime::SessionHandle;
pub use state::{ConnectionState, SessionView, SharedSessionView, UiEvent};
pub use transcript::{Speaker, TranscriptItem, TranscriptLog, TRANSCRIPT_CAPACITY};

use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::api::gemini_live::{LiveConnection, LiveEvent, LiveSetup, LiveTransport, ServerMessage};
use crate::audio::{
    decode_audio_chunk, encode_frame, AudioBackend, AudioFrame, AudioOutput, CaptureCommand,
    CaptureMessage, CapturePort, CaptureSink, Microphone, PlaybackScheduler, SpeakingPulse,
    VolumeSmoother, OUTPUT_SAMPLE_RATE,
};
use crate::config::Config;
use crate::error::InterpreterError;

/// Control requests from the shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    StartRecording,
    StopRecording,
    Shutdown,
}

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum LoopEvent {
    Command(Command),
    Capture {
        generation: u64,
        message: CaptureMessage,
    },
    Live {
        generation: u64,
        event: LiveEvent,
    },
}

pub struct SessionManager {
    backend: Box<dyn AudioBackend>,
    transport: Box<dyn LiveTransport>,
    config: Config,
    loop_tx: mpsc::Sender<LoopEvent>,
    view: SharedSessionView,
    ui_tx: Option<mpsc::Sender<UiEvent>>,

    state: ConnectionState,
    generation: u64,
    error: Option<String>,

    output: Option<Box<dyn AudioOutput>>,
    microphone: Option<Box<dyn Microphone>>,
    capture: Option<CapturePort>,
    connection: Option<LiveConnection>,

    scheduler: PlaybackScheduler,
    user_volume: VolumeSmoother,
    model_volume: SpeakingPulse,
    is_recording: bool,
    transcripts: TranscriptLog,
}

impl SessionManager {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        transport: Box<dyn LiveTransport>,
        config: Config,
        loop_tx: mpsc::Sender<LoopEvent>,
        view: SharedSessionView,
        ui_tx: Option<mpsc::Sender<UiEvent>>,
    ) -> Self {
        Self {
            backend,
            transport,
            config,
            loop_tx,
            view,
            ui_tx,
            state: ConnectionState::Disconnected,
            generation: 0,
            error: None,
            output: None,
            microphone: None,
            capture: None,
            connection: None,
            scheduler: PlaybackScheduler::new(),
            user_volume: VolumeSmoother::new(),
            model_volume: SpeakingPulse::new(),
            is_recording: false,
            transcripts: TranscriptLog::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn transcripts(&self) -> &TranscriptLog {
        &self.transcripts
    }

    pub fn volume_user(&self) -> f32 {
        self.user_volume.value()
    }

    pub fn volume_model(&self) -> f32 {
        self.model_volume.value()
    }

    pub fn active_sources(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Whether the session currently holds any per-connection resource.
    pub fn holds_resources(&self) -> bool {
        self.output.is_some()
            || self.microphone.is_some()
            || self.capture.is_some()
            || self.connection.is_some()
    }

    // ------------------------------------------------------------------
    // Controls
    // ------------------------------------------------------------------

    /// Acquire audio devices and open the remote session.
    ///
    /// Completion arrives later as [`LiveEvent::Open`]; any failure along the
    /// way tears everything down and leaves the session in `Error`.
    pub fn connect(&mut self) {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "Connect ignored, session already active");
            return;
        }

        if !self.config.has_api_key() {
            self.fail(InterpreterError::MissingApiKey);
            return;
        }

        self.generation += 1;
        self.set_error(None);
        self.set_state(ConnectionState::Connecting);
        tracing::info!(generation = self.generation, "Connecting");

        if let Err(err) = self.open_resources() {
            self.fail(err);
        }
    }

    fn open_resources(&mut self) -> Result<(), InterpreterError> {
        self.output = Some(self.backend.open_output(OUTPUT_SAMPLE_RATE)?);
        self.microphone = Some(self.backend.acquire_microphone()?);

        let setup = LiveSetup::from_config(&self.config);
        let tx = self.loop_tx.clone();
        let generation = self.generation;
        let connection = self.transport.open(
            &setup,
            Box::new(move |event| {
                let _ = tx.send(LoopEvent::Live { generation, event });
            }),
        )?;
        self.connection = Some(connection);
        Ok(())
    }

    /// Release everything and return to `Disconnected`. Safe from any state.
    pub fn disconnect(&mut self) {
        self.teardown();
        if self.state != ConnectionState::Disconnected {
            tracing::info!("Disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn start_recording(&mut self) {
        self.set_recording(true);
    }

    pub fn stop_recording(&mut self) {
        self.set_recording(false);
    }

    fn set_recording(&mut self, value: bool) {
        if self.state != ConnectionState::Connected {
            tracing::debug!(state = %self.state, value, "Recording toggle ignored");
            return;
        }
        self.is_recording = value;
        if let Some(port) = self.capture.as_mut() {
            port.post(CaptureCommand::SetRecording(value));
        }
        self.sync_recording();
    }

    /// Release every per-connection resource. Idempotent.
    fn teardown(&mut self) {
        self.generation += 1;
        self.is_recording = false;

        if let Some(mut port) = self.capture.take() {
            port.post(CaptureCommand::SetRecording(false));
        }
        if let Some(mut microphone) = self.microphone.take() {
            microphone.release();
        }
        if let Some(mut output) = self.output.take() {
            self.scheduler.reset(output.as_mut());
            output.close();
        } else {
            self.scheduler.forget();
        }
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        self.user_volume.cancel_pending();
        self.sync_recording();
    }

    fn fail(&mut self, err: InterpreterError) {
        tracing::error!(error = ?err, "Session failed");
        self.teardown();
        self.set_error(Some(err.to_string()));
        self.set_state(ConnectionState::Error);
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Handle one loop event. Returns false once the loop should stop.
    pub fn handle_event(&mut self, event: LoopEvent) -> bool {
        self.handle_event_at(event, Instant::now())
    }

    pub fn handle_event_at(&mut self, event: LoopEvent, now: Instant) -> bool {
        match event {
            LoopEvent::Command(command) => return self.on_command(command),
            LoopEvent::Capture {
                generation,
                message,
            } => {
                if generation == self.generation {
                    self.on_capture(message);
                }
            }
            LoopEvent::Live { generation, event } => {
                if generation == self.generation {
                    self.on_live(event, now);
                } else {
                    tracing::trace!(generation, current = self.generation, "Stale live event");
                }
            }
        }
        true
    }

    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::Shutdown => {
                self.disconnect();
                return false;
            }
        }
        true
    }

    fn on_live(&mut self, event: LiveEvent, now: Instant) {
        match event {
            LiveEvent::Open => self.on_open(),
            LiveEvent::Message(message) => self.handle_server_message(message, now),
            LiveEvent::Close(reason) => {
                tracing::info!(?reason, "Session closed remotely");
                self.disconnect();
            }
            LiveEvent::Error(detail) => self.fail(InterpreterError::connection(detail)),
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.set_state(ConnectionState::Connected);
        tracing::info!("Session connected");

        let Some(microphone) = self.microphone.as_mut() else {
            return;
        };

        let tx = self.loop_tx.clone();
        let generation = self.generation;
        let sink: CaptureSink = Box::new(move |message| {
            let _ = tx.send(LoopEvent::Capture {
                generation,
                message,
            });
        });

        match microphone.start_capture(sink) {
            Ok(mut port) => {
                if self.is_recording {
                    port.post(CaptureCommand::SetRecording(true));
                }
                self.capture = Some(port);
            }
            Err(err) => {
                let err = match err {
                    err @ InterpreterError::ProcessorInit { .. } => err,
                    other => InterpreterError::processor_init(other),
                };
                tracing::error!(error = ?err, "Capture pipeline failed to start");
                self.set_error(Some(err.to_string()));
            }
        }
    }

    fn on_capture(&mut self, message: CaptureMessage) {
        match message {
            CaptureMessage::Volume(rms) => self.user_volume.push(rms),
            CaptureMessage::Audio(frame) => self.forward_frame(&frame),
        }
    }

    /// Encode a full frame and hand it to the session, if it is established.
    fn forward_frame(&mut self, frame: &AudioFrame) {
        let Some(link) = self.connection.as_ref().and_then(|c| c.link()) else {
            tracing::trace!("Frame dropped, session not established");
            return;
        };
        match encode_frame(frame) {
            Ok(payload) => {
                if !link.send_audio(payload) {
                    tracing::debug!("Frame dropped, session worker gone");
                }
            }
            Err(err) => tracing::warn!(%err, "Frame not sent"),
        }
    }

    /// Route one inbound message: audio to the scheduler, interruptions to a
    /// hard stop, transcriptions to the log.
    pub fn handle_server_message(&mut self, message: ServerMessage, now: Instant) {
        if let Some(chunk) = message.audio_chunk.as_deref() {
            self.play_chunk(chunk, now);
        }

        if message.interrupted {
            if let Some(output) = self.output.as_mut() {
                self.scheduler.interrupt(output.as_mut());
            }
        }

        let is_final = message.turn_complete;
        let mut appended = false;
        if let Some(text) = message.input_transcript.as_deref() {
            appended |= self.append_transcript(text, Speaker::User, is_final);
        }
        if let Some(text) = message.output_transcript.as_deref() {
            appended |= self.append_transcript(text, Speaker::Model, is_final);
        }
        if appended {
            self.sync_transcripts();
        }
    }

    fn play_chunk(&mut self, chunk: &str, now: Instant) {
        let Some(output) = self.output.as_mut() else {
            return;
        };
        let buffer = match decode_audio_chunk(chunk, OUTPUT_SAMPLE_RATE) {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::warn!(%err, "Audio chunk dropped");
                return;
            }
        };
        match self.scheduler.schedule(output.as_mut(), &buffer) {
            Ok(scheduled) => {
                self.model_volume
                    .pulse(now, Duration::from_secs_f64(scheduled.duration));
                self.sync_volumes();
            }
            Err(err) => tracing::warn!(%err, "Audio chunk not scheduled"),
        }
    }

    fn append_transcript(&mut self, text: &str, sender: Speaker, is_final: bool) -> bool {
        match self.transcripts.push(text, sender, is_final) {
            Some(item) => {
                self.emit(UiEvent::Transcript(item));
                true
            }
            None => false,
        }
    }

    /// Per-frame tick: apply coalesced volume updates and expire pulses.
    pub fn on_frame(&mut self, now: Instant) {
        let user = self.user_volume.on_frame();
        let model = self.model_volume.on_frame(now);
        if let Some(output) = self.output.as_mut() {
            self.scheduler.reap(output.as_mut());
        }
        if user || model {
            self.sync_volumes();
        }
    }

    // ------------------------------------------------------------------
    // Shell publication
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        if let Ok(mut view) = self.view.lock() {
            view.connection_state = state;
        }
        self.emit(UiEvent::StateChanged(state));
    }

    fn set_error(&mut self, error: Option<String>) {
        self.error = error.clone();
        if let Ok(mut view) = self.view.lock() {
            view.error = error.clone();
        }
        if let Some(message) = error {
            self.emit(UiEvent::Error(message));
        }
    }

    fn sync_volumes(&self) {
        if let Ok(mut view) = self.view.lock() {
            view.volume_user = self.user_volume.value();
            view.volume_model = self.model_volume.value();
        }
    }

    fn sync_recording(&self) {
        if let Ok(mut view) = self.view.lock() {
            view.is_recording = self.is_recording;
        }
    }

    fn sync_transcripts(&self) {
        if let Ok(mut view) = self.view.lock() {
            view.transcripts = self.transcripts.to_vec();
        }
    }

    fn emit(&self, event: UiEvent) {
        if let Some(tx) = self.ui_tx.as_ref() {
            let _ = tx.send(event);
        }
    }
}
