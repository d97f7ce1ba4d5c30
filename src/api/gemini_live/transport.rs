//! Session handles shared between the orchestration loop and the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};

use super::types::{LiveEvent, LiveSetup};
use super::worker::run_live_session;
use crate::audio::WirePayload;
use crate::error::InterpreterError;

/// Callback receiving a session's events, in arrival order.
pub type LiveEventSink = Box<dyn FnMut(LiveEvent) + Send + 'static>;

/// Send half of an established session.
#[derive(Debug)]
pub struct LiveLink {
    tx: mpsc::Sender<WirePayload>,
}

impl LiveLink {
    pub fn new(tx: mpsc::Sender<WirePayload>) -> Self {
        Self { tx }
    }

    /// Queue an encoded frame for sending. Returns false once the session is gone.
    pub fn send_audio(&self, payload: WirePayload) -> bool {
        self.tx.send(payload).is_ok()
    }
}

/// Owner's view of one session.
///
/// The link slot is filled exactly once, when the handshake resolves; until
/// then outbound frames have nowhere to go and are dropped by the caller.
#[derive(Debug, Default)]
pub struct LiveConnection {
    link: Arc<OnceLock<LiveLink>>,
    shutdown: Arc<AtomicBool>,
}

impl LiveConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> Option<&LiveLink> {
        self.link.get()
    }

    /// Slot the session side fills in once it is ready.
    pub fn link_slot(&self) -> Arc<OnceLock<LiveLink>> {
        Arc::clone(&self.link)
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Ask the session to close. Idempotent.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens realtime sessions.
pub trait LiveTransport {
    /// Start opening a session. The handshake finishes asynchronously and is
    /// reported through `on_event` as [`LiveEvent::Open`] or an error.
    fn open(
        &mut self,
        setup: &LiveSetup,
        on_event: LiveEventSink,
    ) -> Result<LiveConnection, InterpreterError>;
}

/// Gemini Live over a TLS WebSocket, one worker thread per session.
#[derive(Debug, Default)]
pub struct GeminiLiveTransport;

impl GeminiLiveTransport {
    pub fn new() -> Self {
        Self
    }
}

impl LiveTransport for GeminiLiveTransport {
    fn open(
        &mut self,
        setup: &LiveSetup,
        on_event: LiveEventSink,
    ) -> Result<LiveConnection, InterpreterError> {
        let connection = LiveConnection::new();
        let (tx, rx) = mpsc::channel();
        let link = connection.link_slot();
        let shutdown = connection.shutdown_flag();
        let setup = setup.clone();

        std::thread::Builder::new()
            .name("gemini-live".to_string())
            .spawn(move || run_live_session(setup, link, tx, rx, shutdown, on_event))
            .map_err(InterpreterError::connection)?;

        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_absent_until_set_then_forwards() {
        let connection = LiveConnection::new();
        assert!(connection.link().is_none());

        let (tx, rx) = mpsc::channel();
        connection.link_slot().set(LiveLink::new(tx)).unwrap();

        let payload = WirePayload {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: vec![1, 2],
        };
        assert!(connection.link().unwrap().send_audio(payload.clone()));
        assert_eq!(rx.try_recv().unwrap(), payload);

        drop(rx);
        assert!(!connection.link().unwrap().send_audio(payload));
    }

    #[test]
    fn drop_raises_shutdown() {
        let connection = LiveConnection::new();
        let flag = connection.shutdown_flag();
        assert!(!flag.load(Ordering::SeqCst));
        drop(connection);
        assert!(flag.load(Ordering::SeqCst));
    }
}
