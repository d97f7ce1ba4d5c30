//! Worker thread for one Gemini Live session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tungstenite::Message;

use super::transport::{LiveEventSink, LiveLink};
use super::types::{LiveEvent, LiveSetup};
use super::websocket::{
    connect_live_websocket, is_setup_complete, parse_error, parse_go_away, parse_server_message,
    send_live_setup, send_realtime_audio, set_socket_short_timeout, LiveSocket,
};
use crate::audio::WirePayload;

const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

/// What the read loop should do after a message.
enum Flow {
    Continue,
    Stop,
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

fn frame_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(data) => String::from_utf8(data.to_vec()).ok(),
        _ => None,
    }
}

/// Run one session: connect, handshake, then pump audio out and messages in
/// until the owner raises `shutdown` or the remote side goes away.
///
/// Nothing is reported after `shutdown` is observed.
pub fn run_live_session(
    setup: LiveSetup,
    link: Arc<OnceLock<LiveLink>>,
    outbound_tx: mpsc::Sender<WirePayload>,
    outbound: mpsc::Receiver<WirePayload>,
    shutdown: Arc<AtomicBool>,
    mut on_event: LiveEventSink,
) {
    let mut socket = match connect_live_websocket(&setup.api_key) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Live connection failed");
            if !shutdown.load(Ordering::SeqCst) {
                on_event(LiveEvent::Error(format!("Connection failed: {}", e)));
            }
            return;
        }
    };

    if let Err(e) = send_live_setup(&mut socket, &setup)
        .and_then(|_| set_socket_short_timeout(&mut socket))
    {
        tracing::error!(error = %e, "Live setup failed");
        if !shutdown.load(Ordering::SeqCst) {
            on_event(LiveEvent::Error(format!("Setup failed: {}", e)));
        }
        let _ = socket.close(None);
        return;
    }

    match wait_for_setup(&mut socket, &shutdown) {
        Ok(true) => {}
        Ok(false) => {
            let _ = socket.close(None);
            return;
        }
        Err(reason) => {
            tracing::error!(%reason, "Live handshake failed");
            if !shutdown.load(Ordering::SeqCst) {
                on_event(LiveEvent::Error(reason));
            }
            let _ = socket.close(None);
            return;
        }
    }

    if link.set(LiveLink::new(outbound_tx)).is_err() {
        tracing::warn!("Live link already set");
    }
    tracing::info!(model = %setup.model, "Live session open");
    on_event(LiveEvent::Open);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            let _ = socket.close(None);
            let _ = socket.flush();
            tracing::debug!("Live session closed by owner");
            return;
        }

        // Drain queued frames before blocking on the next read.
        loop {
            match outbound.try_recv() {
                Ok(payload) => {
                    if let Err(e) = send_realtime_audio(&mut socket, &payload) {
                        tracing::error!(error = %e, "Live send failed");
                        if !shutdown.load(Ordering::SeqCst) {
                            on_event(LiveEvent::Error(format!("Send failed: {}", e)));
                        }
                        return;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        match socket.read() {
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .filter(|r| !r.is_empty());
                tracing::info!(?reason, "Live session closed by server");
                if !shutdown.load(Ordering::SeqCst) {
                    on_event(LiveEvent::Close(reason));
                }
                return;
            }
            Ok(msg) => {
                let Some(text) = frame_text(msg) else {
                    continue;
                };
                if let Flow::Stop = dispatch_text(&text, &shutdown, &mut on_event) {
                    let _ = socket.close(None);
                    return;
                }
            }
            Err(ref e) if is_timeout(e) => {}
            Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => {
                if !shutdown.load(Ordering::SeqCst) {
                    on_event(LiveEvent::Close(None));
                }
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Live read failed");
                if !shutdown.load(Ordering::SeqCst) {
                    on_event(LiveEvent::Error(format!("Read error: {}", e)));
                }
                return;
            }
        }
    }
}

/// Wait for `setupComplete`. `Ok(false)` means the owner gave up first.
fn wait_for_setup(socket: &mut LiveSocket, shutdown: &AtomicBool) -> Result<bool, String> {
    let setup_start = Instant::now();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }

        match socket.read() {
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .unwrap_or_default();
                return Err(format!("Closed during setup: {}", reason));
            }
            Ok(msg) => {
                let Some(text) = frame_text(msg) else {
                    continue;
                };
                if is_setup_complete(&text) {
                    return Ok(true);
                }
                if let Some(error) = parse_error(&text) {
                    return Err(error);
                }
            }
            Err(ref e) if is_timeout(e) => {
                if setup_start.elapsed() > SETUP_TIMEOUT {
                    return Err("Setup timeout".to_string());
                }
            }
            Err(e) => return Err(format!("Setup error: {}", e)),
        }
    }
}

fn dispatch_text(text: &str, shutdown: &AtomicBool, on_event: &mut LiveEventSink) -> Flow {
    if shutdown.load(Ordering::SeqCst) {
        return Flow::Stop;
    }

    if let Some(error) = parse_error(text) {
        tracing::error!(%error, "Live server error");
        on_event(LiveEvent::Error(error));
        return Flow::Stop;
    }

    if let Some(time_left) = parse_go_away(text) {
        tracing::warn!(%time_left, "Live server is going away");
        return Flow::Continue;
    }

    if let Some(message) = parse_server_message(text) {
        tracing::trace!(
            audio = message.audio_chunk.is_some(),
            interrupted = message.interrupted,
            turn_complete = message.turn_complete,
            "Live message"
        );
        on_event(LiveEvent::Message(message));
    }

    Flow::Continue
}
