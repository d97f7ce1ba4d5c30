//! Gemini Live session client
//!
//! Streams microphone frames to Gemini's native audio model over the
//! bidirectional WebSocket API and reports the model's audio, transcriptions
//! and interruptions back as [`LiveEvent`]s.
//!
//! Each session runs on its own worker thread. The owner keeps a
//! [`LiveConnection`]; outbound audio goes through its [`LiveLink`] once the
//! handshake has completed.

pub mod transport;
pub mod types;
pub mod websocket;
pub mod worker;

pub use transport::{GeminiLiveTransport, LiveConnection, LiveEventSink, LiveLink, LiveTransport};
pub use types::{LiveEvent, LiveSetup, ServerMessage};
