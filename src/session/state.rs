//! Shared state read by the shell

use std::fmt;
use std::sync::{Arc, Mutex};

use super::transcript::TranscriptItem;

/// Connection lifecycle state
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Failed; holds no resources and is left through a new connect
    Error,
}

impl ConnectionState {
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Snapshot of everything the shell displays
#[derive(Clone, Debug, Default)]
pub struct SessionView {
    pub connection_state: ConnectionState,
    /// Most recent transcript fragments, oldest first
    pub transcripts: Vec<TranscriptItem>,
    /// Smoothed microphone loudness in [0, 1]
    pub volume_user: f32,
    /// Model "speaking" level in [0, 1]
    pub volume_model: f32,
    pub is_recording: bool,
    pub error: Option<String>,
}

pub type SharedSessionView = Arc<Mutex<SessionView>>;

/// Notifications pushed to the shell as they happen
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    StateChanged(ConnectionState),
    Transcript(TranscriptItem),
    Error(String),
}
