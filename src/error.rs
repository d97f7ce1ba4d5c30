//! Error types for the interpreter client.
//!
//! The `Display` text of each variant is the message surfaced to the user,
//! so keep it short and human readable. Diagnostic detail lives in fields
//! that are logged but not shown.

/// Errors raised while acquiring resources or moving audio through the core.
#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    /// No API key configured.
    #[error("API key not found")]
    MissingApiKey,

    /// No microphone could be found.
    #[error("No microphone available. Please connect a microphone.")]
    NoInputDevice,

    /// No audio output device could be found.
    #[error("No audio output device available")]
    NoOutputDevice,

    /// The microphone exists but could not be opened (permission, busy, ...).
    #[error("Microphone unavailable: {0}")]
    InputDevice(String),

    /// The output device exists but could not be opened.
    #[error("Audio output unavailable: {0}")]
    OutputDevice(String),

    /// The remote session rejected the handshake or dropped.
    #[error("Connection error")]
    Connection { detail: String },

    /// The capture pipeline could not be built after the session opened.
    #[error("Failed to initialize audio processor")]
    ProcessorInit { detail: String },

    /// An inbound audio chunk could not be decoded.
    #[error("Failed to decode audio chunk: {0}")]
    Decode(String),

    /// An outbound frame could not be encoded.
    #[error("Failed to encode audio frame: {0}")]
    Encode(String),

    /// The output context refused to schedule a buffer.
    #[error("Failed to schedule playback: {0}")]
    Schedule(String),
}

impl InterpreterError {
    /// Build a connection error from any displayable cause.
    pub fn connection(detail: impl std::fmt::Display) -> Self {
        Self::Connection {
            detail: detail.to_string(),
        }
    }

    /// Build a processor-initialization error from any displayable cause.
    pub fn processor_init(detail: impl std::fmt::Display) -> Self {
        Self::ProcessorInit {
            detail: detail.to_string(),
        }
    }
}
