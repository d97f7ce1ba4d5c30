//! Push-to-talk interpreter client for Gemini Live.
//!
//! Microphone audio is captured into fixed frames, streamed to a realtime
//! speech model, and the translated speech it returns is played back
//! gaplessly while a transcript is kept.

pub mod api;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod shell;

pub use error::InterpreterError;
pub use session::{ConnectionState, SessionHandle, SessionManager, SessionView, UiEvent};
