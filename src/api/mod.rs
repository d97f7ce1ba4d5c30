pub mod gemini_live;

pub use gemini_live::{GeminiLiveTransport, LiveConnection, LiveEvent, LiveSetup, LiveTransport};
