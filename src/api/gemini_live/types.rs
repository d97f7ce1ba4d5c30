//! Types for the Gemini Live session

use serde::Deserialize;

use crate::config::Config;

/// Everything needed to open one live session.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveSetup {
    pub api_key: String,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
}

impl LiveSetup {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.trim().to_string(),
            model: config.live_model.clone(),
            voice_name: config.voice_name.clone(),
            system_instruction: config.system_instruction.clone(),
        }
    }
}

/// The parts of a `serverContent` message the interpreter acts on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerMessage {
    /// Base64 PCM16 mono audio from the first part of the model turn
    pub audio_chunk: Option<String>,
    pub interrupted: bool,
    pub input_transcript: Option<String>,
    pub output_transcript: Option<String>,
    pub turn_complete: bool,
}

/// Events sent from the session worker to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Handshake finished; outbound audio is accepted from now on
    Open,
    Message(ServerMessage),
    /// Remote side closed the session, with its reason if it gave one
    Close(Option<String>),
    Error(String),
}

// --- Wire shapes (inbound) ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireServerFrame {
    pub server_content: Option<WireServerContent>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireServerContent {
    pub model_turn: Option<WireTurn>,
    #[serde(default)]
    pub interrupted: bool,
    pub input_transcription: Option<WireTranscription>,
    pub output_transcription: Option<WireTranscription>,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct WireTurn {
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePart {
    pub inline_data: Option<WireBlob>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct WireBlob {
    pub data: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct WireTranscription {
    pub text: Option<String>,
}

impl From<WireServerContent> for ServerMessage {
    fn from(content: WireServerContent) -> Self {
        let audio_chunk = content
            .model_turn
            .and_then(|turn| turn.parts.into_iter().next())
            .and_then(|part| part.inline_data)
            .and_then(|blob| blob.data)
            .filter(|data| !data.is_empty());

        Self {
            audio_chunk,
            interrupted: content.interrupted,
            input_transcript: content.input_transcription.and_then(|t| t.text),
            output_transcript: content.output_transcription.and_then(|t| t.text),
            turn_complete: content.turn_complete,
        }
    }
}
