//! Config struct definition.

use serde::{Deserialize, Serialize};

use super::defaults::{default_live_model, default_system_instruction, default_voice_name};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gemini_api_key: String,
    /// Native-audio model used for the live session
    #[serde(default = "default_live_model")]
    pub live_model: String,
    /// Prebuilt voice the model answers with
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,
}

impl Config {
    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}
