//! Config Default implementation.

use super::config_struct::Config;

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

pub const DEFAULT_VOICE_NAME: &str = "Puck";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a simultaneous interpreter for Polish and English. Your goal is extreme fluency.
If the user speaks Polish, output English audio immediately.
If the user speaks English, output Polish audio immediately.
Match the speaker's emotion, speed, and tone.
Use idiomatic, native phrasing (Mother Tongue level).
Do not apologize or explain; just translate.
Maintain a continuous flow.";

pub fn default_live_model() -> String {
    DEFAULT_LIVE_MODEL.to_string()
}

pub fn default_voice_name() -> String {
    DEFAULT_VOICE_NAME.to_string()
}

pub fn default_system_instruction() -> String {
    DEFAULT_SYSTEM_INSTRUCTION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            live_model: default_live_model(),
            voice_name: default_voice_name(),
            system_instruction: default_system_instruction(),
        }
    }
}
