//! Configuration for the interpreter.
//!
//! - `config_struct`: Config struct definition
//! - `defaults`: default model, voice and interpreter instruction
//! - `io`: config loading, saving, and environment overrides

mod config_struct;
mod defaults;
mod io;

pub use config_struct::Config;
pub use defaults::{DEFAULT_LIVE_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE_NAME};
pub use io::{apply_env_overrides, get_config_path, load_config, load_config_from, save_config};
