//! Config I/O operations: load, save, and environment overrides.

use std::path::{Path, PathBuf};

use super::config_struct::Config;

/// Environment variables consulted for the API key, in priority order.
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

// ============================================================================
// CONFIG PATH
// ============================================================================

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_default()
        .join("synapse-interpreter");
    let _ = std::fs::create_dir_all(&config_dir);
    config_dir.join("config.json")
}

// ============================================================================
// CONFIG LOADING
// ============================================================================

/// Load config from the default location, falling back to defaults
pub fn load_config() -> Config {
    load_config_from(&get_config_path())
}

/// Load config from `path`. A missing or unreadable file yields defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "Config unreadable, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "Config malformed, using defaults");
            Config::default()
        }
    }
}

/// Fill the API key from the environment when one is set.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    for name in API_KEY_VARS {
        if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(var = name, "API key taken from environment");
            config.gemini_api_key = value;
            return;
        }
    }
}

// ============================================================================
// CONFIG SAVING
// ============================================================================

/// Save config to `path` as pretty JSON
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_LIVE_MODEL, DEFAULT_VOICE_NAME};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.live_model, DEFAULT_LIVE_MODEL);
        assert_eq!(config.voice_name, DEFAULT_VOICE_NAME);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            gemini_api_key: "secret".to_string(),
            voice_name: "Aoede".to_string(),
            ..Config::default()
        };

        save_config(&config, &path).unwrap();
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "gemini_api_key": "abc" }"#).unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.gemini_api_key, "abc");
        assert_eq!(config.live_model, DEFAULT_LIVE_MODEL);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn gemini_key_wins_over_generic_key() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, |name| match name {
            "GEMINI_API_KEY" => Some("gemini".to_string()),
            "API_KEY" => Some("generic".to_string()),
            _ => None,
        });
        assert_eq!(config.gemini_api_key, "gemini");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config {
            gemini_api_key: "from-file".to_string(),
            ..Config::default()
        };
        apply_overrides_from(&mut config, |name| match name {
            "GEMINI_API_KEY" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.gemini_api_key, "from-file");
        assert!(config.has_api_key());
    }
}
