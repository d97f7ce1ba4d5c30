//! Command-line interface for the interpreter shell
//!
//! Handles argument parsing and logging configuration.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Synapse - push-to-talk Polish/English interpreter
#[derive(Parser, Debug)]
#[command(name = "synapse")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Gemini API key (overrides config file and environment)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Path to an alternative config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the effective config back to disk before starting
    #[arg(long)]
    pub save_config: bool,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Default filter directive when `RUST_LOG` is not set
    pub fn default_directive(&self) -> &'static str {
        if self.verbose {
            "synapse_interpreter=debug,synapse=debug,info"
        } else {
            "info"
        }
    }
}

/// Initialize the tracing subscriber based on CLI arguments
pub fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.default_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = Args::parse_from([
            "synapse",
            "--api-key",
            "k",
            "--config",
            "/tmp/c.json",
            "--save-config",
            "-v",
        ]);
        assert_eq!(args.api_key.as_deref(), Some("k"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(args.save_config);
        assert!(args.verbose);
        assert!(args.default_directive().contains("debug"));
    }

    #[test]
    fn defaults_are_quiet() {
        let args = Args::parse_from(["synapse"]);
        assert!(args.api_key.is_none());
        assert!(!args.save_config);
        assert_eq!(args.default_directive(), "info");
    }
}
