use std::io::BufRead;
use std::sync::mpsc;

use anyhow::Result;
use clap::Parser;

use synapse_interpreter::cli::{init_logging, Args};
use synapse_interpreter::config::{
    apply_env_overrides, get_config_path, load_config_from, save_config,
};
use synapse_interpreter::shell::{format_event, format_status, ShellCommand, HELP};
use synapse_interpreter::{SessionHandle, UiEvent};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let mut config = load_config_from(&config_path);
    apply_env_overrides(&mut config);
    if let Some(key) = args.api_key.as_ref() {
        config.gemini_api_key = key.clone();
    }

    if args.save_config {
        save_config(&config, &config_path)?;
        tracing::info!(path = %config_path.display(), "Config saved");
    }

    tracing::info!(
        model = %config.live_model,
        voice = %config.voice_name,
        has_key = config.has_api_key(),
        "Starting interpreter"
    );

    let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>();
    let session = SessionHandle::spawn(config, Some(ui_tx))?;

    std::thread::Builder::new()
        .name("ui-printer".to_string())
        .spawn(move || {
            for event in ui_rx {
                println!("{}", format_event(&event));
            }
        })?;

    println!("{}", HELP);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let Some(command) = ShellCommand::parse(&line) else {
            println!("unknown command: {}", line.trim());
            println!("{}", HELP);
            continue;
        };

        match command {
            ShellCommand::Connect => session.connect(),
            ShellCommand::Disconnect => session.disconnect(),
            ShellCommand::Talk => session.start_recording(),
            ShellCommand::Stop => session.stop_recording(),
            ShellCommand::Toggle => {
                if session.snapshot().is_recording {
                    session.stop_recording();
                } else {
                    session.start_recording();
                }
            }
            ShellCommand::Status => println!("{}", format_status(&session.snapshot())),
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Quit => break,
        }
    }

    session.shutdown();
    Ok(())
}
