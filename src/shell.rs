//! Line commands for the terminal shell and formatting of what it prints.

use crate::session::{ConnectionState, SessionView, Speaker, TranscriptItem, UiEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Connect,
    Disconnect,
    Talk,
    Stop,
    /// Empty line: arm if idle, disarm if talking
    Toggle,
    Status,
    Help,
    Quit,
}

impl ShellCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => Some(Self::Toggle),
            "connect" | "c" => Some(Self::Connect),
            "disconnect" | "d" => Some(Self::Disconnect),
            "talk" | "t" => Some(Self::Talk),
            "stop" | "s" => Some(Self::Stop),
            "status" => Some(Self::Status),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub const HELP: &str = "commands: connect, disconnect, talk, stop, <enter> toggles talking, status, quit";

pub fn format_transcript(item: &TranscriptItem) -> String {
    let who = match item.sender {
        Speaker::User => "you",
        Speaker::Model => "interpreter",
    };
    let marker = if item.is_final { "" } else { " …" };
    format!(
        "[{}] {:>11}: {}{}",
        item.timestamp.format("%H:%M:%S"),
        who,
        item.text.trim(),
        marker
    )
}

pub fn format_event(event: &UiEvent) -> String {
    match event {
        UiEvent::StateChanged(state) => format!("-- {}", state),
        UiEvent::Transcript(item) => format_transcript(item),
        UiEvent::Error(message) => format!("!! {}", message),
    }
}

/// Text meter for a loudness value in [0, 1].
pub fn volume_meter(value: f32) -> String {
    let filled = (value.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(10 - filled))
}

pub fn format_status(view: &SessionView) -> String {
    let mut status = format!(
        "state: {}  talking: {}  you {}  interpreter {}  transcripts: {}",
        view.connection_state,
        if view.is_recording { "yes" } else { "no" },
        volume_meter(view.volume_user),
        volume_meter(view.volume_model),
        view.transcripts.len()
    );
    if let Some(error) = view.error.as_deref() {
        status.push_str(&format!("  error: {}", error));
    }
    if view.connection_state == ConnectionState::Error {
        status.push_str("  (type 'connect' to retry)");
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(ShellCommand::parse("connect"), Some(ShellCommand::Connect));
        assert_eq!(ShellCommand::parse("  TALK "), Some(ShellCommand::Talk));
        assert_eq!(ShellCommand::parse(""), Some(ShellCommand::Toggle));
        assert_eq!(ShellCommand::parse("q"), Some(ShellCommand::Quit));
        assert_eq!(ShellCommand::parse("dance"), None);
    }

    #[test]
    fn meter_scales_and_clamps() {
        assert_eq!(volume_meter(0.0), "[..........]");
        assert_eq!(volume_meter(0.4), "[####......]");
        assert_eq!(volume_meter(3.0), "[##########]");
    }

    #[test]
    fn status_mentions_error() {
        let view = SessionView {
            connection_state: ConnectionState::Error,
            error: Some("API key not found".to_string()),
            ..SessionView::default()
        };
        let status = format_status(&view);
        assert!(status.contains("ERROR"));
        assert!(status.contains("API key not found"));
    }
}
