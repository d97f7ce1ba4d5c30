//! WebSocket connection and communication for the Gemini Live session

use anyhow::Result;
use native_tls::TlsStream;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::WebSocket;

use super::types::{LiveSetup, ServerMessage, WireServerFrame};
use crate::audio::encoder::payload_to_base64;
use crate::audio::WirePayload;

pub type LiveSocket = WebSocket<TlsStream<TcpStream>>;

/// Read timeout used once the session is running; bounds outbound latency.
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

/// Create TLS WebSocket connection to Gemini Live API
pub fn connect_live_websocket(api_key: &str) -> Result<LiveSocket> {
    let ws_url = format!(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
        api_key
    );

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Shorten the read timeout so the session loop can interleave sends
pub fn set_socket_short_timeout(socket: &mut LiveSocket) -> Result<()> {
    let tcp_stream = socket.get_mut().get_mut();
    tcp_stream.set_read_timeout(Some(POLL_TIMEOUT))?;
    Ok(())
}

/// Build the session setup message: audio replies in the configured voice,
/// transcription in both directions.
pub fn build_setup_message(setup: &LiveSetup) -> serde_json::Value {
    let mut message = serde_json::json!({
        "setup": {
            "model": format!("models/{}", setup.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {
                            "voiceName": setup.voice_name
                        }
                    }
                }
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    });

    if !setup.system_instruction.trim().is_empty() {
        message["setup"]["systemInstruction"] = serde_json::json!({
            "parts": [{
                "text": setup.system_instruction
            }]
        });
    }

    message
}

/// Send setup message
pub fn send_live_setup(socket: &mut LiveSocket, setup: &LiveSetup) -> Result<()> {
    let msg_str = build_setup_message(setup).to_string();
    socket.write(tungstenite::Message::Text(msg_str.into()))?;
    socket.flush()?;
    Ok(())
}

/// Build one realtime input message carrying an encoded frame
pub fn build_realtime_audio_message(payload: &WirePayload) -> serde_json::Value {
    serde_json::json!({
        "realtime_input": {
            "media_chunks": [{
                "mime_type": payload.mime_type,
                "data": payload_to_base64(payload)
            }]
        }
    })
}

/// Send one encoded frame as realtime input
pub fn send_realtime_audio(socket: &mut LiveSocket, payload: &WirePayload) -> Result<()> {
    let msg = build_realtime_audio_message(payload);
    socket.write(tungstenite::Message::Text(msg.to_string().into()))?;
    socket.flush()?;
    Ok(())
}

/// Extract the `serverContent` of a message, if it has one
pub fn parse_server_message(msg: &str) -> Option<ServerMessage> {
    let frame: WireServerFrame = serde_json::from_str(msg).ok()?;
    frame.server_content.map(ServerMessage::from)
}

/// Check if the message indicates setup is complete
pub fn is_setup_complete(msg: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(msg)
        .map(|json| json.get("setupComplete").is_some())
        .unwrap_or(false)
}

/// Check if the message contains an error
pub fn parse_error(msg: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) {
        if let Some(error) = json.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return Some(message.to_string());
            }
            return Some(error.to_string());
        }
    }
    None
}

/// Time left before the server drops the session, if this is a `goAway`
pub fn parse_go_away(msg: &str) -> Option<String> {
    let json = serde_json::from_str::<serde_json::Value>(msg).ok()?;
    let go_away = json.get("goAway")?;
    Some(
        go_away
            .get("timeLeft")
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> LiveSetup {
        LiveSetup {
            api_key: "key".to_string(),
            model: "gemini-test".to_string(),
            voice_name: "Puck".to_string(),
            system_instruction: "Translate.".to_string(),
        }
    }

    #[test]
    fn setup_message_requests_audio_and_both_transcriptions() {
        let msg = build_setup_message(&setup());
        let s = &msg["setup"];
        assert_eq!(s["model"], "models/gemini-test");
        assert_eq!(s["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            s["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert!(s["inputAudioTranscription"].is_object());
        assert!(s["outputAudioTranscription"].is_object());
        assert_eq!(s["systemInstruction"]["parts"][0]["text"], "Translate.");
    }

    #[test]
    fn blank_instruction_is_omitted() {
        let mut setup = setup();
        setup.system_instruction = "  ".to_string();
        let msg = build_setup_message(&setup);
        assert!(msg["setup"].get("systemInstruction").is_none());
    }

    #[test]
    fn realtime_message_carries_tag_and_base64() {
        let payload = WirePayload {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: vec![0x01, 0x00, 0xff, 0x7f],
        };
        let msg = build_realtime_audio_message(&payload);
        let chunk = &msg["realtime_input"]["media_chunks"][0];
        assert_eq!(chunk["mime_type"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AQD/fw==");
    }

    #[test]
    fn parses_audio_from_first_part() {
        let msg = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}},
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"BBBB"}}
        ]}}}"#;
        let parsed = parse_server_message(msg).unwrap();
        assert_eq!(parsed.audio_chunk.as_deref(), Some("AAAA"));
        assert!(!parsed.interrupted);
        assert!(!parsed.turn_complete);
    }

    #[test]
    fn parses_transcriptions_and_flags() {
        let msg = r#"{"serverContent":{
            "inputTranscription":{"text":"Dzień dobry"},
            "outputTranscription":{"text":"Good morning"},
            "interrupted":true,
            "turnComplete":true
        }}"#;
        let parsed = parse_server_message(msg).unwrap();
        assert_eq!(parsed.input_transcript.as_deref(), Some("Dzień dobry"));
        assert_eq!(parsed.output_transcript.as_deref(), Some("Good morning"));
        assert!(parsed.interrupted);
        assert!(parsed.turn_complete);
        assert!(parsed.audio_chunk.is_none());
    }

    #[test]
    fn messages_without_server_content_are_skipped() {
        assert!(parse_server_message(r#"{"setupComplete":{}}"#).is_none());
        assert!(parse_server_message("not json").is_none());
    }

    #[test]
    fn control_messages_are_recognised() {
        assert!(is_setup_complete(r#"{"setupComplete":{}}"#));
        assert_eq!(
            parse_error(r#"{"error":{"code":400,"message":"bad model"}}"#).as_deref(),
            Some("bad model")
        );
        assert!(parse_error(r#"{"serverContent":{}}"#).is_none());
        assert_eq!(
            parse_go_away(r#"{"goAway":{"timeLeft":"10s"}}"#).as_deref(),
            Some("10s")
        );
        assert!(parse_go_away(r#"{"serverContent":{}}"#).is_none());
    }

    #[test]
    fn setup_complete_needs_the_key_not_the_word() {
        let transcript =
            r#"{"serverContent":{"outputTranscription":{"text":"setupComplete"}}}"#;
        assert!(!is_setup_complete(transcript));
        assert!(!is_setup_complete("setupComplete"));
    }
}
