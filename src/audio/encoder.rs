//! PCM conversion between the float samples used internally and the
//! 16-bit little-endian format spoken on the wire.

use base64::{engine::general_purpose, Engine as _};

use super::types::{AudioFrame, PlaybackBuffer, WirePayload};
use crate::error::InterpreterError;

/// Scale used when converting float samples to i16.
const PCM16_SCALE: f32 = 32767.0;

/// Build the MIME tag for raw 16-bit PCM at `sample_rate`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Convert a captured frame into the payload sent to the remote session.
///
/// Each sample is clamped to [-1, 1], scaled by 32767, rounded and written
/// little-endian. No resampling happens here; the tag carries the frame's
/// own rate.
pub fn encode_frame(frame: &AudioFrame) -> Result<WirePayload, InterpreterError> {
    if frame.is_empty() {
        return Err(InterpreterError::Encode("empty frame".to_string()));
    }

    let mut data = Vec::with_capacity(frame.len() * 2);
    for sample in frame.samples() {
        let value = (sample.clamp(-1.0, 1.0) * PCM16_SCALE).round() as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }

    Ok(WirePayload {
        mime_type: pcm_mime_type(frame.sample_rate()),
        data,
    })
}

/// Inverse of [`encode_frame`]: read the payload bytes back as floats.
pub fn decode_payload(payload: &WirePayload) -> Vec<f32> {
    payload
        .data
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM16_SCALE)
        .collect()
}

/// Base64 form of a payload's bytes, as embedded in JSON messages.
pub fn payload_to_base64(payload: &WirePayload) -> String {
    general_purpose::STANDARD.encode(&payload.data)
}

/// Decode one inbound base64 PCM16 mono chunk into a playback buffer.
///
/// Samples are normalised by 32768 as the remote model produces them. A
/// chunk that is not valid base64, has an odd byte count, or holds no
/// samples is rejected.
pub fn decode_audio_chunk(
    encoded: &str,
    sample_rate: u32,
) -> Result<PlaybackBuffer, InterpreterError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| InterpreterError::Decode(e.to_string()))?;

    if bytes.is_empty() {
        return Err(InterpreterError::Decode("empty chunk".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(InterpreterError::Decode(format!(
            "odd byte length {} for 16-bit PCM",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(PlaybackBuffer::new(samples, sample_rate))
}
