//! Audio plumbing: microphone capture, wire encoding, and gapless playback.

pub mod capture;
pub mod encoder;
pub mod output;
pub mod scheduler;
pub mod types;
pub mod volume;

pub use capture::{CaptureCommand, CaptureMessage, CapturePort, CaptureSink, CpalMicrophone};
pub use encoder::{decode_audio_chunk, encode_frame};
pub use output::{AudioOutput, CpalOutput};
pub use scheduler::PlaybackScheduler;
pub use types::{AudioFrame, PlaybackBuffer, SourceId, WirePayload};
pub use volume::{SpeakingPulse, VolumeSmoother};

use crate::error::InterpreterError;

/// Rate of the frames sent to the remote session.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
/// Rate of the audio chunks the remote model sends back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Samples per outbound frame (~256 ms at 16 kHz).
pub const FRAME_SIZE: usize = 4096;

/// A capture source whose processing runs off the orchestration thread.
pub trait Microphone {
    /// Rate of the frames this microphone emits.
    fn sample_rate(&self) -> u32;

    /// Start the capture pipeline. Messages go to `sink`; the returned port
    /// carries commands back into the pipeline.
    fn start_capture(&mut self, sink: CaptureSink) -> Result<CapturePort, InterpreterError>;

    /// Stop capturing and release the device.
    fn release(&mut self);
}

/// Source of output contexts and microphones.
pub trait AudioBackend {
    fn open_output(&mut self, sample_rate: u32) -> Result<Box<dyn AudioOutput>, InterpreterError>;
    fn acquire_microphone(&mut self) -> Result<Box<dyn Microphone>, InterpreterError>;
}

/// Host audio through cpal's default devices.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_output(&mut self, sample_rate: u32) -> Result<Box<dyn AudioOutput>, InterpreterError> {
        Ok(Box::new(CpalOutput::open(sample_rate)?))
    }

    fn acquire_microphone(&mut self) -> Result<Box<dyn Microphone>, InterpreterError> {
        Ok(Box::new(CpalMicrophone::acquire()?))
    }
}
