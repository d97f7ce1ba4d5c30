//! Microphone capture: per-block loudness and fixed-size frame accumulation.
//!
//! The block handler runs inside cpal's realtime input callback. It never
//! shares mutable state with the orchestration loop: commands arrive through
//! a lock-free ring ([`CapturePort`] → [`CaptureInbox`]) and results leave
//! through a [`CaptureSink`] that forwards them, in order, to the loop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::types::AudioFrame;
use super::{Microphone, FRAME_SIZE, INPUT_SAMPLE_RATE};
use crate::error::InterpreterError;

/// Room for pending arm/disarm commands between two blocks.
const COMMAND_CAPACITY: usize = 32;

/// Command delivered into the capture callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    SetRecording(bool),
}

/// Message emitted by the capture callback.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMessage {
    /// RMS loudness of one input block.
    Volume(f32),
    /// One full accumulation of [`FRAME_SIZE`] samples.
    Audio(AudioFrame),
}

/// Receiver side of the capture callback's output.
pub type CaptureSink = Box<dyn FnMut(CaptureMessage) + Send + 'static>;

/// Sending half of the command ring, held by the orchestration loop.
pub struct CapturePort {
    commands: HeapProd<CaptureCommand>,
}

impl CapturePort {
    /// Post a command without blocking; it is applied before the next block.
    pub fn post(&mut self, command: CaptureCommand) {
        if self.commands.try_push(command).is_err() {
            tracing::warn!(?command, "Capture command ring full, dropping command");
        }
    }
}

/// Receiving half of the command ring, owned by the capture callback.
pub struct CaptureInbox {
    commands: HeapCons<CaptureCommand>,
}

impl CaptureInbox {
    pub fn try_recv(&mut self) -> Option<CaptureCommand> {
        self.commands.try_pop()
    }
}

/// Create a connected command port/inbox pair.
pub fn capture_channel() -> (CapturePort, CaptureInbox) {
    let (commands_tx, commands_rx) = HeapRb::<CaptureCommand>::new(COMMAND_CAPACITY).split();
    (
        CapturePort {
            commands: commands_tx,
        },
        CaptureInbox {
            commands: commands_rx,
        },
    )
}

/// Root-mean-square loudness of a block.
pub fn block_rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f32 = block.iter().map(|s| s * s).sum();
    (sum / block.len() as f32).sqrt()
}

/// Per-block handler: loudness always, frame accumulation while armed.
pub struct CaptureProcessor {
    buffer: Vec<f32>,
    index: usize,
    is_recording: bool,
    sample_rate: u32,
}

impl CaptureProcessor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            buffer: vec![0.0; FRAME_SIZE],
            index: 0,
            is_recording: false,
            sample_rate,
        }
    }

    pub fn handle_command(&mut self, command: CaptureCommand) {
        match command {
            CaptureCommand::SetRecording(value) => self.is_recording = value,
        }
    }

    /// Process one input block, emitting messages in order.
    pub fn process(&mut self, block: &[f32], emit: &mut dyn FnMut(CaptureMessage)) {
        if block.is_empty() {
            return;
        }

        emit(CaptureMessage::Volume(block_rms(block)));

        if !self.is_recording {
            // Drop any partial frame so it cannot leak into the next segment.
            self.index = 0;
            return;
        }

        for &sample in block {
            self.buffer[self.index] = sample;
            self.index += 1;

            if self.index >= FRAME_SIZE {
                emit(CaptureMessage::Audio(AudioFrame::new(
                    self.buffer.clone(),
                    self.sample_rate,
                )));
                self.index = 0;
            }
        }
    }
}

/// Downmixes interleaved device audio to mono and linearly resamples it to
/// the capture rate, carrying interpolation state across blocks.
pub struct InputConditioner {
    channels: usize,
    /// Source samples consumed per output sample.
    step: f64,
    /// Position of the next output sample between `prev` (0) and the
    /// incoming sample (1).
    phase: f64,
    prev: f32,
    passthrough: bool,
    out: Vec<f32>,
}

impl InputConditioner {
    pub fn new(channels: usize, device_rate: u32, target_rate: u32) -> Self {
        Self {
            channels: channels.max(1),
            step: f64::from(device_rate) / f64::from(target_rate.max(1)),
            phase: 0.0,
            prev: 0.0,
            passthrough: device_rate == target_rate,
            out: Vec::new(),
        }
    }

    /// Condition one interleaved block; the result is valid until the next call.
    pub fn process<T>(&mut self, data: &[T]) -> &[f32]
    where
        T: Sample,
        f32: FromSample<T>,
    {
        self.out.clear();
        let channels = self.channels;

        for frame in data.chunks_exact(channels) {
            let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
            let current = sum / channels as f32;

            if self.passthrough {
                self.out.push(current);
                continue;
            }

            while self.phase < 1.0 {
                let t = self.phase as f32;
                self.out.push(self.prev + (current - self.prev) * t);
                self.phase += self.step;
            }
            self.phase -= 1.0;
            self.prev = current;
        }

        &self.out
    }
}

/// Everything the realtime input callback owns.
struct CaptureWorklet {
    conditioner: InputConditioner,
    processor: CaptureProcessor,
    inbox: CaptureInbox,
    sink: CaptureSink,
}

impl CaptureWorklet {
    fn on_input<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        while let Some(command) = self.inbox.try_recv() {
            self.processor.handle_command(command);
        }
        let block = self.conditioner.process(data);
        self.processor.process(block, &mut self.sink);
    }
}

/// Default input device opened through cpal.
pub struct CpalMicrophone {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream: Option<cpal::Stream>,
}

impl CpalMicrophone {
    /// Acquire the default input device, preferring a native 16 kHz config.
    pub fn acquire() -> Result<Self, InterpreterError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(InterpreterError::NoInputDevice)?;
        let config = preferred_input_config(&device, INPUT_SAMPLE_RATE)?;

        tracing::info!(
            sample_rate = config.sample_rate(),
            channels = config.channels(),
            format = ?config.sample_format(),
            "Microphone acquired"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

fn preferred_input_config(
    device: &cpal::Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig, InterpreterError> {
    if let Ok(ranges) = device.supported_input_configs() {
        for range in ranges {
            let usable = matches!(range.sample_format(), SampleFormat::F32 | SampleFormat::I16);
            if usable && range.min_sample_rate() <= rate && rate <= range.max_sample_rate() {
                return Ok(range.with_sample_rate(rate));
            }
        }
    }
    device
        .default_input_config()
        .map_err(|e| InterpreterError::InputDevice(e.to_string()))
}

fn build_capture_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut worklet: CaptureWorklet,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| worklet.on_input(data),
        |err| tracing::error!(%err, "Audio input stream error"),
        None,
    )
}

impl Microphone for CpalMicrophone {
    fn sample_rate(&self) -> u32 {
        INPUT_SAMPLE_RATE
    }

    fn start_capture(&mut self, sink: CaptureSink) -> Result<CapturePort, InterpreterError> {
        let (port, inbox) = capture_channel();
        let device_rate = self.config.sample_rate();
        let channels = usize::from(self.config.channels());
        let stream_config: cpal::StreamConfig = self.config.clone().into();

        let frame_rate = self.sample_rate();
        let worklet = CaptureWorklet {
            conditioner: InputConditioner::new(channels, device_rate, frame_rate),
            processor: CaptureProcessor::new(frame_rate),
            inbox,
            sink,
        };

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => build_capture_stream::<f32>(&self.device, &stream_config, worklet),
            SampleFormat::I16 => build_capture_stream::<i16>(&self.device, &stream_config, worklet),
            other => {
                return Err(InterpreterError::processor_init(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(InterpreterError::processor_init)?;

        stream.play().map_err(InterpreterError::processor_init)?;
        self.stream = Some(stream);

        tracing::debug!(device_rate, channels, "Capture pipeline started");
        Ok(port)
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Capture pipeline detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_blocks(processor: &mut CaptureProcessor, blocks: &[Vec<f32>]) -> Vec<CaptureMessage> {
        let mut out = Vec::new();
        for block in blocks {
            processor.process(block, &mut |msg| out.push(msg));
        }
        out
    }

    fn frames(messages: &[CaptureMessage]) -> Vec<&AudioFrame> {
        messages
            .iter()
            .filter_map(|m| match m {
                CaptureMessage::Audio(frame) => Some(frame),
                CaptureMessage::Volume(_) => None,
            })
            .collect()
    }

    #[test]
    fn emits_whole_frames_for_any_block_pattern() {
        for block_size in [128usize, 100, 441, 4096, 5000] {
            let mut processor = CaptureProcessor::new(16_000);
            processor.handle_command(CaptureCommand::SetRecording(true));

            let total = 3 * FRAME_SIZE + 777;
            let mut blocks = Vec::new();
            let mut produced = 0;
            while produced < total {
                let len = block_size.min(total - produced);
                blocks.push((produced..produced + len).map(|i| i as f32 * 1e-6).collect());
                produced += len;
            }

            let messages = run_blocks(&mut processor, &blocks);
            let frames = frames(&messages);
            assert_eq!(frames.len(), total / FRAME_SIZE, "block size {block_size}");
            for (n, frame) in frames.iter().enumerate() {
                assert_eq!(frame.len(), FRAME_SIZE);
                assert_eq!(frame.sample_rate(), 16_000);
                // Frames are contiguous slices of the input stream.
                assert_eq!(frame.samples()[0], (n * FRAME_SIZE) as f32 * 1e-6);
            }
        }
    }

    #[test]
    fn volume_is_emitted_for_every_block_even_when_disarmed() {
        let mut processor = CaptureProcessor::new(16_000);
        let messages = run_blocks(&mut processor, &[vec![0.5; 128], vec![0.0; 128]]);
        assert_eq!(
            messages,
            vec![CaptureMessage::Volume(0.5), CaptureMessage::Volume(0.0)]
        );
    }

    #[test]
    fn empty_block_emits_nothing() {
        let mut processor = CaptureProcessor::new(16_000);
        assert!(run_blocks(&mut processor, &[Vec::new()]).is_empty());
    }

    #[test]
    fn disarm_discards_partial_frame() {
        let mut processor = CaptureProcessor::new(16_000);
        processor.handle_command(CaptureCommand::SetRecording(true));
        run_blocks(&mut processor, &[vec![1.0; 3000]]);

        processor.handle_command(CaptureCommand::SetRecording(false));
        run_blocks(&mut processor, &[vec![0.0; 128]]);

        processor.handle_command(CaptureCommand::SetRecording(true));
        let messages = run_blocks(&mut processor, &[vec![-0.25; FRAME_SIZE]]);
        let frames = frames(&messages);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].samples().iter().all(|&s| s == -0.25));
    }

    #[test]
    fn volume_precedes_frame_from_same_block() {
        let mut processor = CaptureProcessor::new(16_000);
        processor.handle_command(CaptureCommand::SetRecording(true));
        let messages = run_blocks(&mut processor, &[vec![0.1; FRAME_SIZE]]);
        assert!(matches!(messages[0], CaptureMessage::Volume(_)));
        assert!(matches!(messages[1], CaptureMessage::Audio(_)));
    }

    #[test]
    fn port_commands_reach_inbox_in_order() {
        let (mut port, mut inbox) = capture_channel();
        port.post(CaptureCommand::SetRecording(true));
        port.post(CaptureCommand::SetRecording(false));
        assert_eq!(inbox.try_recv(), Some(CaptureCommand::SetRecording(true)));
        assert_eq!(inbox.try_recv(), Some(CaptureCommand::SetRecording(false)));
        assert_eq!(inbox.try_recv(), None);
    }

    #[test]
    fn worklet_applies_commands_before_the_block() {
        let (mut port, inbox) = capture_channel();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut worklet = CaptureWorklet {
            conditioner: InputConditioner::new(1, 16_000, 16_000),
            processor: CaptureProcessor::new(16_000),
            inbox,
            sink: Box::new(move |msg| {
                let _ = tx.send(msg);
            }),
        };

        port.post(CaptureCommand::SetRecording(true));
        worklet.on_input(&vec![0.2f32; FRAME_SIZE]);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[1], CaptureMessage::Audio(_)));
    }

    #[test]
    fn conditioner_downmixes_stereo() {
        let mut conditioner = InputConditioner::new(2, 16_000, 16_000);
        let out = conditioner.process(&[0.2f32, 0.4, -1.0, 1.0]).to_vec();
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
    }

    #[test]
    fn conditioner_resamples_48k_to_16k() {
        let mut conditioner = InputConditioner::new(1, 48_000, 16_000);
        let mut produced = 0;
        for _ in 0..10 {
            produced += conditioner.process(&vec![0.5f32; 480]).len();
        }
        // 4800 input samples at a 3:1 ratio.
        assert_eq!(produced, 1600);
    }

    #[test]
    fn conditioner_converts_integer_samples() {
        let mut conditioner = InputConditioner::new(1, 16_000, 16_000);
        let out = conditioner.process(&[i16::MIN, 0i16]).to_vec();
        assert_eq!(out, vec![-1.0, 0.0]);
    }
}
