//! Output context: a sample-accurate timeline mixer behind cpal.
//!
//! Buffers are started at absolute times on the output clock. The clock is
//! the number of frames the device callback has rendered, so "now" advances
//! exactly as fast as audio leaves the speaker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::types::{PlaybackBuffer, SourceId};
use crate::error::InterpreterError;

const COMMAND_CAPACITY: usize = 1024;
const ENDED_CAPACITY: usize = 1024;
/// Voices mixed concurrently before the callback has to grow its list.
const VOICE_CAPACITY: usize = 64;

/// An output clock plus the ability to start and stop buffers on it.
pub trait AudioOutput {
    /// Current position of the output clock in seconds.
    fn current_time(&self) -> f64;

    /// Start `buffer` at absolute time `when` (seconds on this clock).
    fn start(&mut self, buffer: &PlaybackBuffer, when: f64) -> Result<SourceId, InterpreterError>;

    /// Stop a source immediately. Unknown or finished ids are ignored.
    fn stop(&mut self, id: SourceId);

    /// Sources that finished playing on their own since the last call.
    fn drain_ended(&mut self) -> Vec<SourceId>;

    /// Stop everything and release the device.
    fn close(&mut self);
}

/// Command delivered into the render callback.
#[derive(Debug)]
pub enum MixerCommand {
    Start {
        id: SourceId,
        samples: Arc<[f32]>,
        sample_rate: u32,
        start_frame: u64,
        /// First frame after the buffer; the next back-to-back start.
        end_frame: u64,
    },
    Stop(SourceId),
}

struct Voice {
    id: SourceId,
    samples: Arc<[f32]>,
    /// Source samples advanced per output frame.
    step: f64,
    start_frame: u64,
    end_frame: u64,
}

impl Voice {
    /// Sample for output frame `frame`, or `None` once the voice has finished.
    fn sample_at(&self, frame: u64) -> Option<f32> {
        if frame < self.start_frame {
            return Some(0.0);
        }
        if frame >= self.end_frame {
            return None;
        }
        let position = (frame - self.start_frame) as f64 * self.step;
        let index = position as usize;
        let current = *self.samples.get(index)?;
        let next = self.samples.get(index + 1).copied().unwrap_or(current);
        let frac = (position - index as f64) as f32;
        Some(current + (next - current) * frac)
    }
}

/// Mixes scheduled voices into interleaved output and advances the clock.
///
/// Owned by the render callback; driven only through its command ring.
pub struct TimelineMixer {
    voices: Vec<Voice>,
    commands: HeapCons<MixerCommand>,
    ended: HeapProd<SourceId>,
    /// End notices that did not fit in the ring, retried on the next block.
    unreported: Vec<SourceId>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    channels: usize,
}

impl TimelineMixer {
    fn apply_commands(&mut self) {
        let position = self.frames_rendered.load(Ordering::Acquire);
        while let Some(command) = self.commands.try_pop() {
            match command {
                MixerCommand::Start {
                    id,
                    samples,
                    sample_rate,
                    start_frame,
                    end_frame,
                } => {
                    // A start already in the past begins immediately from the top.
                    let shift = position.saturating_sub(start_frame);
                    self.voices.push(Voice {
                        id,
                        samples,
                        step: f64::from(sample_rate) / f64::from(self.sample_rate),
                        start_frame: start_frame + shift,
                        end_frame: end_frame + shift,
                    });
                }
                MixerCommand::Stop(id) => self.voices.retain(|voice| voice.id != id),
            }
        }
    }

    fn report_ended(&mut self, id: SourceId) {
        if let Err(id) = self.ended.try_push(id) {
            self.unreported.push(id);
        }
    }

    fn flush_unreported(&mut self) {
        while let Some(&id) = self.unreported.first() {
            if self.ended.try_push(id).is_err() {
                break;
            }
            self.unreported.remove(0);
        }
    }

    /// Fill one interleaved output block.
    pub fn render(&mut self, out: &mut [f32]) {
        self.flush_unreported();
        self.apply_commands();

        let mut position = self.frames_rendered.load(Ordering::Acquire);
        for frame in out.chunks_mut(self.channels) {
            let mut mixed = 0.0f32;
            let mut index = 0;
            while index < self.voices.len() {
                match self.voices[index].sample_at(position) {
                    Some(sample) => {
                        mixed += sample;
                        index += 1;
                    }
                    None => {
                        let voice = self.voices.swap_remove(index);
                        self.report_ended(voice.id);
                    }
                }
            }
            let mixed = mixed.clamp(-1.0, 1.0);
            for slot in frame.iter_mut() {
                *slot = mixed;
            }
            position += 1;
        }

        self.frames_rendered.store(position, Ordering::Release);
    }

    fn render_into<T>(&mut self, out: &mut [T], scratch: &mut Vec<f32>)
    where
        T: SizedSample + FromSample<f32>,
    {
        scratch.clear();
        scratch.resize(out.len(), 0.0);
        self.render(scratch);
        for (slot, &sample) in out.iter_mut().zip(scratch.iter()) {
            *slot = T::from_sample(sample);
        }
    }
}

/// Control half of a mixer, held by the orchestration loop.
pub struct MixerControl {
    commands: HeapProd<MixerCommand>,
    ended: HeapCons<SourceId>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    next_id: u64,
}

impl MixerControl {
    pub fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    pub fn start(
        &mut self,
        buffer: &PlaybackBuffer,
        when: f64,
    ) -> Result<SourceId, InterpreterError> {
        self.next_id += 1;
        let id = SourceId(self.next_id);
        let rate = f64::from(self.sample_rate);
        let when = when.max(0.0);
        // Rounding both edges the same way makes one buffer's end frame the
        // next back-to-back buffer's start frame.
        let start_frame = (when * rate).round() as u64;
        let end_frame = ((when + buffer.duration()) * rate).round() as u64;

        self.commands
            .try_push(MixerCommand::Start {
                id,
                samples: Arc::clone(buffer.samples()),
                sample_rate: buffer.sample_rate(),
                start_frame,
                end_frame,
            })
            .map_err(|_| InterpreterError::Schedule("mixer command ring full".to_string()))?;
        Ok(id)
    }

    pub fn stop(&mut self, id: SourceId) {
        if self.commands.try_push(MixerCommand::Stop(id)).is_err() {
            tracing::warn!(?id, "Mixer command ring full, stop dropped");
        }
    }

    pub fn drain_ended(&mut self) -> Vec<SourceId> {
        let mut ended = Vec::new();
        while let Some(id) = self.ended.try_pop() {
            ended.push(id);
        }
        ended
    }
}

/// Create a mixer and its control half for an output running at
/// `sample_rate` with `channels` interleaved channels.
pub fn timeline_mixer(sample_rate: u32, channels: usize) -> (MixerControl, TimelineMixer) {
    timeline_mixer_with(sample_rate, channels, ENDED_CAPACITY)
}

fn timeline_mixer_with(
    sample_rate: u32,
    channels: usize,
    ended_capacity: usize,
) -> (MixerControl, TimelineMixer) {
    let (commands_tx, commands_rx) = HeapRb::<MixerCommand>::new(COMMAND_CAPACITY).split();
    let (ended_tx, ended_rx) = HeapRb::<SourceId>::new(ended_capacity).split();
    let frames_rendered = Arc::new(AtomicU64::new(0));

    let control = MixerControl {
        commands: commands_tx,
        ended: ended_rx,
        frames_rendered: Arc::clone(&frames_rendered),
        sample_rate,
        next_id: 0,
    };
    let mixer = TimelineMixer {
        voices: Vec::with_capacity(VOICE_CAPACITY),
        commands: commands_rx,
        ended: ended_tx,
        unreported: Vec::with_capacity(VOICE_CAPACITY),
        frames_rendered,
        sample_rate,
        channels: channels.max(1),
    };
    (control, mixer)
}

/// The default output device driven by a [`TimelineMixer`].
pub struct CpalOutput {
    control: MixerControl,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    /// Open and start the default output device, preferring `sample_rate`.
    pub fn open(sample_rate: u32) -> Result<Self, InterpreterError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(InterpreterError::NoOutputDevice)?;
        let config = preferred_output_config(&device, sample_rate)?;

        let device_rate = config.sample_rate();
        let channels = usize::from(config.channels());
        let stream_config: cpal::StreamConfig = config.clone().into();
        let (control, mixer) = timeline_mixer(device_rate, channels);

        let stream = match config.sample_format() {
            SampleFormat::F32 => build_render_stream::<f32>(&device, &stream_config, mixer),
            SampleFormat::I16 => build_render_stream::<i16>(&device, &stream_config, mixer),
            other => {
                return Err(InterpreterError::OutputDevice(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| InterpreterError::OutputDevice(e.to_string()))?;

        // Starting the stream is what lets the clock advance.
        stream
            .play()
            .map_err(|e| InterpreterError::OutputDevice(e.to_string()))?;

        tracing::info!(device_rate, channels, "Audio output opened");

        Ok(Self {
            control,
            stream: Some(stream),
        })
    }
}

fn preferred_output_config(
    device: &cpal::Device,
    rate: u32,
) -> Result<cpal::SupportedStreamConfig, InterpreterError> {
    if let Ok(ranges) = device.supported_output_configs() {
        for range in ranges {
            let usable = matches!(range.sample_format(), SampleFormat::F32 | SampleFormat::I16);
            if usable && range.min_sample_rate() <= rate && rate <= range.max_sample_rate() {
                return Ok(range.with_sample_rate(rate));
            }
        }
    }
    device
        .default_output_config()
        .map_err(|e| InterpreterError::OutputDevice(e.to_string()))
}

fn build_render_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: TimelineMixer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.render_into(data, &mut scratch),
        |err| tracing::error!(%err, "Audio output stream error"),
        None,
    )
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.control.current_time()
    }

    fn start(&mut self, buffer: &PlaybackBuffer, when: f64) -> Result<SourceId, InterpreterError> {
        if self.stream.is_none() {
            return Err(InterpreterError::Schedule("output closed".to_string()));
        }
        self.control.start(buffer, when)
    }

    fn stop(&mut self, id: SourceId) {
        self.control.stop(id);
    }

    fn drain_ended(&mut self) -> Vec<SourceId> {
        self.control.drain_ended()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            tracing::debug!("Audio output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, len: usize) -> PlaybackBuffer {
        PlaybackBuffer::new(vec![value; len], 24_000)
    }

    #[test]
    fn clock_advances_with_rendered_frames() {
        let (control, mut mixer) = timeline_mixer(24_000, 2);
        let mut out = vec![0.0; 2 * 2400];
        mixer.render(&mut out);
        assert!((control.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn buffers_play_back_to_back_at_their_start_frames() {
        let (mut control, mut mixer) = timeline_mixer(24_000, 1);
        // 10 frames each, the second starting exactly where the first ends.
        control.start(&buffer(0.25, 10), 0.0).unwrap();
        control.start(&buffer(0.5, 10), 10.0 / 24_000.0).unwrap();

        let mut out = vec![0.0; 30];
        mixer.render(&mut out);

        assert!(out[..10].iter().all(|&s| s == 0.25));
        assert!(out[10..20].iter().all(|&s| s == 0.5));
        assert!(out[20..].iter().all(|&s| s == 0.0));
        assert_eq!(control.drain_ended(), vec![SourceId(1), SourceId(2)]);
    }

    #[test]
    fn stopped_voice_goes_silent_without_ended_notice() {
        let (mut control, mut mixer) = timeline_mixer(24_000, 1);
        let id = control.start(&buffer(0.5, 100), 0.0).unwrap();

        let mut out = vec![0.0; 10];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.5));

        control.stop(id);
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(control.drain_ended().is_empty());
    }

    #[test]
    fn late_start_begins_immediately_from_the_top() {
        let (mut control, mut mixer) = timeline_mixer(24_000, 1);
        let mut out = vec![0.0; 48];
        mixer.render(&mut out);

        let samples: Vec<f32> = (0..4).map(|i| i as f32 * 0.1).collect();
        control
            .start(&PlaybackBuffer::new(samples.clone(), 24_000), 0.0)
            .unwrap();
        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn upsampling_interpolates_between_source_samples() {
        let (mut control, mut mixer) = timeline_mixer(48_000, 1);
        control
            .start(&PlaybackBuffer::new(vec![0.0, 1.0], 24_000), 0.0)
            .unwrap();
        let mut out = vec![0.0; 5];
        mixer.render(&mut out);
        assert_eq!(out[..4], [0.0, 0.5, 1.0, 1.0]);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn back_to_back_buffers_never_share_a_frame_at_44100() {
        let (mut control, mut mixer) = timeline_mixer(44_100, 1);
        let mut when = 0.0;
        for n in 0..20 {
            let value = if n % 2 == 0 { 0.5 } else { -0.5 };
            let clip = buffer(value, 100);
            control.start(&clip, when).unwrap();
            when += clip.duration();
        }

        // 20 * 100 samples at 24 kHz span exactly 3675 frames at 44.1 kHz.
        let mut out = vec![0.0; 3676];
        mixer.render(&mut out);

        assert!(out[..3675].iter().all(|&s| s.abs() == 0.5));
        assert_eq!(out[3675], 0.0);
        assert_eq!(control.drain_ended().len(), 20);
    }

    #[test]
    fn end_notices_survive_a_full_ring() {
        let (mut control, mut mixer) = timeline_mixer_with(24_000, 1, 1);
        for _ in 0..3 {
            control.start(&buffer(0.1, 2), 0.0).unwrap();
        }

        let mut out = vec![0.0; 4];
        let mut ended = Vec::new();
        for _ in 0..4 {
            mixer.render(&mut out);
            ended.extend(control.drain_ended());
        }
        ended.sort_by_key(|id| id.0);
        assert_eq!(ended, vec![SourceId(1), SourceId(2), SourceId(3)]);
    }
}
