//! Gapless playback scheduling on a virtual timeline.

use std::collections::HashSet;

use super::output::AudioOutput;
use super::types::{PlaybackBuffer, SourceId};
use crate::error::InterpreterError;

/// Forward offset used when the cursor has to be pulled up to "now".
pub const SCHEDULE_EPSILON: f64 = 0.05;

/// Where and for how long a buffer was placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

/// Places decoded buffers back to back on an output clock.
///
/// The cursor (`next_start_time`) is advanced as soon as a buffer is
/// scheduled, so a burst of buffers arriving faster than real time queues up
/// without overlap. If the cursor falls behind the clock it is rebased to
/// `now + SCHEDULE_EPSILON`.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: HashSet<SourceId>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.contains(&id)
    }

    /// Schedule `buffer` directly after everything already queued.
    pub fn schedule(
        &mut self,
        output: &mut dyn AudioOutput,
        buffer: &PlaybackBuffer,
    ) -> Result<ScheduledSource, InterpreterError> {
        self.reap(output);

        let now = output.current_time();
        if self.next_start_time < now {
            self.next_start_time = now + SCHEDULE_EPSILON;
        }

        let start = self.next_start_time;
        let duration = buffer.duration();
        let id = output.start(buffer, start)?;

        self.next_start_time += duration;
        self.active.insert(id);

        tracing::trace!(?id, start, duration, "Buffer scheduled");
        Ok(ScheduledSource {
            id,
            start,
            duration,
        })
    }

    /// Drop sources the output reports as naturally finished.
    pub fn reap(&mut self, output: &mut dyn AudioOutput) {
        for id in output.drain_ended() {
            self.active.remove(&id);
        }
    }

    /// Stop all queued and playing audio and pull the cursor back to now.
    pub fn interrupt(&mut self, output: &mut dyn AudioOutput) {
        let stopped = self.active.len();
        for id in self.active.drain() {
            output.stop(id);
        }
        self.next_start_time = output.current_time();
        tracing::debug!(stopped, "Playback interrupted");
    }

    /// Stop everything and return the cursor to zero, for teardown.
    pub fn reset(&mut self, output: &mut dyn AudioOutput) {
        for id in self.active.drain() {
            output.stop(id);
        }
        self.next_start_time = 0.0;
    }

    /// Forget all handles once their output is already gone.
    pub fn forget(&mut self) {
        self.active.clear();
        self.next_start_time = 0.0;
    }
}
