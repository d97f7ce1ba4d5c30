//! Display-side loudness tracks for the user and the model.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Weight of a new raw sample in the moving average.
const SMOOTHING: f32 = 0.2;

/// Level shown while a model clip is playing.
pub const MODEL_SPEAKING_LEVEL: f32 = 0.4;

/// Exponential moving average of raw loudness, updated once per frame.
///
/// Raw values arriving between two frame ticks are coalesced: only the most
/// recent one is applied.
#[derive(Debug, Default, Clone)]
pub struct VolumeSmoother {
    display: f32,
    pending: Option<f32>,
}

impl VolumeSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.display
    }

    /// Record a raw loudness sample; applied on the next [`Self::on_frame`].
    pub fn push(&mut self, raw: f32) {
        self.pending = Some(raw.clamp(0.0, 1.0));
    }

    /// Apply the pending sample, if any. Returns whether the value changed.
    pub fn on_frame(&mut self) -> bool {
        let Some(raw) = self.pending.take() else {
            return false;
        };
        let previous = self.display;
        self.display = self.display * (1.0 - SMOOTHING) + raw * SMOOTHING;
        self.display != previous
    }

    /// Drop a pending sample that has not been applied yet.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }
}

/// "Is speaking" proxy for the model track.
///
/// Every scheduled clip raises the level to [`MODEL_SPEAKING_LEVEL`] and arms
/// its own decay that drops it to zero once the clip's duration has elapsed.
#[derive(Debug, Default, Clone)]
pub struct SpeakingPulse {
    level: f32,
    decays: VecDeque<Instant>,
}

impl SpeakingPulse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.level
    }

    pub fn pulse(&mut self, now: Instant, duration: Duration) {
        self.level = MODEL_SPEAKING_LEVEL;
        let deadline = now + duration;
        // Keep deadlines sorted so expiry can pop from the front.
        let at = self.decays.partition_point(|d| *d <= deadline);
        self.decays.insert(at, deadline);
    }

    /// Fire every decay that is due. Returns whether the level changed.
    pub fn on_frame(&mut self, now: Instant) -> bool {
        let mut fired = false;
        while self.decays.front().is_some_and(|d| *d <= now) {
            self.decays.pop_front();
            fired = true;
        }
        if fired && self.level != 0.0 {
            self.level = 0.0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_input_converges_monotonically() {
        let mut smoother = VolumeSmoother::new();
        let mut previous = smoother.value();
        for _ in 0..60 {
            smoother.push(1.0);
            smoother.on_frame();
            assert!(smoother.value() > previous);
            assert!(smoother.value() <= 1.0);
            previous = smoother.value();
        }
        assert!(1.0 - smoother.value() < 1e-4);
    }

    #[test]
    fn spike_decays_geometrically() {
        let mut smoother = VolumeSmoother::new();
        smoother.push(1.0);
        smoother.on_frame();
        assert!((smoother.value() - 0.2).abs() < 1e-6);

        let mut previous = smoother.value();
        for _ in 0..10 {
            smoother.push(0.0);
            smoother.on_frame();
            assert!((smoother.value() / previous - 0.8).abs() < 1e-4);
            previous = smoother.value();
        }
    }

    #[test]
    fn bursts_between_frames_are_coalesced_to_latest() {
        let mut smoother = VolumeSmoother::new();
        smoother.push(1.0);
        smoother.push(0.0);
        smoother.push(0.5);
        assert!(smoother.on_frame());
        assert!((smoother.value() - 0.1).abs() < 1e-6);

        // Nothing pending: the frame is a no-op.
        assert!(!smoother.on_frame());
        assert!((smoother.value() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn cancelled_sample_is_never_applied() {
        let mut smoother = VolumeSmoother::new();
        smoother.push(1.0);
        smoother.cancel_pending();
        assert!(!smoother.on_frame());
        assert_eq!(smoother.value(), 0.0);
    }

    #[test]
    fn pulse_holds_then_drops_after_duration() {
        let start = Instant::now();
        let mut pulse = SpeakingPulse::new();
        pulse.pulse(start, Duration::from_millis(200));
        assert_eq!(pulse.value(), MODEL_SPEAKING_LEVEL);

        assert!(!pulse.on_frame(start + Duration::from_millis(100)));
        assert_eq!(pulse.value(), MODEL_SPEAKING_LEVEL);

        assert!(pulse.on_frame(start + Duration::from_millis(200)));
        assert_eq!(pulse.value(), 0.0);
    }

    #[test]
    fn each_clip_arms_its_own_decay() {
        let start = Instant::now();
        let mut pulse = SpeakingPulse::new();
        pulse.pulse(start, Duration::from_millis(100));
        pulse.pulse(start + Duration::from_millis(50), Duration::from_millis(100));

        // The first clip's decay fires even though the second is still due.
        pulse.on_frame(start + Duration::from_millis(100));
        assert_eq!(pulse.value(), 0.0);

        pulse.pulse(start + Duration::from_millis(120), Duration::from_millis(100));
        pulse.on_frame(start + Duration::from_millis(150));
        assert_eq!(pulse.value(), 0.0);
    }
}
