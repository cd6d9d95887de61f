//! Automation lanes: the seam between the engine, which decides *when* a parameter changes and
//! what shape the change takes, and whatever backend turns those curves into samples.

use std::sync::Arc;

/// The scheduling protocol every automatable backend parameter understands.
pub trait AutomationParam {
    /// Jump to `value` at `time`.
    fn set_value_at(&mut self, value: f64, time: f64);
    /// Ramp linearly from the previous event's value so that `value` is reached at `time`.
    ///
    /// The ramp starts where the previous event starts. After an exponential approach or a loop
    /// that is the value the curve began with, not the value it has reached by then; schedule a
    /// [`set_value_at`](Self::set_value_at) first to ramp from a later point.
    fn linear_ramp_to(&mut self, value: f64, time: f64);
    /// Starting at `start`, approach `target` exponentially with the given time constant.
    fn exponential_approach(&mut self, target: f64, start: f64, time_constant: f64);
    /// Drop everything scheduled after `time` and hold the value in effect at `time`.
    fn cancel_and_hold_at(&mut self, time: f64);
    /// Starting at `start`, repeat `buffer` once every `period` seconds until the next event.
    fn play_loop(&mut self, buffer: Arc<[f32]>, start: f64, period: f64);
}

#[derive(Clone, Debug, PartialEq)]
pub enum CurveEvent {
    SetValue {
        time: f64,
        value: f64,
    },
    LinearRamp {
        time: f64,
        value: f64,
    },
    ExponentialApproach {
        time: f64,
        target: f64,
        time_constant: f64,
        /// Value in effect when the approach starts.
        from: f64,
    },
    Loop {
        time: f64,
        period: f64,
        buffer: Arc<[f32]>,
    },
}

impl CurveEvent {
    pub fn time(&self) -> f64 {
        match self {
            Self::SetValue { time, .. }
            | Self::LinearRamp { time, .. }
            | Self::ExponentialApproach { time, .. }
            | Self::Loop { time, .. } => *time,
        }
    }

    fn set_time(&mut self, new_time: f64) {
        match self {
            Self::SetValue { time, .. }
            | Self::LinearRamp { time, .. }
            | Self::ExponentialApproach { time, .. }
            | Self::Loop { time, .. } => *time = new_time,
        }
    }

    /// Value of this event's curve at `time`, which must not precede the event.
    fn value_from(&self, time: f64) -> f64 {
        match self {
            Self::SetValue { value, .. } | Self::LinearRamp { value, .. } => *value,
            Self::ExponentialApproach {
                time: start,
                target,
                time_constant,
                from,
            } => {
                if *time_constant <= 0.0 {
                    *target
                } else {
                    target + (from - target) * (-(time - start) / time_constant).exp()
                }
            }
            Self::Loop {
                time: start,
                period,
                buffer,
            } => sample_loop(buffer, (time - start) / period),
        }
    }
}

fn sample_loop(buffer: &[f32], cycles: f64) -> f64 {
    if buffer.is_empty() {
        return 0.0;
    }
    let position = cycles.rem_euclid(1.0) * buffer.len() as f64;
    let index = position.floor() as usize % buffer.len();
    let next = (index + 1) % buffer.len();
    let fraction = position - position.floor();
    let a = buffer[index] as f64;
    let b = buffer[next] as f64;
    a + (b - a) * fraction
}

/// An ordered list of scheduled curve events that can be evaluated at any point in time.
#[derive(Clone, Debug)]
pub struct Timeline {
    default_value: f64,
    events: Vec<CurveEvent>,
}

impl Timeline {
    pub fn new(default_value: f64) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[CurveEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self, value: f64) {
        self.events.clear();
        self.default_value = value;
    }

    /// Time of the latest scheduled event.
    pub fn last_time(&self) -> f64 {
        self.events
            .last()
            .map_or(f64::NEG_INFINITY, CurveEvent::time)
    }

    /// Value in effect at `time`. Ramps interpolate from the start of the preceding event, so
    /// a ramp right after a continuous curve begins at that curve's initial value.
    pub fn value_at(&self, time: f64) -> f64 {
        let next = self.events.partition_point(|e| e.time() <= time);
        if let Some(CurveEvent::LinearRamp { time: end, value }) = self.events.get(next) {
            if next > 0 {
                let (start, from) = self.anchor(next - 1);
                if *end > start {
                    let progress = ((time - start) / (end - start)).clamp(0.0, 1.0);
                    return from + (value - from) * progress;
                }
            }
        }
        match next {
            0 => self.default_value,
            _ => self.events[next - 1].value_from(time),
        }
    }

    /// Time and value from which a ramp following the event at `index` starts.
    fn anchor(&self, index: usize) -> (f64, f64) {
        let event = &self.events[index];
        (event.time(), event.value_from(event.time()))
    }

    /// Samples `frames` values starting at `start`. This is the offline rendering mode.
    pub fn render(&self, sample_rate: f64, start: f64, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| self.value_at(start + i as f64 / sample_rate) as f32)
            .collect()
    }

    /// Forgets events that no longer influence values at or after `time`.
    pub fn prune_before(&mut self, time: f64) {
        let next = self.events.partition_point(|e| e.time() <= time);
        if next < 2 {
            return;
        }
        let keep = next - 1;
        let replacement = match &self.events[keep] {
            CurveEvent::SetValue { time, value } | CurveEvent::LinearRamp { time, value } => {
                CurveEvent::SetValue {
                    time: *time,
                    value: *value,
                }
            }
            other => other.clone(),
        };
        self.events.drain(..keep);
        self.events[0] = replacement;
    }

    fn push(&mut self, mut event: CurveEvent) {
        let last = self.last_time();
        if event.time() < last {
            log::debug!(
                "Automation event at {:.6}s precedes {:.6}s, clamping forward",
                event.time(),
                last
            );
            event.set_time(last);
        }
        self.events.push(event);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AutomationParam for Timeline {
    fn set_value_at(&mut self, value: f64, time: f64) {
        self.push(CurveEvent::SetValue { time, value });
    }

    fn linear_ramp_to(&mut self, value: f64, time: f64) {
        self.push(CurveEvent::LinearRamp { time, value });
    }

    fn exponential_approach(&mut self, target: f64, start: f64, time_constant: f64) {
        let start = start.max(self.last_time());
        let from = self.value_at(start);
        self.push(CurveEvent::ExponentialApproach {
            time: start,
            target,
            time_constant,
            from,
        });
    }

    fn cancel_and_hold_at(&mut self, time: f64) {
        let value = self.value_at(time);
        let next = self.events.partition_point(|e| e.time() <= time);
        let ramp_in_flight = matches!(self.events.get(next), Some(CurveEvent::LinearRamp { .. }));
        self.events.truncate(next);
        if ramp_in_flight {
            self.events.push(CurveEvent::LinearRamp { time, value });
        } else {
            self.events.push(CurveEvent::SetValue { time, value });
        }
    }

    fn play_loop(&mut self, buffer: Arc<[f32]>, start: f64, period: f64) {
        self.push(CurveEvent::Loop {
            time: start,
            period,
            buffer,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_ramp_interpolates_from_anchor() {
        let mut lane = Timeline::new(0.0);
        lane.set_value_at(100.0, 1.0);
        lane.linear_ramp_to(200.0, 2.0);
        assert_eq!(lane.value_at(0.5), 0.0);
        assert_eq!(lane.value_at(1.0), 100.0);
        assert!((lane.value_at(1.5) - 150.0).abs() < 1e-9);
        assert_eq!(lane.value_at(3.0), 200.0);
    }

    #[test]
    fn test_exponential_approach() {
        let mut lane = Timeline::new(0.0);
        lane.exponential_approach(1.0, 0.0, 0.5);
        assert_eq!(lane.value_at(0.0), 0.0);
        let expected = 1.0 - (-1.0f64).exp();
        assert!((lane.value_at(0.5) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cancel_and_hold_truncates_ramp() {
        let mut lane = Timeline::new(0.0);
        lane.set_value_at(0.0, 0.0);
        lane.linear_ramp_to(10.0, 10.0);
        lane.cancel_and_hold_at(4.0);
        assert!((lane.value_at(2.0) - 2.0).abs() < 1e-9);
        assert!((lane.value_at(4.0) - 4.0).abs() < 1e-9);
        assert!((lane.value_at(8.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_events_in_the_past_are_clamped() {
        let mut lane = Timeline::new(0.0);
        lane.set_value_at(1.0, 5.0);
        lane.set_value_at(2.0, 3.0);
        assert_eq!(lane.events()[1].time(), 5.0);
        assert_eq!(lane.value_at(5.0), 2.0);
    }

    #[test]
    fn test_loop_playback() {
        let mut lane = Timeline::new(0.0);
        let buffer: Arc<[f32]> = Arc::from(vec![0.0, 1.0, 2.0, 3.0]);
        lane.play_loop(buffer, 1.0, 4.0);
        assert!((lane.value_at(2.0) - 1.0).abs() < 1e-9);
        assert!((lane.value_at(6.5) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_ramp_after_approach_starts_from_approach_origin() {
        let mut lane = Timeline::new(0.0);
        lane.exponential_approach(10.0, 0.0, 0.5);
        lane.linear_ramp_to(4.0, 2.0);
        assert!((lane.value_at(1.0) - 2.0).abs() < 1e-9);

        let mut held = Timeline::new(0.0);
        held.exponential_approach(10.0, 0.0, 0.5);
        let reached = held.value_at(1.0);
        held.set_value_at(reached, 1.0);
        held.linear_ramp_to(4.0, 2.0);
        assert_eq!(held.value_at(1.0), reached);
        assert!((held.value_at(1.5) - (reached + 4.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_prune_keeps_value_in_effect() {
        let mut lane = Timeline::new(0.0);
        lane.set_value_at(1.0, 0.0);
        lane.set_value_at(2.0, 1.0);
        lane.set_value_at(3.0, 2.0);
        lane.linear_ramp_to(5.0, 4.0);
        lane.prune_before(3.0);
        assert_eq!(lane.events().len(), 2);
        assert!((lane.value_at(3.5) - 4.5).abs() < 1e-9);
    }
}
