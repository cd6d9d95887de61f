use super::automation::{AutomationParam, Timeline};
use super::context::SynthContext;
use super::envelope::EnvelopeGenerator;
use super::frequency::{
    detune_delta, detuned_full_freq, full_freq_to_components, FrequencyComponents,
    FREQ_NUM_LIMIT, FULL_FREQ_MASK,
};
use super::prelude::clamped;
use super::waveform::{Oscillator, Waveform};

/// Coarse detune presets in cents.
const DETUNE2_CENTS: [f64; 4] = [0.0, 600.0, 781.0, 950.0];
/// Multiples a chip register can express.
const LEGAL_MULTIPLES: [f64; 16] = [
    0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0,
];
const MAX_MULTIPLE: f64 = 64.0;

#[derive(Debug, Clone)]
pub struct Operator {
    context: SynthContext,
    pub envelope: EnvelopeGenerator,
    /// Block and frequency number last received from the channel.
    channel_components: FrequencyComponents,
    /// Own block and frequency number, used while the frequency is fixed.
    fixed_components: FrequencyComponents,
    fixed: bool,
    multiple: f64,
    detune: u8,
    detune2: u8,
    /// Seconds per octave, 0 disables glide.
    glide_rate: f64,
    frequency: Timeline,
    last_frequency: Option<f64>,
    /// Cents of vibrato at full LFO swing.
    vibrato_depth: f64,
    /// dB of tremolo at full LFO swing.
    tremolo_depth: f64,
    output_level: f64,
    key_is_on: bool,
    disabled: bool,
    waveform: Waveform,
    oscillators: Vec<Oscillator>,
    generation: u64,
    sound_off_time: Option<f64>,
}

impl Operator {
    pub fn new(context: SynthContext) -> Self {
        Self {
            context,
            envelope: EnvelopeGenerator::new(),
            channel_components: FrequencyComponents::default(),
            fixed_components: FrequencyComponents::default(),
            fixed: false,
            multiple: 1.0,
            detune: 0,
            detune2: 0,
            glide_rate: 0.0,
            frequency: Timeline::new(0.0),
            last_frequency: None,
            vibrato_depth: 0.0,
            tremolo_depth: 0.0,
            output_level: 1.0,
            key_is_on: false,
            disabled: false,
            waveform: Waveform::Sine,
            oscillators: Vec::new(),
            generation: 0,
            sound_off_time: None,
        }
    }

    /// Block and frequency number the operator currently sounds from, before its multiple.
    pub fn components(&self) -> FrequencyComponents {
        if self.fixed {
            self.fixed_components
        } else {
            self.channel_components
        }
    }

    pub fn key_code(&self) -> u8 {
        self.components().key_code()
    }

    /// Receives the channel's pitch. Ignored (but remembered) while the frequency is fixed.
    pub fn set_frequency(&mut self, block: u8, freq_num: u16, time: f64, glide: bool) {
        self.channel_components = FrequencyComponents::new(block, freq_num);
        if !self.fixed {
            self.apply_frequency(time, glide);
        }
    }

    /// Sets the operator's own pitch, which sounds while the frequency is fixed.
    pub fn set_fixed_frequency(&mut self, block: u8, freq_num: u16, time: f64, glide: bool) {
        self.fixed_components = FrequencyComponents::new(block, freq_num);
        if self.fixed {
            self.apply_frequency(time, glide);
        }
    }

    pub fn fixed_components(&self) -> FrequencyComponents {
        self.fixed_components
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Switches between following the channel pitch and a fixed pitch. With `preserve` the
    /// sounding frequency is kept across the switch: fixing folds the multiple into the fixed
    /// components, unfixing derives the multiple from the ratio between the two pitches
    /// (rounded to a multiple the hardware supports when the ratio is not exact).
    pub fn fix_frequency(&mut self, fixed: bool, preserve: bool, time: f64) {
        if fixed == self.fixed {
            return;
        }
        if preserve {
            let channel_full = self.channel_components.full_freq() as f64;
            if fixed {
                let full = channel_full * self.multiple;
                self.fixed_components = full_freq_to_components(full, FREQ_NUM_LIMIT);
                self.multiple = 1.0;
            } else if channel_full > 0.0 {
                let ratio =
                    self.fixed_components.full_freq() as f64 * self.multiple / channel_full;
                self.multiple = nearest_multiple(ratio);
                if (self.multiple - ratio).abs() > 1e-9 {
                    log::warn!(
                        "Fixed frequency is {ratio:.4} times the channel frequency, using multiple {}",
                        self.multiple
                    );
                }
            }
        }
        self.fixed = fixed;
        self.apply_frequency(time, false);
    }

    /// Frequency multiple. 0 (or anything below) selects one half, as the hardware does.
    pub fn set_multiple(&mut self, multiple: f64, time: f64) {
        self.multiple = if multiple <= 0.0 {
            0.5
        } else {
            clamped("frequency multiple", multiple, 0.0, MAX_MULTIPLE)
        };
        self.apply_frequency(time, false);
    }

    pub fn multiple(&self) -> f64 {
        self.multiple
    }

    pub fn set_detune(&mut self, detune: u8, time: f64) {
        self.detune = clamped("detune", detune, 0, 7);
        self.apply_frequency(time, false);
    }

    pub fn detune(&self) -> u8 {
        self.detune
    }

    pub fn set_detune2(&mut self, detune2: u8, time: f64) {
        self.detune2 = clamped("coarse detune", detune2, 0, 3);
        self.apply_frequency(time, false);
    }

    pub fn detune2(&self) -> u8 {
        self.detune2
    }

    pub fn set_glide_rate(&mut self, seconds_per_octave: f64) {
        self.glide_rate = seconds_per_octave.max(0.0);
    }

    pub fn glide_rate(&self) -> f64 {
        self.glide_rate
    }

    /// Phase increment in full frequency units: detuned, multiplied and masked to 20 bits.
    pub fn phase_increment(&self) -> u32 {
        let components = self.components();
        let full = components.full_freq();
        let key_code = components.key_code();
        let mut delta = detune_delta(self.detune, key_code) as i64;
        if self.detune2 > 0 {
            let ratio = 2f64.powf(DETUNE2_CENTS[self.detune2 as usize] / 1200.0);
            delta += (full as f64 * (ratio - 1.0)).round() as i64;
        }
        let detuned = detuned_full_freq(full, delta);
        ((detuned as f64 * self.multiple).floor() as u32) & FULL_FREQ_MASK
    }

    /// Resolved frequency in Hz.
    pub fn resolved_frequency(&self) -> f64 {
        self.phase_increment() as f64 * self.context.frequency_step
    }

    fn apply_frequency(&mut self, time: f64, glide: bool) {
        let target = self.resolved_frequency();
        self.frequency.cancel_and_hold_at(time);
        match self.last_frequency {
            Some(previous) if glide && self.glide_rate > 0.0 && previous > 0.0 && target > 0.0 => {
                let duration = (target / previous).log2().abs() * self.glide_rate;
                self.frequency.set_value_at(self.frequency.value_at(time), time);
                self.frequency.linear_ramp_to(target, time + duration);
                log::debug!("Gliding {previous:.2} Hz -> {target:.2} Hz over {duration:.3}s");
            }
            _ => self.frequency.set_value_at(target, time),
        }
        self.last_frequency = Some(target);
    }

    /// Frequency lane in Hz, before vibrato.
    pub fn frequency(&self) -> &Timeline {
        &self.frequency
    }

    pub fn set_vibrato_depth(&mut self, cents: f64) {
        self.vibrato_depth = clamped("vibrato depth", cents, 0.0, 1200.0);
    }

    pub fn vibrato_depth(&self) -> f64 {
        self.vibrato_depth
    }

    pub fn set_tremolo_depth(&mut self, decibels: f64) {
        self.tremolo_depth = clamped("tremolo depth", decibels, 0.0, 96.0);
    }

    pub fn tremolo_depth(&self) -> f64 {
        self.tremolo_depth
    }

    pub fn set_output_level(&mut self, level: f64) {
        self.output_level = clamped("operator output level", level, 0.0, 1.0);
    }

    pub fn output_level(&self) -> f64 {
        self.output_level
    }

    pub fn set_disabled(&mut self, disabled: bool, time: f64) {
        self.disabled = disabled;
        if disabled {
            self.sound_off(time);
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn key_is_on(&self) -> bool {
        self.key_is_on
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Changes the waveform from `time` on. A running oscillator is replaced at that time.
    pub fn set_waveform(&mut self, waveform: Waveform, time: f64) {
        if waveform == self.waveform {
            return;
        }
        self.waveform = waveform;
        if self.oscillator().is_some_and(|osc| osc.stop.map_or(true, |stop| stop > time)) {
            self.replace_oscillator(time);
        }
    }

    pub fn oscillator(&self) -> Option<&Oscillator> {
        self.oscillators.last()
    }

    /// Oscillator instances that are or were scheduled, oldest first.
    pub fn oscillators(&self) -> &[Oscillator] {
        &self.oscillators
    }

    /// The oscillator producing output at `time`, if any.
    pub fn oscillator_at(&self, time: f64) -> Option<&Oscillator> {
        self.oscillators.iter().rev().find(|osc| osc.is_running_at(time))
    }

    /// Hands over from the current oscillator to a new one at `time`. A stop the old one had
    /// scheduled after that point moves to the new oscillator.
    fn replace_oscillator(&mut self, time: f64) {
        let (start, carried) = match self.oscillators.last_mut() {
            Some(old) => {
                let start = time.max(old.start);
                let carried = old.stop.filter(|&stop| stop > start);
                old.stop = Some(old.stop.map_or(start, |stop| stop.min(start)));
                (start, carried)
            }
            None => (time, None),
        };
        self.generation += 1;
        self.oscillators.push(Oscillator {
            waveform: self.waveform,
            generation: self.generation,
            start,
            stop: carried,
        });
    }

    /// Stops the current oscillator at `time` (never before it started).
    pub fn schedule_stop(&mut self, time: f64) {
        if let Some(osc) = self.oscillators.last_mut() {
            osc.stop = Some(time.max(osc.start));
        }
    }

    pub fn cancel_stop(&mut self) {
        if let Some(osc) = self.oscillators.last_mut() {
            osc.stop = None;
        }
    }

    /// Cancels a stop scheduled after `time`. An oscillator that already stopped stays stopped.
    pub fn keep_running(&mut self, time: f64) {
        if let Some(osc) = self.oscillators.last_mut() {
            if osc.stop.is_some_and(|stop| stop > time) {
                osc.stop = None;
            }
        }
    }

    /// Time from which the operator is silent, if known.
    pub fn sound_off_time(&self) -> Option<f64> {
        self.sound_off_time
    }

    /// Triggers the envelope and decides whether the oscillator can keep running. Returns the
    /// time the operator falls silent by itself, if it does.
    pub fn key_on(&mut self, velocity: u8, time: f64) -> Option<f64> {
        if self.disabled {
            self.sound_off_time = Some(time);
            return self.sound_off_time;
        }
        let still_sounding = self.envelope.linear_value_at_time(time) > 0.0;
        let key_code = self.key_code();
        let trigger = self
            .envelope
            .key_on(velocity, key_code, time, self.context.envelope_tick);
        let stopped = self
            .oscillator()
            .map_or(true, |osc| osc.stop.is_some_and(|stop| stop <= time));

        if stopped {
            self.replace_oscillator(time);
        } else if self.envelope.reset() && still_sounding {
            // The dampen has brought the old note to silence by the time the attack starts.
            self.replace_oscillator(trigger.begin_attack);
            self.cancel_stop();
        } else {
            self.cancel_stop();
        }
        self.key_is_on = true;
        self.sound_off_time = trigger.silent_from;
        self.sound_off_time
    }

    pub fn key_off(&mut self, time: f64) -> Option<f64> {
        self.key_is_on = false;
        let key_code = self.key_code();
        if let Some(end) = self.envelope.key_off(key_code, time) {
            self.sound_off_time = Some(end);
        }
        self.sound_off_time
    }

    pub fn sound_off(&mut self, time: f64) -> f64 {
        self.key_is_on = false;
        let time = self.envelope.sound_off(time);
        self.sound_off_time = Some(time);
        time
    }

    /// Drops automation and oscillators that ended before `time`.
    pub fn prune_before(&mut self, time: f64) {
        self.frequency.prune_before(time);
        self.envelope.prune_before(time);
        let keep_from = self
            .oscillators
            .iter()
            .position(|osc| osc.stop.map_or(true, |stop| stop > time))
            .unwrap_or(self.oscillators.len().saturating_sub(1));
        self.oscillators.drain(..keep_from);
    }
}

fn nearest_multiple(ratio: f64) -> f64 {
    LEGAL_MULTIPLES
        .iter()
        .copied()
        .min_by(|a, b| (a - ratio).abs().total_cmp(&(b - ratio).abs()))
        .unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operator() -> Operator {
        Operator::new(SynthContext::default())
    }

    #[test]
    fn test_multiple_scales_frequency() {
        let mut op = operator();
        op.set_frequency(4, 1083, 0.0, false);
        let base = op.resolved_frequency();
        op.set_multiple(2.0, 0.0);
        assert!((op.resolved_frequency() - 2.0 * base).abs() < 1e-9);
        op.set_multiple(0.0, 0.0);
        assert_eq!(op.multiple(), 0.5);
        assert_eq!(op.phase_increment(), 8664 / 2);
    }

    #[test]
    fn test_detune_shifts_phase_increment() {
        let mut op = operator();
        op.set_frequency(4, 1083, 0.0, false);
        op.set_detune(3, 0.0);
        // key code 18, preset 3
        assert_eq!(op.phase_increment(), 8664 + 9);
        op.set_detune(7, 0.0);
        assert_eq!(op.phase_increment(), 8664 - 9);
    }

    #[test]
    fn test_glide_duration_depends_on_interval() {
        let mut op = operator();
        op.set_glide_rate(0.5);
        op.set_frequency(4, 1000, 0.0, false);
        op.set_frequency(5, 1000, 1.0, true);
        let lane = op.frequency();
        let low = 8000.0 * SynthContext::default().frequency_step;
        assert!((lane.value_at(1.0) - low).abs() < 1e-9);
        assert!((lane.value_at(1.25) - 1.5 * low).abs() < 1e-6);
        assert!((lane.value_at(1.5) - 2.0 * low).abs() < 1e-6);
    }

    #[test]
    fn test_fix_and_unfix_preserves_frequency() {
        let mut op = operator();
        op.set_frequency(4, 1083, 0.0, false);
        op.set_multiple(2.0, 0.0);
        let before = op.resolved_frequency();
        op.fix_frequency(true, true, 0.0);
        assert!(op.is_fixed());
        assert_eq!(op.multiple(), 1.0);
        assert_eq!(op.fixed_components(), FrequencyComponents::new(5, 1083));
        op.set_frequency(2, 500, 0.0, false);
        assert_eq!(op.resolved_frequency(), before);
        op.set_frequency(4, 1083, 0.0, false);
        op.fix_frequency(false, true, 0.0);
        assert_eq!(op.multiple(), 2.0);
        assert_eq!(op.resolved_frequency(), before);
    }

    #[test]
    fn test_inexact_fix_rounds_within_one_step() {
        let mut op = operator();
        op.set_frequency(4, 1083, 0.0, false);
        op.set_multiple(3.0, 0.0);
        let before = op.resolved_frequency();
        let step = SynthContext::default().frequency_step;
        op.fix_frequency(true, true, 0.0);
        // 25992 needs block 5, where one frequency number is 16 full units.
        assert!((op.resolved_frequency() - before).abs() <= 16.0 * step);
        op.fix_frequency(false, true, 0.0);
        assert_eq!(op.multiple(), 3.0);
        assert_eq!(op.resolved_frequency(), before);
    }

    #[test]
    fn test_retrigger_reuses_running_oscillator() {
        let mut op = operator();
        op.key_on(127, 0.0);
        let first = op.oscillator().map(|osc| osc.generation);
        op.key_off(1.0);
        op.key_on(127, 1.001);
        assert_eq!(op.oscillator().map(|osc| osc.generation), first);

        op.schedule_stop(2.0);
        op.key_on(127, 3.0);
        assert_ne!(op.oscillator().map(|osc| osc.generation), first);
        assert_eq!(op.oscillator().map(|osc| osc.start), Some(3.0));
    }

    #[test]
    fn test_waveform_change_replaces_oscillator() {
        let mut op = operator();
        op.key_on(127, 0.0);
        op.set_waveform(Waveform::Square, 0.5);
        assert_eq!(op.oscillators().len(), 2);
        assert_eq!(op.oscillator_at(0.25).map(|osc| osc.waveform), Some(Waveform::Sine));
        assert_eq!(op.oscillator_at(0.75).map(|osc| osc.waveform), Some(Waveform::Square));
    }

    #[test]
    fn test_waveform_change_keeps_scheduled_stop() {
        let mut op = operator();
        op.key_on(127, 0.0);
        op.schedule_stop(2.0);
        op.set_waveform(Waveform::Square, 0.5);
        let stops: Vec<_> = op.oscillators().iter().map(|osc| osc.stop).collect();
        assert_eq!(stops, vec![Some(0.5), Some(2.0)]);
        assert!(op.oscillator_at(1.0).is_some());
        assert!(op.oscillator_at(3.0).is_none());
    }

    #[test]
    fn test_reset_retrigger_runs_new_oscillator_unbounded() {
        let mut op = operator();
        op.envelope.set_reset(true);
        op.key_on(127, 0.0);
        op.key_off(0.5);
        op.schedule_stop(10.0);
        op.key_on(127, 0.501);
        assert_eq!(op.oscillators().len(), 2);
        assert_eq!(op.oscillator().and_then(|osc| osc.stop), None);
    }

    #[test]
    fn test_negative_multiple_selects_one_half() {
        let mut op = operator();
        op.set_multiple(-2.0, 0.0);
        assert_eq!(op.multiple(), 0.5);
        op.set_multiple(-0.25, 0.0);
        assert_eq!(op.multiple(), 0.5);
    }
}
