use serde::{Deserialize, Serialize};

use super::context::SynthContext;
use super::prelude::{clamped, seeded_random, PI};

/// Vibrato depths in cents for the hardware PMS settings.
pub const VIBRATO_PRESETS: [f64; 8] = [0.0, 3.4, 6.7, 10.0, 14.0, 20.0, 40.0, 80.0];
/// Tremolo depths in dB for the hardware AMS settings.
pub const TREMOLO_PRESETS: [f64; 4] = [0.0, 1.4, 5.9, 11.8];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfoShape {
    #[default]
    Triangle,
    Sine,
    SawUp,
    SawDown,
    Square,
    SampleAndHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    frequency: f64,
    shape: LfoShape,
    /// Seconds after key-on before the LFO starts to fade in.
    delay: f64,
    /// Seconds the fade-in takes.
    fade: f64,
    key_sync: bool,
    seed: u64,
    phase_origin: f64,
    trigger_time: f64,
}

impl Lfo {
    pub fn new(context: &SynthContext) -> Self {
        Self {
            frequency: context.lfo_frequencies[0],
            shape: LfoShape::Triangle,
            delay: 0.0,
            fade: 0.0,
            key_sync: false,
            seed: 0,
            phase_origin: 0.0,
            trigger_time: 0.0,
        }
    }

    /// Selects one of the eight clock-derived hardware rates.
    pub fn set_rate(&mut self, context: &SynthContext, rate: u8) {
        let rate = clamped("LFO rate", rate, 0, 7);
        self.frequency = context.lfo_frequencies[rate as usize];
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = clamped("LFO frequency", frequency, 0.0, 1000.0);
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn set_shape(&mut self, shape: LfoShape) {
        self.shape = shape;
    }

    pub fn shape(&self) -> LfoShape {
        self.shape
    }

    pub fn set_delay(&mut self, seconds: f64) {
        self.delay = seconds.max(0.0);
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn set_fade(&mut self, seconds: f64) {
        self.fade = seconds.max(0.0);
    }

    pub fn fade(&self) -> f64 {
        self.fade
    }

    /// With key sync on, every key-on restarts the LFO cycle.
    pub fn set_key_sync(&mut self, key_sync: bool) {
        self.key_sync = key_sync;
    }

    pub fn key_sync(&self) -> bool {
        self.key_sync
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn key_on(&mut self, time: f64) {
        self.trigger_time = time;
        if self.key_sync {
            self.phase_origin = time;
        }
    }

    /// Depth scaling from the delay and fade-in, 0..1.
    pub fn amount_at(&self, time: f64) -> f64 {
        let since = time - self.trigger_time - self.delay;
        if since < 0.0 {
            0.0
        } else if since >= self.fade {
            1.0
        } else {
            since / self.fade
        }
    }

    /// LFO output in -1..1 at `time`, including delay and fade-in.
    pub fn value_at(&self, time: f64) -> f64 {
        let cycles = (time - self.phase_origin).max(0.0) * self.frequency;
        self.shape_value(cycles) * self.amount_at(time)
    }

    fn shape_value(&self, cycles: f64) -> f64 {
        let phase = cycles.rem_euclid(1.0);
        match self.shape {
            LfoShape::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
            LfoShape::Sine => (2.0 * PI * phase).sin(),
            LfoShape::SawUp => 2.0 * phase - 1.0,
            LfoShape::SawDown => 1.0 - 2.0 * phase,
            LfoShape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::SampleAndHold => seeded_random(self.seed ^ cycles.floor() as u64),
        }
    }
}

/// Frequency factor for `cents` of vibrato at LFO value `lfo`.
pub fn vibrato_factor(lfo: f64, cents: f64) -> f64 {
    2f64.powf(lfo * cents / 1200.0)
}

/// Attenuation in dB for `depth` dB of tremolo at LFO value `lfo`. Full output at the LFO peak.
pub fn tremolo_attenuation(lfo: f64, depth: f64) -> f64 {
    depth * (1.0 - lfo) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_and_fade() {
        let mut lfo = Lfo::new(&SynthContext::default());
        lfo.set_delay(0.5);
        lfo.set_fade(1.0);
        lfo.key_on(1.0);
        assert_eq!(lfo.amount_at(1.25), 0.0);
        assert!((lfo.amount_at(2.0) - 0.5).abs() < 1e-12);
        assert_eq!(lfo.amount_at(3.0), 1.0);
    }

    #[test]
    fn test_key_sync_restarts_cycle() {
        let mut lfo = Lfo::new(&SynthContext::default());
        lfo.set_frequency(1.0);
        lfo.set_key_sync(true);
        lfo.key_on(10.3);
        assert!(lfo.value_at(10.3).abs() < 1e-12);
        assert!((lfo.value_at(10.55) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_and_hold_is_stable_within_a_cycle() {
        let mut lfo = Lfo::new(&SynthContext::default());
        lfo.set_frequency(2.0);
        lfo.set_shape(LfoShape::SampleAndHold);
        assert_eq!(lfo.value_at(0.1), lfo.value_at(0.4));
        assert!(lfo.value_at(0.1).abs() <= 1.0);
    }

    #[test]
    fn test_modulation_curves() {
        assert_eq!(vibrato_factor(1.0, 1200.0), 2.0);
        assert_eq!(vibrato_factor(0.0, 80.0), 1.0);
        assert_eq!(tremolo_attenuation(1.0, 11.8), 0.0);
        assert_eq!(tremolo_attenuation(-1.0, 11.8), 11.8);
    }
}
