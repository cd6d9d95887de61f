use serde::{Deserialize, Serialize};

use crate::synth::prelude::PI;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Waveform {
    #[default]
    Sine,
    /// Positive half of a sine, silent for the negative half.
    HalfSine,
    /// Rectified sine.
    AbsSine,
    /// Rising quarters of a rectified sine, silent in between.
    QuarterSine,
    Triangle,
    Sawtooth,
    Square,
    /// Harmonic table registered in a [`WaveformBank`].
    Custom(usize),
}

impl Waveform {
    /// Built-in waveforms evaluated at `phase` radians. Custom waveforms need a bank.
    pub fn evaluate(&self, phase: f64) -> Option<f64> {
        let cycle = (phase / (2.0 * PI)).rem_euclid(1.0);
        let sine = (2.0 * PI * cycle).sin();
        let value = match self {
            Waveform::Sine => sine,
            Waveform::HalfSine => sine.max(0.0),
            Waveform::AbsSine => sine.abs(),
            Waveform::QuarterSine => {
                if cycle % 0.5 < 0.25 {
                    sine.abs()
                } else {
                    0.0
                }
            }
            Waveform::Triangle => {
                if cycle < 0.25 {
                    4.0 * cycle
                } else if cycle < 0.75 {
                    2.0 - 4.0 * cycle
                } else {
                    4.0 * cycle - 4.0
                }
            }
            Waveform::Sawtooth => 2.0 * (cycle - (cycle + 0.5).floor()),
            Waveform::Square => {
                if cycle < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Custom(_) => return None,
        };
        Some(value)
    }
}

/// Custom waveforms described by the amplitudes of their sine harmonics.
#[derive(Debug, Default, Clone)]
pub struct WaveformBank {
    tables: Vec<Vec<f64>>,
}

impl WaveformBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waveform from harmonic amplitudes, fundamental first. The result is
    /// normalized to a peak of 1.
    pub fn register(&mut self, harmonics: &[f64]) -> Waveform {
        let mut table = harmonics.to_vec();
        let peak = (0..1024)
            .map(|i| sum_harmonics(&table, 2.0 * PI * i as f64 / 1024.0).abs())
            .fold(0.0, f64::max);
        if peak > 0.0 {
            table.iter_mut().for_each(|amplitude| *amplitude /= peak);
        }
        self.tables.push(table);
        log::debug!(
            "Registered custom waveform {} with {} harmonics",
            self.tables.len() - 1,
            harmonics.len()
        );
        Waveform::Custom(self.tables.len() - 1)
    }

    pub fn contains(&self, waveform: Waveform) -> bool {
        match waveform {
            Waveform::Custom(id) => id < self.tables.len(),
            _ => true,
        }
    }

    /// Panics for a custom waveform that was never registered.
    pub fn evaluate(&self, waveform: Waveform, phase: f64) -> f64 {
        match waveform {
            Waveform::Custom(id) => {
                assert!(
                    id < self.tables.len(),
                    "custom waveform {id} has not been registered"
                );
                sum_harmonics(&self.tables[id], phase)
            }
            builtin => builtin.evaluate(phase).unwrap_or_default(),
        }
    }
}

fn sum_harmonics(table: &[f64], phase: f64) -> f64 {
    table
        .iter()
        .enumerate()
        .map(|(k, amplitude)| amplitude * ((k + 1) as f64 * phase).sin())
        .sum()
}

/// One oscillator instance. An operator replaces its oscillator (bumping the generation and
/// restarting the phase) on waveform changes and retriggers that need a clean start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub generation: u64,
    pub start: f64,
    pub stop: Option<f64>,
}

impl Oscillator {
    pub fn is_running_at(&self, time: f64) -> bool {
        time >= self.start && self.stop.map_or(true, |stop| time < stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shapes() {
        let quarter = PI / 2.0;
        assert!((Waveform::Sine.evaluate(quarter).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(Waveform::HalfSine.evaluate(3.0 * quarter), Some(0.0));
        assert!((Waveform::AbsSine.evaluate(3.0 * quarter).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(Waveform::QuarterSine.evaluate(PI * 0.75), Some(0.0));
        assert!((Waveform::Triangle.evaluate(quarter).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(Waveform::Square.evaluate(PI * 1.5), Some(-1.0));
        assert_eq!(Waveform::Custom(0).evaluate(0.0), None);
    }

    #[test]
    fn test_custom_waveform_is_normalized() {
        let mut bank = WaveformBank::new();
        let waveform = bank.register(&[2.0]);
        assert_eq!(waveform, Waveform::Custom(0));
        assert!((bank.evaluate(waveform, PI / 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "has not been registered")]
    fn test_unregistered_waveform_panics() {
        WaveformBank::new().evaluate(Waveform::Custom(3), 0.0);
    }
}
