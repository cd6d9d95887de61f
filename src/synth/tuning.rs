//! MIDI note to block/frequency-number tables.
//!
//! Only five key code bits describe pitch to the envelope generator, so naively quantizing all
//! 128 notes piles many of them onto the same key codes. Table generation therefore searches
//! for an octave threshold (a frequency number above which a note is moved up a block early)
//! that spreads notes across key codes as evenly as it can.

use super::context::SynthContext;
use super::frequency::{
    frequency_to_full_freq, full_freq_to_components, raw_components, FrequencyComponents,
    FREQ_NUM_LIMIT, MAX_BLOCK,
};

pub const NOTE_COUNT: usize = 128;
/// The threshold search never drops below this frequency number.
const MIN_OCTAVE_THRESHOLD: f64 = 1024.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    frequencies: Vec<f64>,
    components: Vec<FrequencyComponents>,
    octave_threshold: f64,
    frequency_step: f64,
}

impl Tuning {
    /// Standard 12 tone equal temperament with A4 = 440 Hz.
    pub fn standard(context: &SynthContext) -> Self {
        Self::equal_temperament(context, 440.0, 69, 12.0, &[1.0])
    }

    /// Equal division of the octave into `divisions` steps. Consecutive MIDI notes advance by
    /// the entries of `step_pattern` (in steps, cycling), which allows mapping a keyboard onto
    /// a subset of a microtonal scale.
    pub fn equal_temperament(
        context: &SynthContext,
        reference_pitch: f64,
        reference_note: u8,
        divisions: f64,
        step_pattern: &[f64],
    ) -> Self {
        let pattern = if step_pattern.is_empty() {
            &[1.0][..]
        } else {
            step_pattern
        };
        let divisions = if divisions > 0.0 { divisions } else { 12.0 };
        let reference = reference_note.min(127) as i32;
        let pattern_step = |key: i32| pattern[(key - reference).rem_euclid(pattern.len() as i32) as usize];

        let frequencies = (0..NOTE_COUNT as i32)
            .map(|note| {
                let steps: f64 = if note >= reference {
                    (reference..note).map(pattern_step).sum()
                } else {
                    -(note..reference).map(pattern_step).sum::<f64>()
                };
                reference_pitch * 2f64.powf(steps / divisions)
            })
            .collect();
        Self::from_frequencies(frequencies, context.frequency_step)
    }

    /// Tuning from frequency ratios relative to the reference note. The last ratio is the
    /// period (usually 2.0, the octave) and the scale repeats every `ratios.len()` notes.
    pub fn ratio_tuning(
        context: &SynthContext,
        reference_pitch: f64,
        reference_note: u8,
        ratios: &[f64],
    ) -> Self {
        let Some(&period) = ratios.last() else {
            return Self::equal_temperament(context, reference_pitch, reference_note, 12.0, &[1.0]);
        };
        let degrees = ratios.len() as i32;
        let reference = reference_note.min(127) as i32;
        let frequencies = (0..NOTE_COUNT as i32)
            .map(|note| {
                let offset = note - reference;
                let cycle = offset.div_euclid(degrees);
                let degree = offset.rem_euclid(degrees);
                let ratio = if degree == 0 {
                    1.0
                } else {
                    ratios[degree as usize - 1]
                };
                reference_pitch * period.powi(cycle) * ratio
            })
            .collect();
        Self::from_frequencies(frequencies, context.frequency_step)
    }

    /// Quantizes ideal note frequencies, then repeatedly lowers the octave threshold to the
    /// largest frequency number still below it for as long as that reduces the variance of the
    /// key code populations.
    pub fn from_frequencies(frequencies: Vec<f64>, frequency_step: f64) -> Self {
        let full_freqs: Vec<f64> = frequencies
            .iter()
            .map(|&frequency| frequency_to_full_freq(frequency, frequency_step))
            .collect();

        let mut octave_threshold = FREQ_NUM_LIMIT;
        let mut components = quantize(&full_freqs, octave_threshold);
        let mut variance = key_code_variance(&components);

        loop {
            let candidate = full_freqs
                .iter()
                .filter_map(|&full_freq| {
                    let (block, freq_num) = raw_components(full_freq, octave_threshold);
                    (block < MAX_BLOCK && freq_num > MIN_OCTAVE_THRESHOLD).then_some(freq_num)
                })
                .fold(None, |max: Option<f64>, freq_num| {
                    Some(max.map_or(freq_num, |max| max.max(freq_num)))
                });
            let Some(candidate) = candidate else {
                break;
            };
            let trial = quantize(&full_freqs, candidate);
            let trial_variance = key_code_variance(&trial);
            if trial_variance >= variance {
                break;
            }
            octave_threshold = candidate;
            components = trial;
            variance = trial_variance;
        }

        log::debug!(
            "Tuning table built with octave threshold {:.3} (key code variance {:.3})",
            octave_threshold,
            variance
        );
        Self {
            frequencies,
            components,
            octave_threshold,
            frequency_step,
        }
    }

    pub fn components(&self, note: u8) -> FrequencyComponents {
        self.components[(note as usize).min(NOTE_COUNT - 1)]
    }

    /// Ideal (unquantized) frequency of a note in Hz.
    pub fn frequency(&self, note: u8) -> f64 {
        self.frequencies[(note as usize).min(NOTE_COUNT - 1)]
    }

    pub fn octave_threshold(&self) -> f64 {
        self.octave_threshold
    }

    pub fn frequency_step(&self) -> f64 {
        self.frequency_step
    }

    /// Converts an arbitrary frequency with the same quantization the table used.
    pub fn frequency_to_components(&self, frequency: f64) -> FrequencyComponents {
        full_freq_to_components(
            frequency_to_full_freq(frequency, self.frequency_step),
            self.octave_threshold,
        )
    }

    /// Number of notes per key code.
    pub fn key_code_histogram(&self) -> [usize; 32] {
        histogram(&self.components)
    }
}

fn quantize(full_freqs: &[f64], octave_threshold: f64) -> Vec<FrequencyComponents> {
    full_freqs
        .iter()
        .map(|&full_freq| full_freq_to_components(full_freq, octave_threshold))
        .collect()
}

fn histogram(components: &[FrequencyComponents]) -> [usize; 32] {
    let mut counts = [0; 32];
    for component in components {
        counts[component.key_code() as usize] += 1;
    }
    counts
}

fn key_code_variance(components: &[FrequencyComponents]) -> f64 {
    let counts = histogram(components);
    let mean = components.len() as f64 / counts.len() as f64;
    counts
        .iter()
        .map(|&count| (count as f64 - mean).powi(2))
        .sum::<f64>()
        / counts.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_note_keeps_reference_pitch() {
        let context = SynthContext::default();
        let tuning = Tuning::standard(&context);
        assert_eq!(tuning.frequency(69), 440.0);
        assert!((tuning.frequency(81) - 880.0).abs() < 1e-9);
        assert!((tuning.frequency(57) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_spreading_never_raises_variance() {
        let context = SynthContext::default();
        let tuning = Tuning::standard(&context);
        let naive = quantize(
            &(0..128)
                .map(|note| frequency_to_full_freq(tuning.frequency(note), context.frequency_step))
                .collect::<Vec<_>>(),
            FREQ_NUM_LIMIT,
        );
        assert!(key_code_variance(&tuning.components) <= key_code_variance(&naive));
        assert!(tuning.octave_threshold() <= FREQ_NUM_LIMIT);
        assert!(tuning.octave_threshold() > MIN_OCTAVE_THRESHOLD);
    }

    #[test]
    fn test_step_pattern() {
        let context = SynthContext::default();
        // Whole tone steps of 24-EDO, i.e. ordinary semitones.
        let tuning = Tuning::equal_temperament(&context, 440.0, 69, 24.0, &[2.0]);
        assert!((tuning.frequency(70) - 440.0 * 2f64.powf(1.0 / 12.0)).abs() < 1e-9);
        // A major scale pattern keeps the octave seven keys above the reference.
        let major = Tuning::equal_temperament(&context, 440.0, 69, 12.0, &[2., 2., 1., 2., 2., 2., 1.]);
        assert!((major.frequency(76) - 880.0).abs() < 1e-9);
        assert!((major.frequency(62) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_tuning() {
        let context = SynthContext::default();
        let just = [9. / 8., 5. / 4., 4. / 3., 3. / 2., 5. / 3., 15. / 8., 2.];
        let tuning = Tuning::ratio_tuning(&context, 264.0, 60, &just);
        assert_eq!(tuning.frequency(60), 264.0);
        assert!((tuning.frequency(64) - 396.0).abs() < 1e-9);
        assert!((tuning.frequency(67) - 528.0).abs() < 1e-9);
        assert!((tuning.frequency(53) - 132.0).abs() < 1e-9);
    }
}
