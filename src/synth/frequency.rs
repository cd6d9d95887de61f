//! Conversions between the chip's block/frequency-number pitch representation, the "full"
//! frequency number used for ratio arithmetic, Hertz, and key codes.

use serde::{Deserialize, Serialize};

/// Frequency numbers at or above this value are moved up a block.
pub const FREQ_NUM_LIMIT: f64 = 2047.5;
pub const MAX_BLOCK: u8 = 7;
pub const MAX_FREQ_NUM: u16 = 2047;
/// Width of the phase increment register before the multiplier is applied.
const DETUNED_FREQ_MODULUS: i64 = 1 << 17;
/// Width of the phase increment after the multiplier is applied.
pub const FULL_FREQ_MASK: u32 = 0xF_FFFF;

/// Detune deltas in full frequency units for the four positive presets, indexed by key code.
pub const DETUNE_TABLE: [[u8; 32]; 4] = [
    [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0,
    ],
    [
        0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 8,
        8,
    ],
    [
        1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 9, 10, 11, 12, 13, 14, 16,
        16, 16, 16,
    ],
    [
        2, 2, 2, 2, 2, 3, 3, 3, 4, 4, 4, 5, 5, 6, 6, 7, 8, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 20,
        22, 22, 22, 22,
    ],
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyComponents {
    pub block: u8,
    pub freq_num: u16,
}

impl FrequencyComponents {
    pub fn new(block: u8, freq_num: u16) -> Self {
        Self {
            block: block.min(MAX_BLOCK),
            freq_num: freq_num.min(MAX_FREQ_NUM),
        }
    }

    pub fn full_freq(&self) -> u32 {
        components_to_full_freq(self.block, self.freq_num)
    }

    pub fn key_code(&self) -> u8 {
        calc_key_code(self.block, self.freq_num)
    }
}

/// `floor(freq_num * 2^(block - 1))`
pub fn components_to_full_freq(block: u8, freq_num: u16) -> u32 {
    ((freq_num as u32) << block.min(MAX_BLOCK)) >> 1
}

/// Block and unrounded frequency number for `full_freq`. Frequency numbers at or above
/// `octave_threshold` move up a block while the block can still grow.
pub fn raw_components(full_freq: f64, octave_threshold: f64) -> (u8, f64) {
    let threshold = octave_threshold.min(FREQ_NUM_LIMIT);
    let mut block = 0;
    let mut freq_num = full_freq.max(0.0) * 2.0;
    while freq_num >= threshold && block < MAX_BLOCK {
        freq_num /= 2.0;
        block += 1;
    }
    (block, freq_num)
}

pub fn full_freq_to_components(full_freq: f64, octave_threshold: f64) -> FrequencyComponents {
    let (block, freq_num) = raw_components(full_freq, octave_threshold);
    FrequencyComponents {
        block,
        freq_num: freq_num.round().min(MAX_FREQ_NUM as f64) as u16,
    }
}

/// 5 bit key code used for envelope rate scaling and detune lookups.
pub fn calc_key_code(block: u8, freq_num: u16) -> u8 {
    let f11 = freq_num >= 1024;
    let lsb = freq_num >= 1152 || (!f11 && freq_num >= 896);
    (block.min(MAX_BLOCK) << 2) | ((f11 as u8) << 1) | lsb as u8
}

/// Signed full frequency delta for detune setting 0..7. Settings 4..7 mirror 0..3 downwards.
pub fn detune_delta(detune: u8, key_code: u8) -> i32 {
    let delta = DETUNE_TABLE[(detune & 3) as usize][key_code.min(31) as usize] as i32;
    if detune & 4 != 0 {
        -delta
    } else {
        delta
    }
}

/// Applies detune deltas to a full frequency number, wrapping underflow the way the 17 bit
/// hardware register does.
pub fn detuned_full_freq(full_freq: u32, delta: i64) -> u32 {
    let mut detuned = full_freq as i64 + delta;
    if detuned < 0 {
        detuned += DETUNED_FREQ_MODULUS;
    }
    detuned as u32
}

pub fn frequency_to_full_freq(frequency: f64, frequency_step: f64) -> f64 {
    frequency / frequency_step
}

pub fn full_freq_to_frequency(full_freq: f64, frequency_step: f64) -> f64 {
    full_freq * frequency_step
}

/// Equal tempered frequency of a (possibly fractional) MIDI note.
pub fn midi_note_frequency(note: f64, reference_pitch: f64, reference_note: u8) -> f64 {
    reference_pitch * 2f64.powf((note - reference_note as f64) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_freq() {
        assert_eq!(components_to_full_freq(0, 1001), 500);
        assert_eq!(components_to_full_freq(1, 1001), 1001);
        assert_eq!(components_to_full_freq(4, 1083), 8664);
    }

    #[test]
    fn test_full_freq_to_components_halves_until_in_range() {
        let components = full_freq_to_components(8661.5, FREQ_NUM_LIMIT);
        assert_eq!(components, FrequencyComponents::new(4, 1083));
        let top = full_freq_to_components(1.0e7, FREQ_NUM_LIMIT);
        assert_eq!(top.block, 7);
        assert_eq!(top.freq_num, MAX_FREQ_NUM);
    }

    #[test]
    fn test_lower_threshold_forces_earlier_block() {
        let natural = full_freq_to_components(1000.0, FREQ_NUM_LIMIT);
        assert_eq!(natural, FrequencyComponents::new(0, 2000));
        let forced = full_freq_to_components(1000.0, 1900.0);
        assert_eq!(forced, FrequencyComponents::new(1, 1000));
    }

    #[test]
    fn test_key_code() {
        assert_eq!(calc_key_code(0, 0), 0);
        assert_eq!(calc_key_code(0, 895), 0);
        assert_eq!(calc_key_code(0, 896), 1);
        assert_eq!(calc_key_code(0, 1024), 2);
        assert_eq!(calc_key_code(0, 1151), 2);
        assert_eq!(calc_key_code(0, 1152), 3);
        assert_eq!(calc_key_code(7, 2047), 31);
        assert_eq!(calc_key_code(4, 1083), 18);
    }

    #[test]
    fn test_detune() {
        assert_eq!(detune_delta(0, 31), 0);
        assert_eq!(detune_delta(3, 31), 22);
        assert_eq!(detune_delta(7, 31), -22);
        assert_eq!(detune_delta(4, 20), 0);
        assert_eq!(detune_delta(1, 40), 8);
    }

    #[test]
    fn test_detune_underflow_wraps() {
        assert_eq!(detuned_full_freq(1, -2), (1 << 17) - 1);
        assert_eq!(detuned_full_freq(100, -2), 98);
    }
}
