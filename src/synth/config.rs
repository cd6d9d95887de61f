use serde::{Deserialize, Serialize};

/// NTSC Mega Drive master clock divided by 7.
pub const NTSC_CLOCK_RATE: f64 = 53_693_175.0 / 7.0;
/// PAL Mega Drive master clock divided by 7.
pub const PAL_CLOCK_RATE: f64 = 53_203_424.0 / 7.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Chip input clock in Hz. All envelope and frequency timing derives from it.
    pub clock_rate: f64,
    pub channels: usize,
    /// Sample rate used when sampling the engine's curves offline.
    pub sample_rate: f32,
    /// Seconds added to "now" so that nothing is ever scheduled in the past.
    pub lookahead: f64,
    pub reference_pitch: f64,
    pub reference_note: u8,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            clock_rate: NTSC_CLOCK_RATE,
            channels: 6,
            sample_rate: 44100.0, // Standard audio sample rate
            lookahead: 0.02,
            reference_pitch: 440.0,
            reference_note: 69,
        }
    }
}
