use super::config::SynthConfig;

/// LFO clock dividers for rate settings 0..7.
const LFO_DIVIDERS: [f64; 8] = [108.0, 77.0, 71.0, 67.0, 62.0, 44.0, 8.0, 5.0];

/// Clock-derived timing constants shared by every channel, operator and envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthContext {
    pub clock_rate: f64,
    /// Duration of one envelope generator step, in seconds.
    pub envelope_tick: f64,
    /// Hertz per unit of "full" frequency number.
    pub frequency_step: f64,
    pub lfo_frequencies: [f64; 8],
}

impl SynthContext {
    pub fn new(clock_rate: f64) -> Self {
        let sample_clock = clock_rate / 144.0;
        let mut lfo_frequencies = [0.0; 8];
        for (frequency, divider) in lfo_frequencies.iter_mut().zip(LFO_DIVIDERS) {
            *frequency = sample_clock / (128.0 * divider);
        }
        Self {
            clock_rate,
            envelope_tick: 3.0 / sample_clock,
            frequency_step: sample_clock / 1_048_576.0,
            lfo_frequencies,
        }
    }

    pub fn from_config(config: &SynthConfig) -> Self {
        Self::new(config.clock_rate)
    }
}

impl Default for SynthContext {
    fn default() -> Self {
        Self::from_config(&SynthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_constants() {
        let context = SynthContext::default();
        assert!((context.envelope_tick - 5.632e-5).abs() < 1e-7);
        assert!((context.frequency_step - 0.0508).abs() < 1e-4);
        assert!((context.lfo_frequencies[7] - 83.2).abs() < 0.5);
        assert!(context.lfo_frequencies.windows(2).all(|w| w[0] < w[1]));
    }
}
