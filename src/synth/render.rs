//! Offline renderer: samples the scheduled curves of every channel at a fixed sample rate.

use super::algorithm::OPERATOR_COUNT;
use super::core::Synth;
use super::envelope::{level_to_gain, DB_PER_LEVEL};
use super::lfo::{tremolo_attenuation, vibrato_factor};
use super::prelude::PI;

/// Phase deviation in radians per unit of modulator output.
const MODULATION_SCALE: f64 = 4.0 * PI;
/// Keeps four full-scale carriers on six channels from clipping.
const MIX_LEVEL: f64 = 0.25;

#[derive(Debug, Default, Clone, Copy)]
struct OperatorState {
    generation: Option<u64>,
    /// Position in the current cycle, 0..1.
    phase: f64,
    previous: [f64; 2],
}

#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    sample_rate: f64,
    frame: u64,
    start: f64,
    states: Vec<[OperatorState; OPERATOR_COUNT]>,
}

impl OfflineRenderer {
    pub fn new(sample_rate: f32, start: f64) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            frame: 0,
            start,
            states: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    /// Time of the next frame to be rendered.
    pub fn time(&self) -> f64 {
        self.start + self.frame as f64 / self.sample_rate
    }

    /// Renders interleaved stereo frames into `output`.
    pub fn render(&mut self, synth: &Synth, output: &mut [f32]) {
        let channels = synth.channels();
        if self.states.len() != channels.len() {
            self.states
                .resize(channels.len(), [OperatorState::default(); OPERATOR_COUNT]);
        }
        let bank = synth.waveforms();

        for frame in output.chunks_mut(2) {
            let time = self.time();
            let mut left = 0.0;
            let mut right = 0.0;

            for (channel, states) in channels.iter().zip(self.states.iter_mut()) {
                let routing = channel.routing();
                let lfo = channel.lfo().value_at(time);
                let mut outputs = [0.0; OPERATOR_COUNT];

                for (index, op) in channel.operators().iter().enumerate() {
                    let state = &mut states[index];
                    let Some(oscillator) = op.oscillator_at(time) else {
                        *state = OperatorState::default();
                        continue;
                    };
                    if state.generation != Some(oscillator.generation) {
                        *state = OperatorState {
                            generation: Some(oscillator.generation),
                            ..OperatorState::default()
                        };
                    }

                    let modulation = routing
                        .modulators(index)
                        .map(|(source, depth)| depth * outputs[source])
                        .sum::<f64>()
                        + routing.feedback(index) * (state.previous[0] + state.previous[1]) / 2.0;
                    let phase = 2.0 * PI * state.phase + MODULATION_SCALE * modulation;
                    let wave = bank.evaluate(oscillator.waveform, phase);

                    let tremolo = tremolo_attenuation(lfo, op.tremolo_depth()) / DB_PER_LEVEL;
                    let level = op.envelope.gain().value_at(time)
                        - op.envelope.attenuation()
                        - tremolo;
                    let sample = wave * level_to_gain(level) * op.output_level();

                    outputs[index] = sample;
                    state.previous = [sample, state.previous[0]];
                    let frequency =
                        op.frequency().value_at(time) * vibrato_factor(lfo, op.vibrato_depth());
                    state.phase = (state.phase + frequency / self.sample_rate).fract();
                }

                let mix: f64 = outputs
                    .iter()
                    .zip(routing.outputs.iter())
                    .map(|(sample, level)| sample * level)
                    .sum();
                let (left_gain, right_gain) = channel.stereo_gains();
                left += mix * left_gain;
                right += mix * right_gain;
            }

            frame[0] = (left * MIX_LEVEL) as f32;
            if let Some(sample) = frame.get_mut(1) {
                *sample = (right * MIX_LEVEL) as f32;
            }
            self.frame += 1;
        }
    }
}
