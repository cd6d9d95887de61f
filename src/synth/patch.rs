//! Serializable channel state, for saving instruments and restoring them later.

use serde::{Deserialize, Serialize};

use super::algorithm::{Routing, OPERATOR_COUNT};
use super::channel::Channel;
use super::error::Error;
use super::frequency::FrequencyComponents;
use super::lfo::Lfo;
use super::operator::Operator;
use super::waveform::Waveform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorPatch {
    pub total_level: u8,
    pub rate_scaling: i8,
    pub attack: u8,
    pub decay: u8,
    pub sustain_rate: u8,
    pub release: u8,
    pub sustain_level: u16,
    pub ssg_mode: Option<u8>,
    pub velocity_sensitivity: u8,
    pub reset: bool,
    pub multiple: f64,
    pub detune: u8,
    pub detune2: u8,
    /// Own pitch when the operator ignores the channel frequency.
    pub fixed: Option<FrequencyComponents>,
    pub glide_rate: f64,
    pub vibrato_depth: f64,
    pub tremolo_depth: f64,
    pub output_level: f64,
    pub waveform: Waveform,
    pub disabled: bool,
}

impl OperatorPatch {
    pub fn capture(op: &Operator) -> Self {
        let envelope = &op.envelope;
        Self {
            total_level: envelope.total_level(),
            rate_scaling: envelope.rate_scaling(),
            attack: envelope.attack(),
            decay: envelope.decay(),
            sustain_rate: envelope.sustain_rate(),
            release: envelope.release(),
            sustain_level: envelope.sustain_level(),
            ssg_mode: envelope.ssg_mode(),
            velocity_sensitivity: envelope.velocity_sensitivity(),
            reset: envelope.reset(),
            multiple: op.multiple(),
            detune: op.detune(),
            detune2: op.detune2(),
            fixed: op.is_fixed().then(|| op.fixed_components()),
            glide_rate: op.glide_rate(),
            vibrato_depth: op.vibrato_depth(),
            tremolo_depth: op.tremolo_depth(),
            output_level: op.output_level(),
            waveform: op.waveform(),
            disabled: op.is_disabled(),
        }
    }

    pub fn apply(&self, op: &mut Operator, time: f64) {
        let envelope = &mut op.envelope;
        envelope.set_total_level(self.total_level);
        envelope.set_rate_scaling(self.rate_scaling);
        envelope.set_attack(self.attack);
        envelope.set_decay(self.decay);
        envelope.set_sustain_rate(self.sustain_rate);
        envelope.set_release(self.release);
        envelope.set_sustain_level(self.sustain_level);
        envelope.set_ssg_mode(self.ssg_mode);
        envelope.set_velocity_sensitivity(self.velocity_sensitivity);
        envelope.set_reset(self.reset);

        match self.fixed {
            Some(components) => {
                op.set_fixed_frequency(components.block, components.freq_num, time, false);
                op.fix_frequency(true, false, time);
            }
            None => op.fix_frequency(false, false, time),
        }
        op.set_multiple(self.multiple, time);
        op.set_detune(self.detune, time);
        op.set_detune2(self.detune2, time);
        op.set_glide_rate(self.glide_rate);
        op.set_vibrato_depth(self.vibrato_depth);
        op.set_tremolo_depth(self.tremolo_depth);
        op.set_output_level(self.output_level);
        op.set_waveform(self.waveform, time);
        op.set_disabled(self.disabled, time);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPatch {
    /// The fixed algorithm the routing matched when captured. Informational; the raw routing
    /// is what gets applied.
    pub algorithm: Option<usize>,
    pub routing: Routing,
    pub operators: [OperatorPatch; OPERATOR_COUNT],
    pub lfo: Lfo,
    pub pan: f64,
    pub volume: f64,
    pub operator_delay: [f64; OPERATOR_COUNT],
}

impl ChannelPatch {
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Channel {
    pub fn patch(&self) -> ChannelPatch {
        let ops = self.operators();
        ChannelPatch {
            algorithm: self.get_algorithm(),
            routing: *self.routing(),
            operators: std::array::from_fn(|index| OperatorPatch::capture(&ops[index])),
            lfo: *self.lfo(),
            pan: self.pan(),
            volume: self.volume(),
            operator_delay: self.operator_delays(),
        }
    }

    pub fn apply_patch(&mut self, patch: &ChannelPatch, time: f64) -> Result<(), Error> {
        self.set_routing(patch.routing);
        for (index, operator) in patch.operators.iter().enumerate() {
            operator.apply(self.operator_mut(index)?, time);
            self.set_operator_delay(index, patch.operator_delay[index])?;
        }
        *self.lfo_mut() = patch.lfo;
        self.set_pan(patch.pan);
        self.set_volume(patch.volume);
        log::debug!("Applied patch (algorithm {:?})", patch.algorithm);
        Ok(())
    }
}
