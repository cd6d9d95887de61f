//! Four operators wired through a modulation matrix.
//!
//! Operators feed each other, so a channel cannot stop an operator's oscillator just because
//! that operator's own envelope went silent: a lower operator may still be modulating a higher
//! one. [`Channel::schedule_oscillators`] works out the earliest safe stop time per operator.

use std::sync::Arc;

use super::algorithm::{feedback_depth, Routing, EDGES, FEEDBACK_OPERATORS, OPERATOR_COUNT};
use super::context::SynthContext;
use super::error::Error;
use super::frequency::FrequencyComponents;
use super::lfo::{Lfo, TREMOLO_PRESETS, VIBRATO_PRESETS};
use super::operator::Operator;
use super::prelude::{clamped, PI};
use super::tuning::Tuning;

#[derive(Debug, Clone)]
pub struct Channel {
    context: SynthContext,
    tuning: Arc<Tuning>,
    operators: [Operator; OPERATOR_COUNT],
    routing: Routing,
    lfo: Lfo,
    pan: f64,
    volume: f64,
    /// Key-on stagger per operator, in seconds.
    operator_delay: [f64; OPERATOR_COUNT],
    components: FrequencyComponents,
    note: Option<u8>,
    velocity: u8,
    /// Latest time an operator of the current note must stay audible.
    stop_time: f64,
    old_stop_time: f64,
}

impl Channel {
    pub fn new(context: SynthContext, tuning: Arc<Tuning>) -> Self {
        Self {
            context,
            tuning,
            operators: std::array::from_fn(|_| Operator::new(context)),
            routing: Routing::default(),
            lfo: Lfo::new(&context),
            pan: 0.0,
            volume: 1.0,
            operator_delay: [0.0; OPERATOR_COUNT],
            components: FrequencyComponents::default(),
            note: None,
            velocity: 0,
            stop_time: 0.0,
            old_stop_time: 0.0,
        }
    }

    pub fn context(&self) -> &SynthContext {
        &self.context
    }

    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    pub fn operator(&self, index: usize) -> Result<&Operator, Error> {
        self.operators
            .get(index)
            .ok_or(Error::OperatorOutOfRange(index))
    }

    pub fn operator_mut(&mut self, index: usize) -> Result<&mut Operator, Error> {
        self.operators
            .get_mut(index)
            .ok_or(Error::OperatorOutOfRange(index))
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn set_routing(&mut self, routing: Routing) {
        self.routing = routing;
    }

    pub fn use_algorithm(&mut self, algorithm: usize) -> Result<(), Error> {
        if self.routing.use_algorithm(algorithm) {
            log::debug!("Channel using algorithm {algorithm}");
            Ok(())
        } else {
            Err(Error::UnknownAlgorithm(algorithm))
        }
    }

    /// The fixed algorithm the current routing matches exactly, if any.
    pub fn get_algorithm(&self) -> Option<usize> {
        self.routing.algorithm()
    }

    /// Depth with which operator `from` modulates operator `to` (0-based). Modulation has to
    /// flow to a higher operator.
    pub fn set_modulation_depth(&mut self, from: usize, to: usize, depth: f64) -> Result<(), Error> {
        self.routing.set_depth(from, to, depth)
    }

    pub fn modulation_depth(&self, from: usize, to: usize) -> f64 {
        self.routing.depth(from, to)
    }

    /// Hardware feedback setting 0..7 for operator 1.
    pub fn set_feedback(&mut self, amount: u8) {
        let amount = clamped("feedback", amount, 0, 7);
        self.routing.feedback[0] = feedback_depth(amount);
    }

    /// Free feedback depth for operator 1 or 3.
    pub fn set_feedback_depth(&mut self, operator: usize, depth: f64) -> Result<(), Error> {
        let tap = FEEDBACK_OPERATORS
            .iter()
            .position(|&op| op == operator)
            .ok_or(Error::InvalidRouting {
                from: operator,
                to: operator,
            })?;
        self.routing.feedback[tap] = depth;
        Ok(())
    }

    pub fn feedback_depth(&self, operator: usize) -> f64 {
        self.routing.feedback(operator)
    }

    /// How much of an operator's output reaches the channel output.
    pub fn set_operator_output(&mut self, operator: usize, level: f64) -> Result<(), Error> {
        let output = self
            .routing
            .outputs
            .get_mut(operator)
            .ok_or(Error::OperatorOutOfRange(operator))?;
        *output = clamped("carrier level", level, 0.0, 1.0);
        Ok(())
    }

    /// Pan from -1 (left) to 1 (right).
    pub fn set_pan(&mut self, pan: f64) {
        self.pan = clamped("pan", pan, -1.0, 1.0);
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = clamped("channel volume", volume, 0.0, 1.0);
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Equal-power left and right gains, including the channel volume.
    pub fn stereo_gains(&self) -> (f64, f64) {
        let angle = (self.pan + 1.0) * PI / 4.0;
        (angle.cos() * self.volume, angle.sin() * self.volume)
    }

    pub fn set_operator_delay(&mut self, operator: usize, seconds: f64) -> Result<(), Error> {
        let delay = self
            .operator_delay
            .get_mut(operator)
            .ok_or(Error::OperatorOutOfRange(operator))?;
        *delay = seconds.max(0.0);
        Ok(())
    }

    pub fn operator_delays(&self) -> [f64; OPERATOR_COUNT] {
        self.operator_delay
    }

    pub fn lfo(&self) -> &Lfo {
        &self.lfo
    }

    pub fn lfo_mut(&mut self) -> &mut Lfo {
        &mut self.lfo
    }

    /// Selects one of the hardware LFO rates 0..7.
    pub fn set_lfo_rate(&mut self, rate: u8) {
        let context = self.context;
        self.lfo.set_rate(&context, rate);
    }

    /// Vibrato depth on every operator from the hardware PMS setting 0..7.
    pub fn use_vibrato_preset(&mut self, preset: u8) {
        let cents = VIBRATO_PRESETS[clamped("vibrato preset", preset, 0, 7) as usize];
        for op in self.operators.iter_mut() {
            op.set_vibrato_depth(cents);
        }
    }

    /// Tremolo depth on every operator from the hardware AMS setting 0..3.
    pub fn use_tremolo_preset(&mut self, preset: u8) {
        let decibels = TREMOLO_PRESETS[clamped("tremolo preset", preset, 0, 3) as usize];
        for op in self.operators.iter_mut() {
            op.set_tremolo_depth(decibels);
        }
    }

    pub fn set_tuning(&mut self, tuning: Arc<Tuning>) {
        self.tuning = tuning;
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn components(&self) -> FrequencyComponents {
        self.components
    }

    /// Tunes the channel to a MIDI note through the shared tuning table.
    pub fn set_midi_note(&mut self, note: u8, time: f64, glide: bool) {
        let note = clamped("MIDI note", note, 0, 127);
        let components = self.tuning.components(note);
        self.note = Some(note);
        self.set_frequency(components.block, components.freq_num, time, glide);
    }

    pub fn set_frequency(&mut self, block: u8, freq_num: u16, time: f64, glide: bool) {
        self.components = FrequencyComponents::new(block, freq_num);
        for op in self.operators.iter_mut() {
            op.set_frequency(self.components.block, self.components.freq_num, time, glide);
        }
    }

    pub fn fix_frequency(
        &mut self,
        operator: usize,
        fixed: bool,
        preserve: bool,
        time: f64,
    ) -> Result<(), Error> {
        self.operator_mut(operator)?.fix_frequency(fixed, preserve, time);
        Ok(())
    }

    /// Opens (`true`) or closes (`false`) each operator's gate. Every operator is triggered
    /// after its own delay.
    pub fn key_on_off(&mut self, velocity: u8, time: f64, gates: [bool; OPERATOR_COUNT]) {
        if gates.iter().any(|&gate| gate) {
            if time < self.stop_time {
                log::debug!(
                    "Key-on at {time:.4}s reuses oscillators running until {:.4}s",
                    self.stop_time
                );
            }
            self.velocity = velocity;
            self.lfo.key_on(time);
        }
        for (index, op) in self.operators.iter_mut().enumerate() {
            let at = time + self.operator_delay[index];
            if gates[index] {
                op.key_on(velocity, at);
            } else if op.key_is_on() {
                op.key_off(at);
            }
        }
        self.schedule_oscillators(time);
    }

    pub fn key_on(&mut self, velocity: u8, time: f64) {
        self.key_on_off(velocity, time, [true; OPERATOR_COUNT]);
    }

    pub fn key_off(&mut self, time: f64) {
        self.key_on_off(self.velocity, time, [false; OPERATOR_COUNT]);
    }

    /// Cuts every operator immediately, without release.
    pub fn sound_off(&mut self, time: f64) {
        for op in self.operators.iter_mut() {
            op.sound_off(time);
        }
        self.schedule_oscillators(time);
    }

    /// Plans when each operator's oscillator may stop.
    ///
    /// Operators up to the highest one whose gate is open stay running, since any of them may
    /// be feeding it. Above that, an operator stops once it is silent and every operator it
    /// modulates has stopped too. Working from operator 4 downwards means the stop times of
    /// all modulation targets are known when an operator is reached.
    pub fn schedule_oscillators(&mut self, time: f64) {
        debug_assert!(
            EDGES.iter().all(|&(from, to)| from < to),
            "modulation must flow from lower to higher operators"
        );
        let highest_gated = (0..OPERATOR_COUNT)
            .rev()
            .find(|&index| self.operators[index].key_is_on());
        let first_free = highest_gated.map_or(0, |index| index + 1);

        for op in self.operators[..first_free].iter_mut() {
            op.keep_running(time);
        }

        let mut stops = [f64::NEG_INFINITY; OPERATOR_COUNT];
        for index in (first_free..OPERATOR_COUNT).rev() {
            let op = &self.operators[index];
            let own = match op.oscillator() {
                Some(_) => op.sound_off_time().unwrap_or(f64::INFINITY),
                None => f64::NEG_INFINITY,
            };
            stops[index] = self
                .routing
                .targets(index)
                .fold(own, |stop, target| stop.max(stops[target]));
        }

        self.old_stop_time = self.stop_time;
        self.stop_time = if highest_gated.is_some() {
            f64::INFINITY
        } else {
            stops.iter().copied().fold(time, f64::max)
        };
        for index in first_free..OPERATOR_COUNT {
            if stops[index].is_finite() {
                self.operators[index].schedule_stop(stops[index]);
            }
        }
        log::debug!(
            "Oscillator stops at {time:.4}s: {:?} (channel audible until {:.4}s)",
            &stops[first_free..],
            self.stop_time
        );
    }

    /// Latest time any operator must remain audible; infinite while a gate is open.
    pub fn stop_time(&self) -> f64 {
        self.stop_time
    }

    /// Stop time before the most recent scheduling pass.
    pub fn old_stop_time(&self) -> f64 {
        self.old_stop_time
    }

    /// Forgets automation history that ended before `time`.
    pub fn prune_before(&mut self, time: f64) {
        for op in self.operators.iter_mut() {
            op.prune_before(time);
        }
    }
}
