//! Per-operator envelope generator.
//!
//! Nothing here runs per sample. On key-on and key-off the envelope works out, in closed form,
//! when each phase begins and ends and what curve joins those points, and schedules the result
//! on its gain [`Timeline`]. [`EnvelopeGenerator::linear_value_at_time`] evaluates the very
//! same formulas for an arbitrary time, which is how a release picks up the level the curve
//! holds at the moment of key-off.
//!
//! Levels run from 0 (silence) to 1023 (full output); one level step is 0.09375 dB.

use std::sync::Arc;

use super::automation::{AutomationParam, Timeline};
use super::prelude::{clamped, HashMap, OnceLock};

pub const MAX_LEVEL: f64 = 1023.0;
pub const DB_PER_LEVEL: f64 = 0.09375;
/// Envelope levels per step of total level (0.75 dB).
const LEVELS_PER_TOTAL_LEVEL: f64 = 8.0;
/// SSG-EG modes run their decay phases four times faster.
const SSG_RATE_MULTIPLIER: f64 = 4.0;
const LOOP_BUFFER_LENGTH: usize = 256;
const FIRST_ATTACK_RATE: usize = 2;
const INSTANT_ATTACK_RATE: usize = 62;

struct EnvelopeTables {
    increment: [f64; 64],
    attack_target: [f64; 60],
    /// In envelope ticks.
    attack_constant: [f64; 60],
}

impl EnvelopeTables {
    fn new() -> Self {
        let mut increment = [0.0; 64];
        for (rate, value) in increment.iter_mut().enumerate() {
            *value = match rate {
                0 | 1 => 0.0,
                60.. => 8.0,
                _ => (4 + (rate & 3)) as f64 * 2f64.powi((rate >> 2) as i32 - 14),
            };
        }
        let mut attack_target = [0.0; 60];
        let mut attack_constant = [0.0; 60];
        for rate in FIRST_ATTACK_RATE..INSTANT_ATTACK_RATE {
            let (target, constant) = fit_attack(increment[rate]);
            attack_target[rate - FIRST_ATTACK_RATE] = target;
            attack_constant[rate - FIRST_ATTACK_RATE] = constant;
        }
        Self {
            increment,
            attack_target,
            attack_constant,
        }
    }
}

fn tables() -> &'static EnvelopeTables {
    static TABLES: OnceLock<EnvelopeTables> = OnceLock::new();
    TABLES.get_or_init(EnvelopeTables::new)
}

/// Runs the hardware attack recursion from silence to full level and fits an exponential
/// approach `target * (1 - exp(-n / constant))` through its half-way and final points.
/// Returns the target level and the time constant in ticks.
fn fit_attack(increment: f64) -> (f64, f64) {
    let ticks_per_update = if increment < 1.0 { 1.0 / increment } else { 1.0 };
    let mut attenuation: i64 = 1023;
    let mut updates = 0u64;
    let mut half_way = None;
    while attenuation > 0 {
        let step = if increment < 1.0 {
            1
        } else {
            let k = updates as f64;
            ((k + 1.0) * increment).floor() as i64 - (k * increment).floor() as i64
        };
        attenuation -= ((attenuation + 1) * step + 15) / 16;
        updates += 1;
        if half_way.is_none() && attenuation <= 511 {
            half_way = Some((updates as f64, (1023 - attenuation) as f64));
        }
    }
    let end = updates as f64;
    let (mid, mid_level) = half_way.unwrap_or((end, MAX_LEVEL));
    let ratio = end / mid;
    let shape = |target: f64| (1.0 - MAX_LEVEL / target).ln() / (1.0 - mid_level / target).ln();

    let mut low = MAX_LEVEL + 1e-9;
    let mut high = 1.0e7;
    let target = if shape(high) >= ratio {
        high
    } else {
        for _ in 0..200 {
            let middle = 0.5 * (low + high);
            if shape(middle) > ratio {
                low = middle;
            } else {
                high = middle;
            }
        }
        0.5 * (low + high)
    };
    let constant = -mid / (1.0 - mid_level / target).ln();
    (target, constant * ticks_per_update)
}

/// Level change per envelope tick for a combined rate 0..63.
pub fn rate_increment(rate: usize) -> f64 {
    tables().increment[rate.min(63)]
}

/// Linear amplitude for an envelope level after attenuation has been subtracted.
pub fn level_to_gain(level: f64) -> f64 {
    if level <= 0.0 {
        0.0
    } else {
        10f64.powf(-(MAX_LEVEL - level.min(MAX_LEVEL)) * DB_PER_LEVEL / 20.0)
    }
}

fn lerp(from: f64, to: f64, progress: f64) -> f64 {
    from + (to - from) * progress.clamp(0.0, 1.0)
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Dampen,
    Attack,
    Decay,
    Sustain,
    Looping,
    Release,
    Finished,
}

/// Result of a key-on: when the new attack begins (after any dampening) and, if the
/// envelope will fall silent by itself, from when on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub begin_attack: f64,
    pub silent_from: Option<f64>,
}

/// One cycle of a looping SSG envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LoopShape {
    decay_time: f64,
    sustain_time: f64,
    sustain_point: f64,
    alternating: bool,
}

impl LoopShape {
    fn cycle(&self) -> f64 {
        self.decay_time + self.sustain_time
    }

    fn period(&self) -> f64 {
        if self.alternating {
            2.0 * self.cycle()
        } else {
            self.cycle()
        }
    }

    fn value_at(&self, elapsed: f64) -> f64 {
        let cycle = self.cycle();
        let mut phase = elapsed.rem_euclid(self.period());
        if phase >= cycle {
            phase = 2.0 * cycle - phase;
        }
        if phase < self.decay_time {
            lerp(MAX_LEVEL, self.sustain_point, phase / self.decay_time)
        } else if self.sustain_time > 0.0 {
            lerp(self.sustain_point, 0.0, (phase - self.decay_time) / self.sustain_time)
        } else {
            self.sustain_point
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LoopKey {
    decay_time: u64,
    sustain_time: u64,
    sustain_point: u16,
    alternating: bool,
    inverted: bool,
}

/// Closed form of one triggered note, from key-on (including any dampen) to the end of its
/// release. Every phase boundary is fixed when the curve is created or released.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Curve {
    inverted: bool,
    jump: bool,
    tick: f64,
    dampen_start: f64,
    dampen_level: f64,
    begin_level: f64,
    internal_begin: f64,
    begin_attack: f64,
    attack_rate_index: usize,
    attack_target: f64,
    attack_constant: f64,
    end_attack: f64,
    sustain_point: f64,
    end_decay: f64,
    end_sustain: f64,
    loop_shape: Option<LoopShape>,
    begin_release: Option<f64>,
    release_level: f64,
    end_release: f64,
}

impl Curve {
    fn output(&self, internal: f64) -> f64 {
        if self.inverted {
            MAX_LEVEL - internal
        } else {
            internal
        }
    }

    fn value_at(&self, time: f64) -> f64 {
        if let Some(begin_release) = self.begin_release {
            if time >= begin_release {
                return if time >= self.end_release {
                    0.0
                } else {
                    lerp(
                        self.release_level,
                        0.0,
                        (time - begin_release) / (self.end_release - begin_release),
                    )
                };
            }
        }
        if time < self.begin_attack {
            return if time >= self.dampen_start {
                lerp(
                    self.dampen_level,
                    0.0,
                    (time - self.dampen_start) / (self.begin_attack - self.dampen_start),
                )
            } else {
                self.dampen_level
            };
        }
        if self.jump && self.end_sustain.is_finite() && time >= self.end_sustain + self.tick {
            return MAX_LEVEL - self.output(0.0);
        }
        self.output(self.internal_value_at(time))
    }

    fn internal_value_at(&self, time: f64) -> f64 {
        if time < self.end_attack {
            if self.attack_rate_index < FIRST_ATTACK_RATE {
                return self.internal_begin;
            }
            let elapsed = time - self.begin_attack;
            let value = self.attack_target
                + (self.internal_begin - self.attack_target)
                    * (-elapsed / self.attack_constant).exp();
            return value.min(MAX_LEVEL);
        }
        if let Some(shape) = &self.loop_shape {
            return shape.value_at(time - self.end_attack);
        }
        if time < self.end_decay {
            if !self.end_decay.is_finite() {
                return MAX_LEVEL;
            }
            return lerp(
                MAX_LEVEL,
                self.sustain_point,
                (time - self.end_attack) / (self.end_decay - self.end_attack),
            );
        }
        if time < self.end_sustain {
            if !self.end_sustain.is_finite() {
                return self.sustain_point;
            }
            return lerp(
                self.sustain_point,
                0.0,
                (time - self.end_decay) / (self.end_sustain - self.end_decay),
            );
        }
        0.0
    }

    fn stage_at(&self, time: f64) -> EnvelopeStage {
        if let Some(begin_release) = self.begin_release {
            if time >= begin_release {
                return if time >= self.end_release {
                    EnvelopeStage::Finished
                } else {
                    EnvelopeStage::Release
                };
            }
        }
        if time < self.begin_attack {
            EnvelopeStage::Dampen
        } else if time < self.end_attack {
            EnvelopeStage::Attack
        } else if self.loop_shape.is_some() {
            EnvelopeStage::Looping
        } else if time < self.end_decay {
            EnvelopeStage::Decay
        } else if time < self.end_sustain {
            EnvelopeStage::Sustain
        } else {
            EnvelopeStage::Finished
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvelopeGenerator {
    total_level: u8,
    rate_scaling: i8,
    attack_rate: u8,
    decay_rate: u8,
    sustain_rate: u8,
    release_rate: u8,
    /// Attenuation reached at the end of the decay phase.
    sustain_level: u16,
    ssg_mode: Option<u8>,
    inverted: bool,
    jump: bool,
    looping: bool,
    alternating: bool,
    velocity_sensitivity: u8,
    reset: bool,

    velocity_attenuation: f64,
    /// Triggered notes, oldest first. The last one is sounding; earlier ones are kept until
    /// pruned so that past times still evaluate against the note that was playing then.
    curves: Vec<Curve>,

    gain: Timeline,
    loop_cache: HashMap<LoopKey, Arc<[f32]>>,
}

impl EnvelopeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(&self) -> &Timeline {
        &self.gain
    }

    pub fn set_total_level(&mut self, level: u8) {
        self.total_level = clamped("total level", level, 0, 127);
    }

    pub fn total_level(&self) -> u8 {
        self.total_level
    }

    /// Key scaling from -3 to 3. Negative values make low notes faster instead of high ones.
    pub fn set_rate_scaling(&mut self, scaling: i8) {
        self.rate_scaling = clamped("rate scaling", scaling, -3, 3);
    }

    pub fn rate_scaling(&self) -> i8 {
        self.rate_scaling
    }

    pub fn set_attack(&mut self, rate: u8) {
        self.attack_rate = clamped("attack rate", rate, 0, 31);
    }

    pub fn attack(&self) -> u8 {
        self.attack_rate
    }

    pub fn set_decay(&mut self, rate: u8) {
        self.decay_rate = clamped("decay rate", rate, 0, 31);
    }

    pub fn decay(&self) -> u8 {
        self.decay_rate
    }

    pub fn set_sustain_rate(&mut self, rate: u8) {
        self.sustain_rate = clamped("sustain rate", rate, 0, 31);
    }

    pub fn sustain_rate(&self) -> u8 {
        self.sustain_rate
    }

    pub fn set_release(&mut self, rate: u8) {
        self.release_rate = clamped("release rate", rate, 0, 15);
    }

    pub fn release(&self) -> u8 {
        self.release_rate
    }

    /// Sustain level as an attenuation from 0 (no decay) to 1023 (decay to silence).
    pub fn set_sustain_level(&mut self, attenuation: u16) {
        self.sustain_level = clamped("sustain level", attenuation, 0, 1023);
    }

    /// Sustain level in register units 0..15, where 15 means silence.
    pub fn set_sustain_level_register(&mut self, value: u8) {
        let value = clamped("sustain level register", value, 0, 15);
        self.sustain_level = if value == 15 { 1023 } else { value as u16 * 32 };
    }

    pub fn sustain_level(&self) -> u16 {
        self.sustain_level
    }

    pub fn set_velocity_sensitivity(&mut self, sensitivity: u8) {
        self.velocity_sensitivity = clamped("velocity sensitivity", sensitivity, 0, 127);
    }

    pub fn velocity_sensitivity(&self) -> u8 {
        self.velocity_sensitivity
    }

    /// When set, retriggering a still sounding envelope first ramps it down to silence.
    pub fn set_reset(&mut self, reset: bool) {
        self.reset = reset;
    }

    pub fn reset(&self) -> bool {
        self.reset
    }

    /// SSG-EG register value 8..15, or `None` to disable. Values below 8 disable it too.
    pub fn set_ssg_mode(&mut self, mode: Option<u8>) {
        self.ssg_mode = mode.filter(|&mode| mode >= 8).map(|mode| mode & 15);
        let bits = self.ssg_mode.unwrap_or(0);
        let enabled = self.ssg_mode.is_some();
        let hold = bits & 1 != 0;
        let alternate = bits & 2 != 0;
        self.inverted = enabled && bits & 4 != 0;
        self.jump = enabled && alternate && hold;
        self.looping = enabled && !hold;
        self.alternating = enabled && alternate && !hold;
    }

    pub fn ssg_mode(&self) -> Option<u8> {
        self.ssg_mode
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn jump(&self) -> bool {
        self.jump
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Attenuation from total level and velocity, in envelope levels.
    pub fn attenuation(&self) -> f64 {
        (self.total_level as f64 + self.velocity_attenuation) * LEVELS_PER_TOTAL_LEVEL
    }

    /// Linear amplitude at `time`, including total level and velocity.
    pub fn gain_at(&self, time: f64) -> f64 {
        level_to_gain(self.linear_value_at_time(time) - self.attenuation())
    }

    /// Key scaling adjustment added to every combined rate.
    pub fn rate_adjust(&self, key_code: u8) -> usize {
        let key_code = key_code.min(31) as usize;
        if self.rate_scaling >= 0 {
            key_code >> (3 - self.rate_scaling) as usize
        } else {
            (31 - key_code) >> (3 + self.rate_scaling) as usize
        }
    }

    fn combined_rate(rate: u8, adjust: usize) -> usize {
        if rate == 0 {
            0
        } else {
            (2 * rate as usize + adjust).min(63)
        }
    }

    fn decay_increment(&self, rate: u8, adjust: usize) -> f64 {
        let increment = rate_increment(Self::combined_rate(rate, adjust));
        if self.ssg_mode.is_some() {
            increment * SSG_RATE_MULTIPLIER
        } else {
            increment
        }
    }

    fn output(&self, internal: f64) -> f64 {
        if self.inverted {
            MAX_LEVEL - internal
        } else {
            internal
        }
    }

    /// Starts a new note. `tick` is the duration of one envelope step in seconds.
    pub fn key_on(&mut self, velocity: u8, key_code: u8, time: f64, tick: f64) -> Trigger {
        let current = self.linear_value_at_time(time);
        self.velocity_attenuation = (self.velocity_sensitivity as f64
            * (127 - velocity.min(127)) as f64
            / 127.0)
            .round();
        let adjust = self.rate_adjust(key_code);
        self.gain.cancel_and_hold_at(time);

        let mut curve = Curve {
            inverted: self.inverted,
            jump: self.jump,
            tick,
            dampen_start: time,
            dampen_level: current,
            begin_level: 0.0,
            internal_begin: 0.0,
            begin_attack: time,
            attack_rate_index: 0,
            attack_target: MAX_LEVEL,
            attack_constant: 0.0,
            end_attack: f64::INFINITY,
            sustain_point: MAX_LEVEL,
            end_decay: f64::INFINITY,
            end_sustain: f64::INFINITY,
            loop_shape: None,
            begin_release: None,
            release_level: 0.0,
            end_release: 0.0,
        };
        let silent_from = self.schedule(&mut curve, current, adjust);
        self.curves.push(curve);
        Trigger {
            begin_attack: curve.begin_attack,
            silent_from,
        }
    }

    /// Fills in the phase boundaries of a new curve and schedules them on the gain lane.
    /// Returns the time the curve falls silent by itself, if it does.
    fn schedule(&mut self, curve: &mut Curve, current: f64, adjust: usize) -> Option<f64> {
        let time = curve.dampen_start;
        let tick = curve.tick;

        if self.reset && current > 0.0 {
            curve.begin_attack = time + ramp_duration(tick, current, rate_increment(63));
            self.gain.linear_ramp_to(0.0, curve.begin_attack);
            curve.begin_level = if self.inverted { MAX_LEVEL } else { 0.0 };
        } else {
            curve.begin_level = if self.inverted { MAX_LEVEL } else { current };
        }
        curve.internal_begin = curve.output(curve.begin_level);
        self.gain.set_value_at(curve.begin_level, curve.begin_attack);

        // Attack
        curve.attack_rate_index = Self::combined_rate(self.attack_rate, adjust);
        if curve.attack_rate_index < FIRST_ATTACK_RATE {
            log::debug!(
                "Attack rate 0: envelope frozen at level {}",
                curve.begin_level
            );
            return (curve.begin_level <= 0.0).then_some(curve.begin_attack);
        }
        if curve.attack_rate_index >= INSTANT_ATTACK_RATE || curve.internal_begin >= MAX_LEVEL {
            curve.end_attack = curve.begin_attack;
        } else {
            let tables = tables();
            let index = curve.attack_rate_index - FIRST_ATTACK_RATE;
            curve.attack_target = tables.attack_target[index];
            curve.attack_constant = tables.attack_constant[index] * tick;
            curve.end_attack = curve.begin_attack
                + curve.attack_constant
                    * ((curve.attack_target - curve.internal_begin)
                        / (curve.attack_target - MAX_LEVEL))
                        .ln();
            self.gain.exponential_approach(
                curve.output(curve.attack_target),
                curve.begin_attack,
                curve.attack_constant,
            );
        }
        self.gain.set_value_at(curve.output(MAX_LEVEL), curve.end_attack);

        let decay_increment = self.decay_increment(self.decay_rate, adjust);
        let sustain_increment = self.decay_increment(self.sustain_rate, adjust);
        curve.sustain_point = MAX_LEVEL - self.sustain_level as f64;
        let decay_time = ramp_duration(tick, MAX_LEVEL - curve.sustain_point, decay_increment);
        let sustain_time = ramp_duration(tick, curve.sustain_point, sustain_increment);

        // Looping SSG-EG
        if self.looping {
            let shape = LoopShape {
                decay_time,
                sustain_time,
                sustain_point: curve.sustain_point,
                alternating: self.alternating,
            };
            if shape.period().is_finite() && shape.period() > 0.0 {
                let buffer = self.loop_buffer(&shape);
                self.gain.play_loop(buffer, curve.end_attack, shape.period());
                curve.loop_shape = Some(shape);
                return None;
            }
            log::debug!("SSG loop has no finite period, playing it as a one-shot envelope");
        }

        // Decay
        curve.end_decay = curve.end_attack + decay_time;
        if !curve.end_decay.is_finite() {
            return None;
        }
        if curve.end_decay > curve.end_attack {
            self.gain
                .linear_ramp_to(curve.output(curve.sustain_point), curve.end_decay);
        }

        // Sustain
        curve.end_sustain = curve.end_decay + sustain_time;
        if !curve.end_sustain.is_finite() {
            return None;
        }
        if curve.end_sustain > curve.end_decay {
            self.gain.linear_ramp_to(curve.output(0.0), curve.end_sustain);
        }
        let mut final_level = curve.output(0.0);
        let mut silent_from = curve.end_sustain;
        if curve.jump {
            final_level = MAX_LEVEL - final_level;
            silent_from += tick;
            self.gain.set_value_at(final_level, silent_from);
        }
        (final_level <= 0.0).then_some(silent_from)
    }

    /// Renders one loop cycle through an offline automation lane. Buffers are cached per shape
    /// since the shape only depends on the envelope parameters.
    fn loop_buffer(&mut self, shape: &LoopShape) -> Arc<[f32]> {
        let key = LoopKey {
            decay_time: shape.decay_time.to_bits(),
            sustain_time: shape.sustain_time.to_bits(),
            sustain_point: shape.sustain_point as u16,
            alternating: shape.alternating,
            inverted: self.inverted,
        };
        if let Some(buffer) = self.loop_cache.get(&key) {
            return buffer.clone();
        }

        let mut lane = Timeline::new(self.output(MAX_LEVEL));
        let cycle = shape.cycle();
        lane.set_value_at(self.output(MAX_LEVEL), 0.0);
        lane.linear_ramp_to(self.output(shape.sustain_point), shape.decay_time);
        lane.linear_ramp_to(self.output(0.0), cycle);
        if shape.alternating {
            lane.linear_ramp_to(self.output(shape.sustain_point), cycle + shape.sustain_time);
            lane.linear_ramp_to(self.output(MAX_LEVEL), 2.0 * cycle);
        }
        let sample_rate = LOOP_BUFFER_LENGTH as f64 / shape.period();
        let buffer: Arc<[f32]> = Arc::from(lane.render(sample_rate, 0.0, LOOP_BUFFER_LENGTH));
        log::debug!(
            "Rendered SSG loop buffer: period {:.6}s, sustain point {}",
            shape.period(),
            shape.sustain_point
        );
        self.loop_cache.insert(key, buffer.clone());
        buffer
    }

    /// Starts the release phase from whatever level the envelope holds at `time`. Returns the
    /// time at which the release reaches silence.
    pub fn key_off(&mut self, key_code: u8, time: f64) -> Option<f64> {
        let mut curve = *self.curves.last()?;
        let time = time.max(curve.begin_attack);
        if let Some(begin_release) = curve.begin_release {
            if begin_release <= time {
                return Some(curve.end_release);
            }
        }
        let current = curve.value_at(time);
        self.gain.cancel_and_hold_at(time);
        self.gain.set_value_at(current, time);

        let rate = (4 * self.release_rate as usize + 2 + self.rate_adjust(key_code)).min(63);
        curve.begin_release = Some(time);
        curve.release_level = current;
        curve.end_release = time + ramp_duration(curve.tick, current, rate_increment(rate));
        if curve.end_release > time {
            self.gain.linear_ramp_to(0.0, curve.end_release);
        }
        self.replace_current(curve);
        Some(curve.end_release)
    }

    /// Silences the envelope at `time`, bypassing the release phase. A dampen in progress is
    /// cut as well.
    pub fn sound_off(&mut self, time: f64) -> f64 {
        self.gain.cancel_and_hold_at(time);
        self.gain.set_value_at(0.0, time);
        if let Some(mut curve) = self.curves.last().copied() {
            curve.begin_release = Some(time);
            curve.release_level = 0.0;
            curve.end_release = time;
            self.replace_current(curve);
        }
        time
    }

    fn replace_current(&mut self, curve: Curve) {
        if let Some(last) = self.curves.last_mut() {
            *last = curve;
        }
    }

    /// The curve that was sounding at `time`.
    fn curve_at(&self, time: f64) -> Option<&Curve> {
        self.curves
            .iter()
            .rev()
            .find(|curve| curve.dampen_start <= time)
            .or_else(|| self.curves.first())
    }

    fn current(&self) -> Option<&Curve> {
        self.curves.last()
    }

    /// The envelope level at `time`, evaluated from the same closed forms that were scheduled.
    /// Times before the latest key-on evaluate the note that was sounding then, as far back as
    /// the history has not been pruned.
    pub fn linear_value_at_time(&self, time: f64) -> f64 {
        self.curve_at(time).map_or(0.0, |curve| curve.value_at(time))
    }

    pub fn stage_at(&self, time: f64) -> EnvelopeStage {
        self.curve_at(time)
            .map_or(EnvelopeStage::Idle, |curve| curve.stage_at(time))
    }

    /// Forgets curves and gain automation that no longer affect `time` or later.
    pub fn prune_before(&mut self, time: f64) {
        let keep_from = self
            .curves
            .iter()
            .rposition(|curve| curve.dampen_start <= time)
            .unwrap_or(0);
        self.curves.drain(..keep_from);
        self.gain.prune_before(time);
    }

    pub fn begin_level(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.begin_level)
    }

    pub fn begin_attack(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.begin_attack)
    }

    pub fn end_attack(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.end_attack)
    }

    pub fn end_decay(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.end_decay)
    }

    pub fn end_sustain(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.end_sustain)
    }

    pub fn begin_release(&self) -> Option<f64> {
        self.current().and_then(|curve| curve.begin_release)
    }

    pub fn release_level(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.release_level)
    }

    pub fn end_release(&self) -> f64 {
        self.current().map_or(0.0, |curve| curve.end_release)
    }
}

fn ramp_duration(tick: f64, delta: f64, increment: f64) -> f64 {
    if delta <= 0.0 {
        0.0
    } else if increment <= 0.0 {
        f64::INFINITY
    } else {
        tick * (delta / increment).ceil()
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self {
            total_level: 0,
            rate_scaling: 0,
            attack_rate: 31,
            decay_rate: 0,
            sustain_rate: 0,
            release_rate: 15,
            sustain_level: 0,
            ssg_mode: None,
            inverted: false,
            jump: false,
            looping: false,
            alternating: false,
            velocity_sensitivity: 0,
            reset: false,
            velocity_attenuation: 0.0,
            curves: Vec::new(),
            gain: Timeline::new(0.0),
            loop_cache: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 5.632e-5;

    #[test]
    fn test_increment_table() {
        assert_eq!(rate_increment(0), 0.0);
        assert_eq!(rate_increment(1), 0.0);
        assert_eq!(rate_increment(48), 1.0);
        assert_eq!(rate_increment(51), 1.75);
        assert_eq!(rate_increment(60), 8.0);
        assert_eq!(rate_increment(63), 8.0);
        for rate in 2..63 {
            assert!(rate_increment(rate) <= rate_increment(rate + 1));
        }
    }

    #[test]
    fn test_attack_tables_get_faster_with_rate() {
        let tables = tables();
        for index in 0..60 {
            assert!(tables.attack_target[index] > MAX_LEVEL);
            assert!(tables.attack_constant[index] > 0.0);
        }
        let constants = [0, 20, 40, 59].map(|index| tables.attack_constant[index]);
        assert!(constants.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn test_rate_adjust() {
        let mut env = EnvelopeGenerator::new();
        env.set_rate_scaling(0);
        assert_eq!(env.rate_adjust(31), 3);
        env.set_rate_scaling(3);
        assert_eq!(env.rate_adjust(31), 31);
        env.set_rate_scaling(-3);
        assert_eq!(env.rate_adjust(0), 31);
        assert_eq!(env.rate_adjust(31), 0);
    }

    #[test]
    fn test_attack_ends_at_full_level() {
        let mut env = EnvelopeGenerator::new();
        env.set_attack(20);
        env.key_on(127, 0, 0.0, TICK);
        let end = env.end_attack();
        assert!(end > 0.0 && end.is_finite());
        assert!((env.linear_value_at_time(end - 1e-12) - MAX_LEVEL).abs() < 1e-3);
        assert_eq!(env.linear_value_at_time(end), MAX_LEVEL);
        assert_eq!(env.stage_at(end * 0.5), EnvelopeStage::Attack);
    }

    #[test]
    fn test_zero_attack_rate_freezes() {
        let mut env = EnvelopeGenerator::new();
        env.set_attack(0);
        let trigger = env.key_on(127, 0, 1.0, TICK);
        assert_eq!(trigger.silent_from, Some(1.0));
        assert_eq!(env.linear_value_at_time(100.0), 0.0);
    }

    #[test]
    fn test_decay_to_sustain_point() {
        let mut env = EnvelopeGenerator::new();
        env.set_decay(10);
        env.set_sustain_level(512);
        env.key_on(127, 0, 0.0, TICK);
        // 512 levels at combined rate 20, which moves 1/128 of a level per tick
        let expected = TICK * 512.0 * 128.0;
        assert!((env.end_decay() - expected).abs() < 1e-12);
        assert_eq!(env.linear_value_at_time(env.end_decay() + 1.0), 511.0);
    }

    #[test]
    fn test_sound_off_is_immediate() {
        let mut env = EnvelopeGenerator::new();
        env.key_on(127, 0, 0.0, TICK);
        assert_eq!(env.sound_off(0.5), 0.5);
        assert_eq!(env.linear_value_at_time(0.5), 0.0);
        assert_eq!(env.gain().value_at(0.6), 0.0);
    }

    #[test]
    fn test_sound_off_before_key_on_stays_idle() {
        let mut env = EnvelopeGenerator::new();
        assert_eq!(env.sound_off(1.0), 1.0);
        assert!(env.curves.is_empty());
        assert_eq!(env.stage_at(2.0), EnvelopeStage::Idle);
        assert_eq!(env.key_off(0, 2.0), None);
    }

    #[test]
    fn test_prune_drops_curves_no_longer_in_effect() {
        let mut env = EnvelopeGenerator::new();
        for time in [0.0, 1.0, 2.0] {
            env.key_on(127, 0, time, TICK);
        }
        assert_eq!(env.curves.len(), 3);
        env.prune_before(1.5);
        assert_eq!(env.curves.len(), 2);
        assert_eq!(env.curves[0].dampen_start, 1.0);
        env.prune_before(0.5);
        assert_eq!(env.curves.len(), 2);
        env.prune_before(5.0);
        assert_eq!(env.curves.len(), 1);
        assert_eq!(env.linear_value_at_time(5.0), MAX_LEVEL);
    }

    #[test]
    fn test_ssg_mode_flags() {
        let mut env = EnvelopeGenerator::new();
        env.set_ssg_mode(Some(8));
        assert!(env.looping() && !env.inverted() && !env.jump());
        env.set_ssg_mode(Some(11));
        assert!(!env.looping() && env.jump());
        env.set_ssg_mode(Some(13));
        assert!(!env.looping() && env.inverted() && !env.jump());
        env.set_ssg_mode(Some(3));
        assert_eq!(env.ssg_mode(), None);
    }

    #[test]
    fn test_level_to_gain() {
        assert_eq!(level_to_gain(0.0), 0.0);
        assert_eq!(level_to_gain(MAX_LEVEL), 1.0);
        // 64 levels are 6 dB
        assert!((level_to_gain(MAX_LEVEL - 64.0) - 0.501).abs() < 1e-3);
    }
}
