use std::sync::Arc;

use super::channel::Channel;
use super::config::SynthConfig;
use super::context::SynthContext;
use super::error::Error;
use super::note::NoteEvent;
use super::tuning::Tuning;
use super::waveform::{Waveform, WaveformBank};

/// The chip: a set of FM channels sharing one clock, one tuning table and one waveform bank.
pub struct Synth {
    config: SynthConfig,
    context: SynthContext,
    tuning: Arc<Tuning>,
    channels: Vec<Channel>,
    waveforms: WaveformBank,
}

impl Synth {
    pub fn new(config: SynthConfig) -> Self {
        let context = SynthContext::from_config(&config);
        let tuning = Arc::new(Tuning::equal_temperament(
            &context,
            config.reference_pitch,
            config.reference_note,
            12.0,
            &[1.0],
        ));
        let channels = (0..config.channels)
            .map(|_| Channel::new(context, tuning.clone()))
            .collect();
        log::debug!(
            "Synth created: {} channels, clock {:.0} Hz, envelope tick {:.3e}s",
            config.channels,
            config.clock_rate,
            context.envelope_tick
        );
        Self {
            config,
            context,
            tuning,
            channels,
            waveforms: WaveformBank::new(),
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn context(&self) -> &SynthContext {
        &self.context
    }

    /// Earliest time a change may be scheduled at, given the current playback time.
    pub fn now(&self, current_time: f64) -> f64 {
        current_time + self.config.lookahead
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Result<&Channel, Error> {
        self.channels
            .get(index)
            .ok_or(Error::ChannelOutOfRange(index))
    }

    pub fn channel_mut(&mut self, index: usize) -> Result<&mut Channel, Error> {
        self.channels
            .get_mut(index)
            .ok_or(Error::ChannelOutOfRange(index))
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Replaces the tuning table of every channel.
    pub fn set_tuning(&mut self, tuning: Tuning) {
        self.tuning = Arc::new(tuning);
        for channel in self.channels.iter_mut() {
            channel.set_tuning(self.tuning.clone());
        }
    }

    pub fn equal_temperament(
        &mut self,
        reference_pitch: f64,
        reference_note: u8,
        divisions: f64,
        step_pattern: &[f64],
    ) {
        let tuning = Tuning::equal_temperament(
            &self.context,
            reference_pitch,
            reference_note,
            divisions,
            step_pattern,
        );
        self.set_tuning(tuning);
    }

    pub fn ratio_tuning(&mut self, reference_pitch: f64, reference_note: u8, ratios: &[f64]) {
        let tuning = Tuning::ratio_tuning(&self.context, reference_pitch, reference_note, ratios);
        self.set_tuning(tuning);
    }

    pub fn waveforms(&self) -> &WaveformBank {
        &self.waveforms
    }

    /// Registers a custom waveform from sine harmonic amplitudes.
    pub fn register_waveform(&mut self, harmonics: &[f64]) -> Waveform {
        self.waveforms.register(harmonics)
    }

    /// Panics if `waveform` is a custom waveform that was never registered.
    pub fn set_waveform(
        &mut self,
        channel: usize,
        operator: usize,
        waveform: Waveform,
        time: f64,
    ) -> Result<(), Error> {
        assert!(
            self.waveforms.contains(waveform),
            "waveform {waveform:?} has not been registered"
        );
        self.channel_mut(channel)?
            .operator_mut(operator)?
            .set_waveform(waveform, time);
        Ok(())
    }

    pub fn note_on(&mut self, channel: usize, note: u8, velocity: u8, time: f64) -> Result<(), Error> {
        let channel = self.channel_mut(channel)?;
        channel.set_midi_note(note, time, false);
        channel.key_on(velocity, time);
        Ok(())
    }

    pub fn note_off(&mut self, channel: usize, time: f64) -> Result<(), Error> {
        self.channel_mut(channel)?.key_off(time);
        Ok(())
    }

    /// Applies a note event. Note-offs for a note the channel is no longer playing are ignored.
    pub fn handle_event(&mut self, event: &NoteEvent, time: f64) -> Result<(), Error> {
        if event.is_on {
            self.note_on(event.channel, event.note, event.velocity, time)
        } else if self.channel(event.channel)?.note() == Some(event.note) {
            self.note_off(event.channel, time)
        } else {
            Ok(())
        }
    }

    /// Silences every channel immediately.
    pub fn sound_off(&mut self, time: f64) {
        for channel in self.channels.iter_mut() {
            channel.sound_off(time);
        }
    }

    pub fn prune_before(&mut self, time: f64) {
        for channel in self.channels.iter_mut() {
            channel.prune_before(time);
        }
    }
}

impl Default for Synth {
    fn default() -> Self {
        Self::new(SynthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_bounds() {
        let mut synth = Synth::default();
        assert_eq!(synth.channels().len(), 6);
        assert!(synth.note_on(5, 60, 100, 0.0).is_ok());
        assert!(matches!(
            synth.note_on(6, 60, 100, 0.0),
            Err(Error::ChannelOutOfRange(6))
        ));
    }

    #[test]
    fn test_tuning_is_shared() {
        let mut synth = Synth::default();
        synth.equal_temperament(432.0, 69, 12.0, &[1.0]);
        for channel in synth.channels() {
            assert_eq!(channel.tuning().frequency(69), 432.0);
        }
    }

    #[test]
    fn test_now_adds_lookahead() {
        let synth = Synth::default();
        assert!((synth.now(1.0) - 1.02).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "has not been registered")]
    fn test_unregistered_waveform_panics() {
        let mut synth = Synth::default();
        let _ = synth.set_waveform(0, 0, Waveform::Custom(0), 0.0);
    }
}
