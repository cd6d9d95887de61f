use crate::audio::{AudioBackend, CpalBackend};
use crate::synth::note::NoteEvent;
use crate::synth::{Error, OfflineRenderer, Synth, SynthConfig};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Seconds of automation history kept behind the playback position.
const HISTORY: f64 = 1.0;

/// Native runtime: note events arrive over a channel and are scheduled slightly ahead of the
/// playback position; the audio callback renders the resulting curves.
pub struct NativeSynth {
    synth: Synth,
    renderer: OfflineRenderer,
    note_receiver: Receiver<NoteEvent>,
}

impl NativeSynth {
    pub fn new(config: SynthConfig, note_receiver: Receiver<NoteEvent>) -> Self {
        let renderer = OfflineRenderer::new(config.sample_rate, 0.0);
        Self {
            synth: Synth::new(config),
            renderer,
            note_receiver,
        }
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut Synth {
        &mut self.synth
    }

    /// Playback position in seconds.
    pub fn time(&self) -> f64 {
        self.renderer.time()
    }

    /// Restarts rendering at the device sample rate, continuing from the current position.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate != self.renderer.sample_rate() {
            log::info!("Rendering at {sample_rate} Hz");
            self.renderer = OfflineRenderer::new(sample_rate, self.renderer.time());
        }
    }

    /// Fills `output` with interleaved stereo frames.
    pub fn process(&mut self, output: &mut [f32]) {
        self.process_note_events();
        self.renderer.render(&self.synth, output);
        self.synth.prune_before(self.renderer.time() - HISTORY);
    }

    fn process_note_events(&mut self) {
        let time = self.synth.now(self.renderer.time());
        while let Ok(event) = self.note_receiver.try_recv() {
            if let Err(err) = self.synth.handle_event(&event, time) {
                log::warn!("Dropped note event {event:?}: {err}");
            }
        }
    }
}

/// Starts audio output. Returns the running backend, the shared runtime (for patch changes)
/// and a sender for note events.
pub fn start(
    config: SynthConfig,
) -> Result<(CpalBackend, Arc<Mutex<NativeSynth>>, Sender<NoteEvent>), Error> {
    let (note_tx, note_rx) = channel();
    let synth = Arc::new(Mutex::new(NativeSynth::new(config, note_rx)));

    let mut audio_backend = CpalBackend::new(synth.clone());
    audio_backend.start()?;
    Ok((audio_backend, synth, note_tx))
}
