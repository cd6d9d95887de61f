use crate::synth::note::NoteEvent;
use crate::synth::patch::ChannelPatch;
use crate::synth::{Error, OfflineRenderer, Synth, SynthConfig};
use js_sys::Float32Array;
use wasm_bindgen::prelude::*;

fn to_js(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// WASM Synth runtime (no threads, no channels, direct API)
#[wasm_bindgen]
pub struct WasmSynth {
    synth: Synth,
    renderer: OfflineRenderer,
    temp_buffer: Vec<f32>,
}

#[wasm_bindgen]
impl WasmSynth {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32) -> WasmSynth {
        let config = SynthConfig {
            sample_rate,
            ..SynthConfig::default()
        };
        WasmSynth {
            renderer: OfflineRenderer::new(config.sample_rate, 0.0),
            synth: Synth::new(config),
            temp_buffer: Vec::new(),
        }
    }

    /// Renders `frames` interleaved stereo frames into a JS-friendly Float32Array
    #[wasm_bindgen]
    pub fn render(&mut self, frames: usize) -> Float32Array {
        if self.temp_buffer.len() != frames * 2 {
            self.temp_buffer = vec![0.0; frames * 2];
        }
        self.renderer.render(&self.synth, &mut self.temp_buffer);
        self.synth.prune_before(self.renderer.time() - 1.0);
        Float32Array::from(self.temp_buffer.as_slice())
    }

    #[wasm_bindgen]
    pub fn note_on(&mut self, channel: usize, note: u8, velocity: u8) {
        self.handle(NoteEvent::on(channel, note, velocity));
    }

    #[wasm_bindgen]
    pub fn note_off(&mut self, channel: usize, note: u8) {
        self.handle(NoteEvent::off(channel, note));
    }

    fn handle(&mut self, event: Result<NoteEvent, Error>) {
        let time = self.synth.now(self.renderer.time());
        if let Err(err) = event.and_then(|event| self.synth.handle_event(&event, time)) {
            web_sys::console::warn_1(&to_js(err));
        }
    }

    #[wasm_bindgen]
    pub fn use_algorithm(&mut self, channel: usize, algorithm: usize) -> Result<(), JsValue> {
        self.synth
            .channel_mut(channel)
            .and_then(|channel| channel.use_algorithm(algorithm))
            .map_err(to_js)
    }

    #[wasm_bindgen]
    pub fn patch(&self, channel: usize) -> Result<JsValue, JsValue> {
        let patch = self.synth.channel(channel).map_err(to_js)?.patch();
        serde_wasm_bindgen::to_value(&patch).map_err(JsValue::from)
    }

    #[wasm_bindgen]
    pub fn load_patch(&mut self, channel: usize, patch: JsValue) -> Result<(), JsValue> {
        let patch: ChannelPatch = serde_wasm_bindgen::from_value(patch)?;
        let time = self.synth.now(self.renderer.time());
        self.synth
            .channel_mut(channel)
            .and_then(|channel| channel.apply_patch(&patch, time))
            .map_err(to_js)
    }
}
