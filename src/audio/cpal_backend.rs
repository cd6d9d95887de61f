use crate::audio::AudioBackend;
use crate::runtime::NativeSynth;
use crate::synth::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::sync::{Arc, Mutex};

pub struct CpalBackend {
    stream: Option<Stream>,
    synth: Arc<Mutex<NativeSynth>>,
}

fn device_error(err: impl std::fmt::Display) -> Error {
    Error::OutputDevice(err.to_string())
}

impl CpalBackend {
    pub fn new(synth: Arc<Mutex<NativeSynth>>) -> Self {
        Self {
            stream: None,
            synth,
        }
    }

    fn select_output_device(&self, host: &cpal::Host) -> Result<cpal::Device, Error> {
        if cfg!(target_os = "linux") {
            // Prefer the sound server over raw ALSA hardware devices.
            let preferred = host.devices().map_err(device_error)?.find(|device| {
                let name = device.name().unwrap_or_default().to_lowercase();
                name.contains("pipewire") || name.starts_with("default:")
            });
            if let Some(device) = preferred {
                return Ok(device);
            }
        }
        host.default_output_device()
            .ok_or_else(|| device_error("No output device available"))
    }

    fn build_stream(&mut self) -> Result<Stream, Error> {
        let host = cpal::default_host();
        let device = self.select_output_device(&host)?;
        log::info!("Selected device: {}", device.name().unwrap_or_default());

        let supported_config = device.default_output_config().map_err(device_error)?;
        let stream_config: cpal::StreamConfig = supported_config.clone().into();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        self.synth
            .lock()
            .map_err(device_error)?
            .set_sample_rate(sample_rate as f32);

        let synth = self.synth.clone();
        let mut stereo = Vec::new();
        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / channels;
                        stereo.resize(frames * 2, 0.0);
                        match synth.lock() {
                            Ok(mut synth) => synth.process(&mut stereo),
                            Err(_) => stereo.fill(0.0),
                        }
                        for (frame, source) in data.chunks_mut(channels).zip(stereo.chunks(2)) {
                            match frame {
                                [mono] => *mono = 0.5 * (source[0] + source[1]),
                                [left, right, rest @ ..] => {
                                    *left = source[0];
                                    *right = source[1];
                                    rest.fill(0.0);
                                }
                                [] => {}
                            }
                        }
                    },
                    |err| log::error!("Stream error: {}", err),
                    None,
                )
                .map_err(device_error)?,
            format => return Err(device_error(format!("Unsupported sample format {format:?}"))),
        };

        Ok(stream)
    }
}

impl AudioBackend for CpalBackend {
    fn start(&mut self) -> Result<(), Error> {
        let stream = self.build_stream()?;
        stream.play().map_err(device_error)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        if let Some(stream) = &self.stream {
            stream.pause().map_err(device_error)?;
        }
        Ok(())
    }
}
