use opnsynth::runtime::native;
use opnsynth::synth::note::NoteEvent;
use opnsynth::synth::{Error, SynthConfig};
use std::time::Duration;

/// A short arpeggio: (note, length in milliseconds).
const PHRASE: [(u8, u64); 8] = [
    (57, 250),
    (60, 250),
    (64, 250),
    (69, 250),
    (72, 250),
    (69, 250),
    (64, 250),
    (60, 750),
];

fn main() -> Result<(), Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .map_err(|err| Error::OutputDevice(err.to_string()))?;

    let (_backend, runtime, notes) = native::start(SynthConfig::default())?;

    {
        let mut runtime = runtime
            .lock()
            .map_err(|err| Error::OutputDevice(err.to_string()))?;
        let time = runtime.time();
        let channel = runtime.synth_mut().channel_mut(0)?;
        channel.use_algorithm(4)?;
        channel.set_feedback(5);
        for (index, multiple) in [2.0, 1.0, 4.0, 1.0].into_iter().enumerate() {
            let operator = channel.operator_mut(index)?;
            operator.set_multiple(multiple, time);
            operator.envelope.set_decay(8);
            operator.envelope.set_sustain_level_register(4);
            operator.envelope.set_release(7);
        }
        channel.operator_mut(0)?.envelope.set_total_level(20);
        channel.operator_mut(2)?.envelope.set_total_level(28);
    }

    log::info!("Playing demo phrase");
    for (note, length) in PHRASE {
        notes
            .send(NoteEvent::on(0, note, 100)?)
            .map_err(|err| Error::OutputDevice(err.to_string()))?;
        std::thread::sleep(Duration::from_millis(length));
        notes
            .send(NoteEvent::off(0, note)?)
            .map_err(|err| Error::OutputDevice(err.to_string()))?;
    }
    std::thread::sleep(Duration::from_millis(800));
    Ok(())
}
