use opnsynth::synth::context::SynthContext;
use opnsynth::synth::frequency::{frequency_to_full_freq, full_freq_to_components, FREQ_NUM_LIMIT};
use opnsynth::synth::tuning::{Tuning, NOTE_COUNT};
use opnsynth::synth::Synth;

fn tunings(context: &SynthContext) -> Vec<Tuning> {
    let just = [9. / 8., 5. / 4., 4. / 3., 3. / 2., 5. / 3., 15. / 8., 2.];
    vec![
        Tuning::standard(context),
        Tuning::equal_temperament(context, 432.0, 69, 12.0, &[1.0]),
        Tuning::equal_temperament(context, 440.0, 69, 19.0, &[1.0]),
        Tuning::equal_temperament(context, 261.63, 60, 31.0, &[5., 5., 3., 5., 5., 5., 3.]),
        Tuning::ratio_tuning(context, 264.0, 60, &just),
    ]
}

fn variance(histogram: &[usize; 32]) -> f64 {
    let mean = NOTE_COUNT as f64 / 32.0;
    histogram
        .iter()
        .map(|&count| (count as f64 - mean).powi(2))
        .sum::<f64>()
        / 32.0
}

#[test]
fn test_table_matches_quantizing_each_frequency() {
    let context = SynthContext::default();
    for tuning in tunings(&context) {
        for note in 0..NOTE_COUNT as u8 {
            assert_eq!(
                tuning.frequency_to_components(tuning.frequency(note)),
                tuning.components(note),
                "note {note}"
            );
        }
    }
}

#[test]
fn test_every_note_has_a_valid_frequency_number() {
    let context = SynthContext::default();
    for tuning in tunings(&context) {
        let histogram = tuning.key_code_histogram();
        assert_eq!(histogram.iter().sum::<usize>(), NOTE_COUNT);
        for note in 0..NOTE_COUNT as u8 {
            let components = tuning.components(note);
            assert!(components.block <= 7);
            assert!(components.freq_num <= 2047);
        }
    }
}

#[test]
fn test_spreading_does_not_worsen_key_code_balance() {
    let context = SynthContext::default();
    for tuning in tunings(&context) {
        let mut naive = [0usize; 32];
        for note in 0..NOTE_COUNT as u8 {
            let full = frequency_to_full_freq(tuning.frequency(note), context.frequency_step);
            naive[full_freq_to_components(full, FREQ_NUM_LIMIT).key_code() as usize] += 1;
        }
        assert!(variance(&tuning.key_code_histogram()) <= variance(&naive));
    }
}

#[test]
fn test_quantized_pitch_stays_close() {
    let context = SynthContext::default();
    let tuning = Tuning::standard(&context);
    for note in 24..108u8 {
        let components = tuning.components(note);
        let actual = components.full_freq() as f64 * context.frequency_step;
        let cents = 1200.0 * (actual / tuning.frequency(note)).log2();
        assert!(cents.abs() < 5.0, "note {note} is {cents:.2} cents out");
    }
}

#[test]
fn test_synth_retunes_every_channel() {
    let mut synth = Synth::default();
    synth.ratio_tuning(264.0, 60, &[9. / 8., 5. / 4., 4. / 3., 3. / 2., 5. / 3., 15. / 8., 2.]);
    synth.note_on(2, 60, 100, 0.0).unwrap();
    let expected = synth.tuning().components(60);
    assert_eq!(synth.channel(2).unwrap().components(), expected);
    for channel in synth.channels() {
        assert_eq!(channel.tuning().frequency(67), 528.0);
    }
}
