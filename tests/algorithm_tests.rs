use std::sync::Arc;

use opnsynth::synth::algorithm::{Routing, ALGORITHMS, EDGES};
use opnsynth::synth::context::SynthContext;
use opnsynth::synth::tuning::Tuning;
use opnsynth::synth::{Channel, Error};

fn channel() -> Channel {
    let context = SynthContext::default();
    Channel::new(context, Arc::new(Tuning::standard(&context)))
}

#[test]
fn test_every_algorithm_round_trips() {
    let mut channel = channel();
    for algorithm in 0..ALGORITHMS.len() {
        channel.use_algorithm(algorithm).unwrap();
        assert_eq!(channel.get_algorithm(), Some(algorithm));
    }
}

#[test]
fn test_algorithms_are_distinct() {
    for (a, first) in ALGORITHMS.iter().enumerate() {
        for second in &ALGORITHMS[a + 1..] {
            assert!(first != second);
        }
    }
}

#[test]
fn test_unknown_algorithm() {
    let mut channel = channel();
    channel.use_algorithm(3).unwrap();
    assert!(matches!(
        channel.use_algorithm(9),
        Err(Error::UnknownAlgorithm(9))
    ));
    assert_eq!(channel.get_algorithm(), Some(3));
}

#[test]
fn test_custom_depths_leave_the_fixed_set() {
    let mut channel = channel();
    channel.use_algorithm(7).unwrap();
    channel.set_modulation_depth(1, 3, 0.5).unwrap();
    assert_eq!(channel.get_algorithm(), None);
    assert_eq!(channel.modulation_depth(1, 3), 0.5);
    channel.set_modulation_depth(1, 3, 0.0).unwrap();
    assert_eq!(channel.get_algorithm(), Some(7));
}

#[test]
fn test_feedback_does_not_affect_algorithm_matching() {
    let mut channel = channel();
    channel.use_algorithm(2).unwrap();
    channel.set_feedback(6);
    assert_eq!(channel.get_algorithm(), Some(2));
    channel.use_algorithm(5).unwrap();
    assert_eq!(channel.feedback_depth(0), 0.5);
}

#[test]
fn test_modulation_must_flow_upwards() {
    let mut channel = channel();
    for (from, to) in [(1, 0), (3, 2), (2, 2), (0, 4)] {
        assert!(matches!(
            channel.set_modulation_depth(from, to, 1.0),
            Err(Error::InvalidRouting { .. })
        ));
    }
    for &(from, to) in EDGES.iter() {
        assert!(channel.set_modulation_depth(from, to, 0.25).is_ok());
    }
}

#[test]
fn test_extra_algorithm_is_two_stacks() {
    let routing = Routing::from_algorithm(8).unwrap();
    assert_eq!(routing.targets(0).collect::<Vec<_>>(), vec![2]);
    assert_eq!(routing.targets(1).collect::<Vec<_>>(), vec![3]);
    assert_eq!(routing.outputs, [0.0, 0.0, 1.0, 1.0]);
}
