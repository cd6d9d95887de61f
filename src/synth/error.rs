use super::prelude::fmt;

/// Errors reported by the synth engine. Numeric parameters never fail, they are clamped.
#[derive(Debug)]
pub enum Error {
    /// A modulation edge that does not run from a lower to a higher operator index.
    InvalidRouting { from: usize, to: usize },
    UnknownAlgorithm(usize),
    ChannelOutOfRange(usize),
    OperatorOutOfRange(usize),
    NoteOutOfRange(u8),
    PatchFormat(serde_json::Error),
    OutputDevice(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRouting { from, to } => write!(
                f,
                "Operator {} cannot modulate operator {}: modulation must flow to a higher operator",
                from + 1,
                to + 1
            ),
            Self::UnknownAlgorithm(index) => write!(f, "Algorithm {index} does not exist"),
            Self::ChannelOutOfRange(index) => write!(f, "Channel {index} does not exist"),
            Self::OperatorOutOfRange(index) => {
                write!(f, "Operator {index} does not exist (expected 0..4)")
            }
            Self::NoteOutOfRange(note) => write!(f, "Note {note} is outside the MIDI range"),
            Self::PatchFormat(err) => write!(f, "Invalid patch: {err}"),
            Self::OutputDevice(message) => write!(f, "Output device error: {message}"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::PatchFormat(err)
    }
}
