use super::error::Error;

/// A note event addressed to one channel, as delivered to a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub channel: usize,
    pub note: u8,
    pub velocity: u8,
    pub is_on: bool,
}

impl NoteEvent {
    pub fn new(channel: usize, note: u8, velocity: u8, is_on: bool) -> Result<Self, Error> {
        if note > 127 {
            return Err(Error::NoteOutOfRange(note));
        }
        Ok(Self {
            channel,
            note,
            velocity: velocity.min(127),
            is_on,
        })
    }

    pub fn on(channel: usize, note: u8, velocity: u8) -> Result<Self, Error> {
        Self::new(channel, note, velocity, true)
    }

    pub fn off(channel: usize, note: u8) -> Result<Self, Error> {
        Self::new(channel, note, 0, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_range() {
        assert!(NoteEvent::on(0, 127, 100).is_ok());
        assert!(matches!(NoteEvent::on(0, 128, 100), Err(Error::NoteOutOfRange(128))));
        assert_eq!(NoteEvent::on(1, 60, 200).map(|event| event.velocity).ok(), Some(127));
    }
}
