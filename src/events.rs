use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8, velocity: u8 },
    ProgramChange { program: u8 },
    Text(String),
    TrackName(String),
    /// Microseconds per quarter note.
    Tempo(u32),
    Other,
}

impl MidiMessage {
    pub fn pitch(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn { pitch, .. } | MidiMessage::NoteOff { pitch, .. } => Some(*pitch),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        self.pitch().is_some()
    }
}

/// One timed event as decoded from a file, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub message: MidiMessage,
    pub channel: u8,
    /// Absolute time in ticks.
    pub tick: u64,
    /// Index of the track chunk the event came from.
    pub track: usize,
}

impl RawEvent {
    pub fn new(track: usize, tick: u64, channel: u8, message: MidiMessage) -> Self {
        Self {
            message,
            channel,
            tick,
            track,
        }
    }
}

/// Program changes sort before everything else at the same tick.
pub const TIE_BREAK_PROGRAM_CHANGE: i32 = -2;
/// Non-note, non-program events keep their relative order.
pub const TIE_BREAK_OTHER: i32 = -1;

/// Secondary sort key for events sharing a tick: program changes first, then
/// ordinary events, then note-ons from low to high pitch.
pub fn tie_break_key(message: &MidiMessage) -> i32 {
    match message {
        MidiMessage::NoteOn { pitch, .. } => *pitch as i32,
        MidiMessage::ProgramChange { .. } => TIE_BREAK_PROGRAM_CHANGE,
        _ => TIE_BREAK_OTHER,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub message: MidiMessage,
    pub channel: u8,
    pub tick: u64,
    /// Output track index assigned by the normalizer.
    pub track: usize,
    pub tie_break: i32,
}

impl ScheduledEvent {
    pub fn new(track: usize, tick: u64, channel: u8, message: MidiMessage) -> Self {
        let tie_break = tie_break_key(&message);
        Self {
            message,
            channel,
            tick,
            track,
            tie_break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_break_orders_program_before_other_before_notes() {
        let program = tie_break_key(&MidiMessage::ProgramChange { program: 5 });
        let text = tie_break_key(&MidiMessage::Text("verse".into()));
        let low = tie_break_key(&MidiMessage::NoteOn { pitch: 0, velocity: 90 });
        let high = tie_break_key(&MidiMessage::NoteOn { pitch: 67, velocity: 90 });
        assert!(program < text);
        assert!(text < low);
        assert!(low < high);
    }

    #[test]
    fn note_off_is_an_ordinary_event() {
        let key = tie_break_key(&MidiMessage::NoteOff { pitch: 60, velocity: 0 });
        assert_eq!(key, TIE_BREAK_OTHER);
    }
}
