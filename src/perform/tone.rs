use serde::{Deserialize, Serialize};

use super::Instrument;

pub const CHANNEL_COUNT: usize = 16;
pub const DEFAULT_PROGRAM: u8 = 0;

/// How guitar tone switches are driven during playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToneMode {
    #[default]
    Off,
    /// Each channel keeps its own program.
    Standard,
    /// A program change on any channel applies to all channels; only
    /// program-controlled tracks trigger switches.
    Simple,
    /// Tones come from the per-track table; channel programs are ignored.
    Override,
}

/// Program slots for the 16 MIDI channels. Owned by one playback and reset
/// on every load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneState {
    mode: ToneMode,
    programs: [u8; CHANNEL_COUNT],
    current_channel: u8,
}

impl ToneState {
    pub fn new(mode: ToneMode) -> Self {
        Self {
            mode,
            programs: [DEFAULT_PROGRAM; CHANNEL_COUNT],
            current_channel: 0,
        }
    }

    pub fn mode(&self) -> ToneMode {
        self.mode
    }

    pub fn programs(&self) -> &[u8; CHANNEL_COUNT] {
        &self.programs
    }

    pub fn current_channel(&self) -> u8 {
        self.current_channel
    }

    pub fn reset(&mut self) {
        self.programs = [DEFAULT_PROGRAM; CHANNEL_COUNT];
        self.current_channel = 0;
    }

    pub fn on_program_change(&mut self, channel: u8, program: u8) {
        match self.mode {
            ToneMode::Off | ToneMode::Override => {}
            ToneMode::Standard => {
                if let Some(slot) = self.programs.get_mut(channel as usize) {
                    *slot = program;
                }
            }
            ToneMode::Simple => self.programs = [program; CHANNEL_COUNT],
        }
    }

    /// Tone to switch to before a guitar note-on, if any.
    ///
    /// `override_tone` is this track's entry in the per-track tone table and
    /// is only consulted in [`ToneMode::Override`].
    pub fn on_note_on(
        &mut self,
        channel: u8,
        program_controlled: bool,
        override_tone: Option<u8>,
    ) -> Option<u8> {
        match self.mode {
            ToneMode::Off => None,
            ToneMode::Standard => self.channel_tone(channel),
            ToneMode::Simple if program_controlled => self.channel_tone(channel),
            ToneMode::Simple => None,
            ToneMode::Override => override_tone,
        }
    }

    fn channel_tone(&mut self, channel: u8) -> Option<u8> {
        self.current_channel = channel;
        let program = *self.programs.get(channel as usize)?;
        Instrument::from_program(program).and_then(Instrument::guitar_tone)
    }
}
