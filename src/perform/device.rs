use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::{Instrument, ToneState, TranslateSettings, translate};
use crate::config::Config;
use crate::events::{MidiMessage, ScheduledEvent};
use crate::timing::TrackInfo;

/// Offsets the game applies on top of the pressed key, updated by the
/// injector on every press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOffsets {
    pub note: i32,
    pub octave: i32,
}

/// Performs translated keys on the game client.
///
/// Called from the playback clock thread; implementations must return
/// quickly since calls are not preemptible.
pub trait KeyInjector: Send {
    fn press_key(&mut self, key: u8, offsets: &mut KeyOffsets) -> bool;
    fn release_key(&mut self, key: u8) -> bool;
    fn switch_guitar_tone(&mut self, tone: u8);
}

/// Decides which tracks (and which percussion notes) reach the injector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilter {
    soloed: Option<usize>,
    enabled: Vec<bool>,
    percussion: HashMap<usize, BTreeSet<u8>>,
}

impl TrackFilter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            soloed: config.soloed_track,
            enabled: config.enabled_tracks.clone(),
            percussion: config.percussion_notes.clone(),
        }
    }

    pub fn allows(&self, track: usize, message: &MidiMessage) -> bool {
        let track_on = match self.soloed {
            Some(solo) => solo == track,
            None => self.enabled.get(track).copied().unwrap_or(true),
        };
        if !track_on {
            return false;
        }
        match (self.percussion.get(&track), message.pitch()) {
            (Some(allowed), Some(pitch)) => allowed.contains(&pitch),
            _ => true,
        }
    }
}

pub fn note_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    format!("{}{}", NAMES[(pitch % 12) as usize], pitch as i32 / 12 - 1)
}

/// Turns scheduled MIDI events into key presses for a monophonic
/// instrument. Only one pressed key is tracked at a time.
#[derive(Debug, Clone)]
pub struct Performer {
    translate: TranslateSettings,
    tone: ToneState,
    filter: TrackFilter,
    tones_per_track: Vec<u8>,
    program_controlled: Vec<bool>,
    instrument: Option<Instrument>,
    offsets: KeyOffsets,
    pressed: Option<u8>,
}

impl Performer {
    pub fn new(config: &Config, tracks: &[TrackInfo], instrument: Option<Instrument>) -> Self {
        Self {
            translate: TranslateSettings::from_config(config),
            tone: ToneState::new(config.tone_mode),
            filter: TrackFilter::from_config(config),
            tones_per_track: config.tones_per_track.clone(),
            program_controlled: tracks.iter().map(|t| t.is_program_controlled).collect(),
            instrument,
            offsets: KeyOffsets::default(),
            pressed: None,
        }
    }

    pub fn tone(&self) -> &ToneState {
        &self.tone
    }

    pub fn tone_mut(&mut self) -> &mut ToneState {
        &mut self.tone
    }

    pub fn pressed(&self) -> Option<u8> {
        self.pressed
    }

    pub fn offsets(&self) -> KeyOffsets {
        self.offsets
    }

    pub fn instrument(&self) -> Option<Instrument> {
        self.instrument
    }

    pub fn set_instrument(&mut self, instrument: Option<Instrument>) {
        self.instrument = instrument;
    }

    /// Returns `true` when the event produced a successful press or release.
    pub fn send(&mut self, event: &ScheduledEvent, injector: &mut dyn KeyInjector) -> bool {
        let track = event.track;
        if !self.filter.allows(track, &event.message) {
            return false;
        }

        match event.message {
            MidiMessage::ProgramChange { program } => {
                self.tone.on_program_change(event.channel, program);
                false
            }
            MidiMessage::NoteOn { pitch, .. } => {
                if self.instrument.is_some_and(Instrument::is_guitar) {
                    let program_controlled =
                        self.program_controlled.get(track).copied().unwrap_or(false);
                    let override_tone = self.tones_per_track.get(track).copied();
                    if let Some(tone) =
                        self.tone
                            .on_note_on(event.channel, program_controlled, override_tone)
                    {
                        injector.switch_guitar_tone(tone);
                    }
                }
                self.note_on(track, event.channel, pitch, injector)
            }
            MidiMessage::NoteOff { pitch, .. } => {
                self.note_off(track, event.channel, pitch, injector)
            }
            _ => false,
        }
    }

    fn note_on(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        injector: &mut dyn KeyInjector,
    ) -> bool {
        let translated = translate(pitch, Some(track), &self.translate);
        let Some(key) = translated.key() else {
            trace!(
                "[N][DOWN][{track}:{channel}] {} ({}) (out of range)",
                note_name(pitch),
                translated.index
            );
            return false;
        };

        if self.pressed == Some(key) && injector.release_key(key) {
            // release repeated note in order to press it again
            self.pressed = None;
            trace!("[N][PUP ][{track}:{channel}] {} ({key})", note_name(pitch));
        }

        if translated.octave_shift != 0 {
            trace!(
                "[N][DOWN][{track}:{channel}] {} ({key}) [adapted {:+} Oct]",
                note_name(pitch),
                translated.octave_shift
            );
        } else {
            trace!("[N][DOWN][{track}:{channel}] {} ({key})", note_name(pitch));
        }

        if injector.press_key(key, &mut self.offsets) {
            self.pressed = Some(key);
            return true;
        }
        false
    }

    fn note_off(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        injector: &mut dyn KeyInjector,
    ) -> bool {
        let Some(key) = translate(pitch, Some(track), &self.translate).key() else {
            return false;
        };
        if self.pressed != Some(key) {
            trace!("[N][IGOR][{track}:{channel}] {} ({key})", note_name(pitch));
            return false;
        }
        trace!("[N][UP  ][{track}:{channel}] {} ({key})", note_name(pitch));
        if injector.release_key(key) {
            self.pressed = None;
            return true;
        }
        false
    }

    /// Releases the held key, if any.
    pub fn release_all(&mut self, injector: &mut dyn KeyInjector) {
        if let Some(key) = self.pressed {
            if injector.release_key(key) {
                self.pressed = None;
            }
        }
    }

    pub fn reset(&mut self) {
        self.tone.reset();
        self.pressed = None;
    }
}
