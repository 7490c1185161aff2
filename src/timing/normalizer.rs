//! Groups raw file events into playable tracks.
//!
//! Tracks without notes are discarded and the survivors are renumbered
//! 0..N-1 in source order. Note reconstruction is strict first; when a track
//! has malformed note data every track is rebuilt in permissive mode from
//! its note, program and text events only.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::events::{MidiMessage, RawEvent};
use crate::perform::gm_program_name;
use crate::timing::TempoMap;

pub const UNTITLED_TRACK: &str = "Untitled";
const PROGRAM_TRACK_PREFIX: &str = "program:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Output index, 0-based and dense.
    pub index: usize,
    /// Index of the chunk in the source file.
    pub source_index: usize,
    pub name: String,
    pub is_program_controlled: bool,
    pub note_count: usize,
    pub highest_note: u8,
    pub lowest_note: u8,
    pub duration_ticks: u64,
    pub duration: Duration,
    /// Distinct "channel N, <GM program>" descriptions, in file order.
    pub program_changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTrack {
    pub info: TrackInfo,
    /// Events ordered by tick; `track` holds the output index.
    pub events: Vec<RawEvent>,
}

/// Tracks whose name looks like `Program:<something>` drive tone switching.
pub fn is_program_track_name(name: &str) -> bool {
    name.len() > PROGRAM_TRACK_PREFIX.len()
        && name
            .get(..PROGRAM_TRACK_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PROGRAM_TRACK_PREFIX))
}

pub fn normalize(
    events: &[RawEvent],
    tempo: &TempoMap,
) -> Result<Vec<NormalizedTrack>, NormalizeError> {
    let mut groups: BTreeMap<usize, Vec<RawEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.track).or_default().push(event.clone());
    }

    match normalize_strict(&groups, tempo) {
        Ok(tracks) => Ok(tracks),
        Err(e) => {
            warn!("error when parsing tracks, falling back to permissive note reconstruction: {e}");
            normalize_permissive(groups, tempo)
        }
    }
}

fn normalize_strict(
    groups: &BTreeMap<usize, Vec<RawEvent>>,
    tempo: &TempoMap,
) -> Result<Vec<NormalizedTrack>, NormalizeError> {
    let mut tracks = Vec::new();
    for (&source_index, events) in groups {
        validate(source_index, events)?;
        let notes = reconstruct_strict(source_index, events)?;
        if notes.is_empty() {
            continue;
        }
        let index = tracks.len();
        let info = track_info(index, source_index, events, &notes, tempo);
        let events = events
            .iter()
            .map(|e| RawEvent {
                track: index,
                ..e.clone()
            })
            .collect();
        tracks.push(NormalizedTrack { info, events });
    }
    Ok(tracks)
}

fn normalize_permissive(
    groups: BTreeMap<usize, Vec<RawEvent>>,
    tempo: &TempoMap,
) -> Result<Vec<NormalizedTrack>, NormalizeError> {
    let mut tracks = Vec::new();
    for (source_index, mut events) in groups {
        events.retain(|e| {
            matches!(
                e.message,
                MidiMessage::NoteOn { .. }
                    | MidiMessage::NoteOff { .. }
                    | MidiMessage::ProgramChange { .. }
                    | MidiMessage::Text(_)
                    | MidiMessage::TrackName(_)
            )
        });
        validate(source_index, &events)?;
        events.sort_by_key(|e| e.tick);

        let notes = reconstruct_permissive(&events);
        if notes.is_empty() {
            continue;
        }
        let index = tracks.len();
        let info = track_info(index, source_index, &events, &notes, tempo);

        let mut rebuilt: Vec<RawEvent> = events
            .into_iter()
            .filter(|e| !e.message.is_note())
            .map(|e| RawEvent { track: index, ..e })
            .collect();
        for note in &notes {
            rebuilt.push(RawEvent::new(
                index,
                note.start,
                note.channel,
                MidiMessage::NoteOn {
                    pitch: note.pitch,
                    velocity: note.velocity,
                },
            ));
            rebuilt.push(RawEvent::new(
                index,
                note.end,
                note.channel,
                MidiMessage::NoteOff {
                    pitch: note.pitch,
                    velocity: 0,
                },
            ));
        }
        rebuilt.sort_by_key(|e| e.tick);

        debug!(
            "rebuilt track {} ({}) from {} notes",
            index, info.name, info.note_count
        );
        tracks.push(NormalizedTrack {
            info,
            events: rebuilt,
        });
    }
    Ok(tracks)
}

fn validate(track: usize, events: &[RawEvent]) -> Result<(), NormalizeError> {
    let invalid = |field, value: u32| NormalizeError::InvalidData {
        track,
        field,
        value,
    };
    for event in events {
        if event.channel > 15 {
            return Err(invalid("channel", event.channel as u32));
        }
        match event.message {
            MidiMessage::NoteOn { pitch, velocity } | MidiMessage::NoteOff { pitch, velocity } => {
                if pitch > 127 {
                    return Err(invalid("pitch", pitch as u32));
                }
                if velocity > 127 {
                    return Err(invalid("velocity", velocity as u32));
                }
            }
            MidiMessage::ProgramChange { program } if program > 127 => {
                return Err(invalid("program", program as u32));
            }
            _ => {}
        }
    }
    Ok(())
}

fn reconstruct_strict(track: usize, events: &[RawEvent]) -> Result<Vec<Note>, NormalizeError> {
    let mut sounding: HashMap<(u8, u8), (u64, u8)> = HashMap::new();
    let mut notes = Vec::new();
    let mut previous = 0;

    for event in events {
        if event.tick < previous {
            return Err(NormalizeError::NonMonotonic {
                track,
                tick: event.tick,
                previous,
            });
        }
        previous = event.tick;

        match event.message {
            MidiMessage::NoteOn { pitch, velocity } => {
                let key = (event.channel, pitch);
                if sounding.contains_key(&key) {
                    return Err(NormalizeError::OverlappingNote {
                        track,
                        channel: event.channel,
                        pitch,
                        tick: event.tick,
                    });
                }
                sounding.insert(key, (event.tick, velocity));
            }
            MidiMessage::NoteOff { pitch, .. } => {
                if let Some((start, velocity)) = sounding.remove(&(event.channel, pitch)) {
                    notes.push(Note {
                        pitch,
                        velocity,
                        channel: event.channel,
                        start,
                        end: event.tick,
                    });
                }
            }
            _ => {}
        }
    }

    close_dangling(sounding, previous, &mut notes);
    Ok(notes)
}

/// Never fails: a restarted note closes the sounding one, stray note-offs
/// are dropped.
fn reconstruct_permissive(events: &[RawEvent]) -> Vec<Note> {
    let mut sounding: HashMap<(u8, u8), (u64, u8)> = HashMap::new();
    let mut notes = Vec::new();
    let mut last_tick = 0;

    for event in events {
        last_tick = last_tick.max(event.tick);
        match event.message {
            MidiMessage::NoteOn { pitch, velocity } => {
                if let Some((start, vel)) =
                    sounding.insert((event.channel, pitch), (event.tick, velocity))
                {
                    notes.push(Note {
                        pitch,
                        velocity: vel,
                        channel: event.channel,
                        start,
                        end: event.tick,
                    });
                }
            }
            MidiMessage::NoteOff { pitch, .. } => {
                if let Some((start, velocity)) = sounding.remove(&(event.channel, pitch)) {
                    notes.push(Note {
                        pitch,
                        velocity,
                        channel: event.channel,
                        start,
                        end: event.tick,
                    });
                }
            }
            _ => {}
        }
    }

    close_dangling(sounding, last_tick, &mut notes);
    notes
}

fn close_dangling(sounding: HashMap<(u8, u8), (u64, u8)>, end: u64, notes: &mut Vec<Note>) {
    notes.extend(
        sounding
            .into_iter()
            .map(|((channel, pitch), (start, velocity))| Note {
                pitch,
                velocity,
                channel,
                start,
                end,
            }),
    );
    notes.sort_by_key(|n| (n.start, n.pitch, n.channel, n.end));
}

fn track_info(
    index: usize,
    source_index: usize,
    events: &[RawEvent],
    notes: &[Note],
    tempo: &TempoMap,
) -> TrackInfo {
    let name = events
        .iter()
        .find_map(|e| match &e.message {
            MidiMessage::TrackName(text) => {
                let cleaned = text.replace('\0', "");
                let cleaned = cleaned.trim();
                (!cleaned.is_empty()).then(|| cleaned.to_string())
            }
            _ => None,
        })
        .unwrap_or_else(|| UNTITLED_TRACK.to_string());

    let mut program_changes: Vec<String> = Vec::new();
    for event in events {
        if let MidiMessage::ProgramChange { program } = event.message {
            let text = format!("channel {}, {}", event.channel, gm_program_name(program));
            if !program_changes.contains(&text) {
                program_changes.push(text);
            }
        }
    }

    let duration_ticks = notes.iter().map(|n| n.end).max().unwrap_or(0);

    TrackInfo {
        index,
        source_index,
        is_program_controlled: is_program_track_name(&name),
        name,
        note_count: notes.len(),
        highest_note: notes.iter().map(|n| n.pitch).max().unwrap_or(0),
        lowest_note: notes.iter().map(|n| n.pitch).min().unwrap_or(0),
        duration_ticks,
        duration: tempo.duration_at(duration_ticks),
        program_changes,
    }
}
