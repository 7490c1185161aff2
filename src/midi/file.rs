//! Standard MIDI file decoding.
//!
//! Produces the raw, per-track timed events the normalizer consumes plus a
//! tempo map. A broken tempo map is not fatal: the default 120 BPM map is
//! substituted and the failure is reported on the result.

use std::path::Path;

use midly::{MetaMessage, MidiMessage as SmfMessage, Smf, Timing, TrackEventKind};
use tracing::warn;

use crate::error::{LoadError, TempoError};
use crate::events::{MidiMessage, RawEvent};
use crate::timing::{Division, TempoChange, TempoMap};

#[derive(Debug, Clone)]
pub struct MidiFile {
    pub tempo_map: TempoMap,
    /// Set when the file's tempo data was unusable and the default map was
    /// substituted.
    pub tempo_fallback: Option<TempoError>,
    pub events: Vec<RawEvent>,
    pub track_count: usize,
}

pub fn load_midi_file(path: &Path) -> Result<MidiFile, LoadError> {
    let data = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::MissingFile(path.to_path_buf()),
        _ => LoadError::Io(e),
    })?;
    parse_midi(&data)
}

pub fn parse_midi(data: &[u8]) -> Result<MidiFile, LoadError> {
    let smf = Smf::parse(data).map_err(|e| LoadError::Midi(e.to_string()))?;

    let division = match smf.header.timing {
        Timing::Metrical(tpq) => Division::Metrical(tpq.as_int()),
        Timing::Timecode(fps, subframes) => Division::Timecode {
            ticks_per_second: fps.as_int() as u32 * subframes as u32,
        },
    };

    let mut events = Vec::new();
    let mut tempo_changes = Vec::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            let (channel, message) = match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    (channel.as_int(), convert_message(message))
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_changes.push(TempoChange {
                        tick,
                        micros_per_quarter: tempo.as_int(),
                    });
                    (0, MidiMessage::Tempo(tempo.as_int()))
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    (0, MidiMessage::TrackName(String::from_utf8_lossy(bytes).into_owned()))
                }
                TrackEventKind::Meta(MetaMessage::Text(bytes)) => {
                    (0, MidiMessage::Text(String::from_utf8_lossy(bytes).into_owned()))
                }
                _ => (0, MidiMessage::Other),
            };
            events.push(RawEvent::new(track_idx, tick, channel, message));
        }
    }

    let (tempo_map, tempo_fallback) = match TempoMap::new(division, tempo_changes) {
        Ok(map) => (map, None),
        Err(e) => {
            warn!("error when getting file tempo map, using default tempo map instead: {e}");
            (TempoMap::default(), Some(e))
        }
    };

    Ok(MidiFile {
        tempo_map,
        tempo_fallback,
        events,
        track_count: smf.tracks.len(),
    })
}

fn convert_message(message: SmfMessage) -> MidiMessage {
    match message {
        SmfMessage::NoteOn { key, vel } if vel.as_int() == 0 => MidiMessage::NoteOff {
            pitch: key.as_int(),
            velocity: 0,
        },
        SmfMessage::NoteOn { key, vel } => MidiMessage::NoteOn {
            pitch: key.as_int(),
            velocity: vel.as_int(),
        },
        SmfMessage::NoteOff { key, vel } => MidiMessage::NoteOff {
            pitch: key.as_int(),
            velocity: vel.as_int(),
        },
        SmfMessage::ProgramChange { program } => MidiMessage::ProgramChange {
            program: program.as_int(),
        },
        _ => MidiMessage::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, TrackEvent};

    fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        ev(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(1),
                message: SmfMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        )
    }

    fn encode(smf: &Smf) -> Vec<u8> {
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    #[test]
    fn decodes_notes_names_and_tempo() {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(96))));
        smf.tracks.push(vec![
            ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);
        smf.tracks.push(vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Lead"))),
            note_on(0, 60, 100),
            note_on(96, 60, 0),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);
        let file = parse_midi(&encode(&smf)).unwrap();

        assert_eq!(file.track_count, 2);
        assert!(file.tempo_fallback.is_none());
        assert_eq!(file.tempo_map.micros_at(96), 1_000_000);
        let track1: Vec<&RawEvent> = file.events.iter().filter(|e| e.track == 1).collect();
        assert_eq!(track1[0].message, MidiMessage::TrackName("Lead".into()));
        assert_eq!(
            track1[1],
            &RawEvent::new(1, 0, 1, MidiMessage::NoteOn { pitch: 60, velocity: 100 })
        );
        // velocity 0 note-on is a release
        assert_eq!(
            track1[2],
            &RawEvent::new(1, 96, 1, MidiMessage::NoteOff { pitch: 60, velocity: 0 })
        );
    }

    #[test]
    fn zero_tempo_falls_back_to_default_map() {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
        smf.tracks.push(vec![
            ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(0)))),
            note_on(0, 64, 90),
            note_on(480, 64, 0),
        ]);
        let file = parse_midi(&encode(&smf)).unwrap();
        assert_eq!(file.tempo_fallback, Some(TempoError::ZeroTempo { tick: 0 }));
        assert_eq!(file.tempo_map, TempoMap::default());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(parse_midi(b"not a midi file"), Err(LoadError::Midi(_))));
    }

    #[test]
    fn missing_path_is_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.mid");
        assert!(matches!(load_midi_file(&path), Err(LoadError::MissingFile(p)) if p == path));
    }
}
