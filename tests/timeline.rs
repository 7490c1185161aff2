use std::sync::Arc;
use std::time::Duration;

use bardcast::events::MidiMessage as Message;
use bardcast::midi::parse_midi;
use bardcast::perform::{KeyInjector, KeyOffsets};
use bardcast::{Config, Playback, PreparedSong};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind,
    }
}

fn midi(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
    ev(
        delta,
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        },
    )
}

fn on(delta: u32, key: u8) -> TrackEvent<'static> {
    midi(
        delta,
        0,
        MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(90),
        },
    )
}

fn off(delta: u32, key: u8) -> TrackEvent<'static> {
    midi(
        delta,
        0,
        MidiMessage::NoteOff {
            key: u7::new(key),
            vel: u7::new(0),
        },
    )
}

fn end() -> TrackEvent<'static> {
    ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
}

/// Conductor track with a tempo change at beat 1, plus two melodic tracks
/// that strike a chord together at tick 0.
fn duet() -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
    smf.tracks.push(vec![
        ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
        ev(480, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))),
        end(),
    ]);
    smf.tracks.push(vec![
        ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Upper"))),
        on(0, 67),
        off(480, 67),
        on(0, 72),
        off(480, 72),
        end(),
    ]);
    smf.tracks.push(vec![
        ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Lower"))),
        midi(0, 0, MidiMessage::ProgramChange { program: u7::new(29) }),
        on(0, 60),
        off(240, 60),
        end(),
    ]);
    let mut buf = Vec::new();
    smf.write_std(&mut buf).unwrap();
    buf
}

#[derive(Default)]
struct Keys(Vec<(bool, u8)>);

impl KeyInjector for Keys {
    fn press_key(&mut self, key: u8, _offsets: &mut KeyOffsets) -> bool {
        self.0.push((true, key));
        true
    }

    fn release_key(&mut self, key: u8) -> bool {
        self.0.push((false, key));
        true
    }

    fn switch_guitar_tone(&mut self, _tone: u8) {}
}

#[test]
fn tracks_are_renumbered_and_described() {
    let file = parse_midi(&duet()).unwrap();
    let song = PreparedSong::prepare("duet", &file).unwrap();

    // the conductor track has no notes and is dropped
    let names: Vec<&str> = song.tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Upper", "Lower"]);
    assert_eq!(song.tracks[0].index, 0);
    assert_eq!(song.tracks[0].source_index, 1);
    assert_eq!(song.tracks[0].note_count, 2);
    assert_eq!(song.tracks[0].lowest_note, 67);
    assert_eq!(song.tracks[0].highest_note, 72);
    // 500 ms for the first beat, then 1 s per beat
    assert_eq!(song.tracks[0].duration, Duration::from_millis(1500));
    assert_eq!(song.duration(), Duration::from_millis(1500));
}

#[test]
fn simultaneous_events_play_program_first_then_low_to_high() {
    let file = parse_midi(&duet()).unwrap();
    let song = PreparedSong::prepare("duet", &file).unwrap();

    let at_zero: Vec<&Message> = song
        .timeline
        .iter()
        .filter(|e| e.tick == 0)
        .map(|e| &e.message)
        .filter(|m| !matches!(m, Message::TrackName(_) | Message::Tempo(_) | Message::Other))
        .collect();
    assert_eq!(
        at_zero,
        [
            &Message::ProgramChange { program: 29 },
            &Message::NoteOn { pitch: 60, velocity: 90 },
            &Message::NoteOn { pitch: 67, velocity: 90 },
        ]
    );
}

#[test]
fn playback_follows_the_tempo_map() {
    let file = parse_midi(&duet()).unwrap();
    let song = Arc::new(PreparedSong::prepare("duet", &file).unwrap());
    let mut keys = Keys::default();
    let mut playback = Playback::new(song, &Config::default(), None);
    playback.play();

    playback.advance(Duration::ZERO, &mut keys);
    // chord collapses onto the monophonic instrument: the higher note wins
    assert_eq!(keys.0, [(true, 12), (true, 19)]);

    keys.0.clear();
    playback.advance(Duration::from_millis(600), &mut keys);
    // 60 ends at 250 ms but is no longer held; 67 -> 72 at 500 ms
    assert_eq!(keys.0, [(false, 19), (true, 24)]);

    keys.0.clear();
    playback.advance(Duration::from_millis(800), &mut keys);
    assert!(keys.0.is_empty());
    assert!(playback.advance(Duration::from_millis(200), &mut keys).is_some());
    assert_eq!(keys.0, [(false, 24)]);
}

#[test]
fn cached_loads_share_one_timeline() {
    use bardcast::{DiskSource, FileSource, PlaylistEntry, SongCache, prepare_song};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duet.mid");
    std::fs::write(&path, duet()).unwrap();
    let source = DiskSource::Fixed(vec![PlaylistEntry::from_path(&path)]);
    let entry = source.playlist().unwrap().remove(0);
    let cache = SongCache::new();
    let config = Config::default();

    let first = prepare_song(&source, &cache, &entry, &config).unwrap();
    std::fs::remove_file(&path).unwrap();
    // served from the cache even though the file is gone now
    let second = prepare_song(&source, &cache, &entry, &config).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let a = Playback::new(first, &config, None);
    let b = Playback::new(second, &config, None);
    assert_eq!(a.song().timeline, b.song().timeline);
    assert_eq!(a.channel_programs(), [0; 16]);
}
