#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bardcast::error::LoadError;
use bardcast::midi::{MidiFile, parse_midi};
use bardcast::perform::{KeyInjector, KeyOffsets};
use bardcast::{
    Config, FileSource, OfflineHost, PlaylistEntry, SessionContext, SessionHandle, SessionUpdate,
    SongCache, spawn_session,
};
use bardcast::ensemble::ClientIdentity;
use midly::num::{u4, u7, u15, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use parking_lot::Mutex;

/// Encodes a one-track file at 480 ticks per quarter (default tempo, so
/// 480 ticks last 500 ms). Each note is `(start, length, pitch)`.
pub fn smf_bytes(notes: &[(u32, u32, u8)]) -> Vec<u8> {
    let mut edges: Vec<(u32, bool, u8)> = Vec::new();
    for &(start, len, pitch) in notes {
        edges.push((start, true, pitch));
        edges.push((start + len, false, pitch));
    }
    edges.sort_by_key(|&(tick, on, pitch)| (tick, on, pitch));

    let mut track = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Lead")),
    }];
    let mut last = 0;
    for (tick, on, pitch) in edges {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(100),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
        last = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(480))));
    smf.tracks.push(track);
    let mut buf = Vec::new();
    smf.write_std(&mut buf).unwrap();
    buf
}

pub fn short_song(pitch: u8) -> MidiFile {
    parse_midi(&smf_bytes(&[(0, 48, pitch), (48, 48, pitch + 2)])).unwrap()
}

/// Serves songs from memory. Paths without a file behave as missing.
#[derive(Default)]
pub struct MemorySource {
    pub files: HashMap<PathBuf, MidiFile>,
    pub entries: Mutex<Vec<PlaylistEntry>>,
    pub loads: AtomicUsize,
    pub load_delay: Duration,
}

impl MemorySource {
    pub fn with_songs(songs: Vec<(&str, Option<MidiFile>)>) -> Self {
        let mut files = HashMap::new();
        let mut entries = Vec::new();
        for (name, file) in songs {
            let path = PathBuf::from(format!("{name}.mid"));
            if let Some(file) = file {
                files.insert(path.clone(), file);
            }
            entries.push(PlaylistEntry::from_path(path));
        }
        Self {
            files,
            entries: Mutex::new(entries),
            loads: AtomicUsize::new(0),
            load_delay: Duration::ZERO,
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl FileSource for MemorySource {
    fn load_midi_file(&self, entry: &PlaylistEntry) -> Result<MidiFile, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        self.files
            .get(&entry.path)
            .cloned()
            .ok_or_else(|| LoadError::MissingFile(entry.path.clone()))
    }

    fn playlist(&self) -> Result<Vec<PlaylistEntry>, LoadError> {
        Ok(self.entries.lock().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Press(u8),
    Release(u8),
}

#[derive(Clone, Default)]
pub struct SharedRecorder(pub Arc<Mutex<Vec<Key>>>);

impl SharedRecorder {
    pub fn keys(&self) -> Vec<Key> {
        self.0.lock().clone()
    }
}

impl KeyInjector for SharedRecorder {
    fn press_key(&mut self, key: u8, _offsets: &mut KeyOffsets) -> bool {
        self.0.lock().push(Key::Press(key));
        true
    }

    fn release_key(&mut self, key: u8) -> bool {
        self.0.lock().push(Key::Release(key));
        true
    }

    fn switch_guitar_tone(&mut self, _tone: u8) {}
}

pub struct Harness {
    pub handle: SessionHandle,
    pub source: Arc<MemorySource>,
    pub keys: SharedRecorder,
    pub cache: Arc<SongCache>,
    pub config: Arc<ArcSwap<Config>>,
    pub identity: ClientIdentity,
}

pub fn start(source: MemorySource, config: Config) -> Harness {
    let source = Arc::new(source);
    let keys = SharedRecorder::default();
    let cache = Arc::new(SongCache::new());
    let config = Arc::new(ArcSwap::from_pointee(config));
    let identity = ClientIdentity::new();
    let handle = spawn_session(SessionContext {
        config: config.clone(),
        config_path: None,
        source: source.clone(),
        injector: Box::new(keys.clone()),
        host: Arc::new(OfflineHost::default()),
        cache: cache.clone(),
        identity: identity.clone(),
    });
    Harness {
        handle,
        source,
        keys,
        cache,
        config,
        identity,
    }
}

impl Harness {
    /// Waits for the first update matching `pred`, failing after `timeout`.
    pub fn expect(
        &self,
        timeout: Duration,
        mut pred: impl FnMut(&SessionUpdate) -> bool,
    ) -> SessionUpdate {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.handle.update_rx.recv_timeout(left) {
                Ok(update) if pred(&update) => return update,
                Ok(_) => continue,
                Err(e) => panic!("no matching update: {e}"),
            }
        }
    }

    /// True if no update matching `pred` arrives within `window`.
    pub fn quiet(&self, window: Duration, mut pred: impl FnMut(&SessionUpdate) -> bool) -> bool {
        let deadline = Instant::now() + window;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.handle.update_rx.recv_timeout(left) {
                Ok(update) if pred(&update) => return false,
                Ok(_) => continue,
                Err(_) => return true,
            }
        }
    }
}
