use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, LoadError};
use crate::midi::{MidiFile, load_midi_file};
use crate::perform::Instrument;

/// Which ensemble member plays which track, and on what instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackAssignment {
    pub track: usize,
    pub member: i32,
    pub instrument: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub assignments: Vec<TrackAssignment>,
}

impl PlaylistEntry {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            display_name,
            assignments: Vec::new(),
        }
    }

    /// Name used for logging and as the song cache key.
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            self.path.to_str().unwrap_or_default()
        } else {
            &self.display_name
        }
    }

    /// The instrument assigned to `member`, if any. Unknown instrument names
    /// are logged and treated as unassigned.
    pub fn instrument_for(&self, member: i32) -> Option<Instrument> {
        let assignment = self.assignments.iter().find(|a| a.member == member)?;
        match Instrument::from_name(&assignment.instrument) {
            Ok(instrument) => instrument,
            Err(e) => {
                warn!("{}: {e}", self.name());
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
    current: Option<usize>,
}

impl Playlist {
    pub fn new(entries: Vec<PlaylistEntry>) -> Self {
        Self {
            entries,
            current: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    /// Current index of the entry for `path`, preferring `hint` when it
    /// still holds that entry.
    pub fn locate(&self, hint: usize, path: &Path) -> Option<usize> {
        if self.entries.get(hint).is_some_and(|e| e.path == path) {
            return Some(hint);
        }
        self.entries.iter().position(|e| e.path == path)
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        self.current.and_then(|i| self.entries.get(i))
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.entries.len() {
            self.current = Some(index);
        }
    }

    /// Drops an entry, keeping `current` pointing at the same song.
    pub fn remove(&mut self, index: usize) -> Option<PlaylistEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        self.current = match self.current {
            Some(c) if c == index => None,
            Some(c) if c > index => Some(c - 1),
            other => other,
        };
        info!("removed missing song '{}' from playlist", removed.name());
        Some(removed)
    }

    /// Swaps in a freshly read entry list. The current song survives if its
    /// path is still listed.
    pub fn replace(&mut self, entries: Vec<PlaylistEntry>) {
        let current_path = self.current_entry().map(|e| e.path.clone());
        self.current = current_path.and_then(|p| entries.iter().position(|e| e.path == p));
        self.entries = entries;
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ron_string =
            ron::ser::to_string_pretty(&self.entries, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        let entries: Vec<PlaylistEntry> = ron::from_str(&ron_string)?;
        Ok(Self::new(entries))
    }
}

/// Where the session gets song bytes and playlist contents from.
pub trait FileSource: Send + Sync {
    fn load_midi_file(&self, entry: &PlaylistEntry) -> Result<MidiFile, LoadError>;

    /// Current playlist contents, re-read on every call.
    fn playlist(&self) -> Result<Vec<PlaylistEntry>, LoadError>;
}

/// Reads songs from disk, with the playlist either fixed or backed by a
/// RON file.
#[derive(Debug, Clone)]
pub enum DiskSource {
    Fixed(Vec<PlaylistEntry>),
    File(PathBuf),
}

impl FileSource for DiskSource {
    fn load_midi_file(&self, entry: &PlaylistEntry) -> Result<MidiFile, LoadError> {
        load_midi_file(&entry.path)
    }

    fn playlist(&self) -> Result<Vec<PlaylistEntry>, LoadError> {
        match self {
            DiskSource::Fixed(entries) => Ok(entries.clone()),
            DiskSource::File(path) => Playlist::load(path)
                .map(|p| p.entries)
                .map_err(|e| match e {
                    ConfigError::Io(e) => LoadError::Io(e),
                    other => LoadError::Parse {
                        song: path.display().to_string(),
                        message: other.to_string(),
                    },
                }),
        }
    }
}
