//! Error types shared across the loading, playback and ensemble layers.
//!
//! Only [`LoadError::Parse`] is fatal for a song load. Everything else is
//! recovered close to where it happens: tempo failures fall back to the
//! default map, missing files prune the playlist, mailbox failures end the
//! receiver loop.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    /// The song could not be normalized, even with the permissive fallback.
    #[error("Failed to parse '{song}': {message}")]
    Parse { song: String, message: String },

    #[error("MIDI file not found or unreadable: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to decode MIDI data: {0}")]
    Midi(String),

    #[error("Playlist index {index} out of range (playlist has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Strict note reconstruction failed; the caller retries in permissive mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("track {track}: event at tick {tick} precedes tick {previous}")]
    NonMonotonic { track: usize, tick: u64, previous: u64 },

    #[error("track {track}: note {pitch} on channel {channel} retriggered at tick {tick}")]
    OverlappingNote {
        track: usize,
        channel: u8,
        pitch: u8,
        tick: u64,
    },

    #[error("track {track}: {field} value {value} out of range")]
    InvalidData {
        track: usize,
        field: &'static str,
        value: u32,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TempoError {
    #[error("ticks per quarter note must be non-zero")]
    ZeroDivision,

    #[error("tempo change at tick {tick} has zero microseconds per quarter")]
    ZeroTempo { tick: u64 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("mailbox closed")]
    Closed,

    #[error("mailbox region is {0} bytes, expected at least 12")]
    TooSmall(usize),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    #[error("unknown ensemble message kind {0}")]
    UnknownKind(i32),

    #[error("ensemble message needs 8 bytes, got {0}")]
    Truncated(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown instrument '{0}'")]
pub struct UnknownInstrument(pub String);

#[derive(Error, Debug)]
pub enum ContinuationError {
    #[error("session is gone, cannot continue playback")]
    SessionClosed,

    #[error("host did not leave ensemble mode within {0:?}")]
    EnsembleTimeout(std::time::Duration),
}
