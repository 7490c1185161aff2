mod continuation;
mod normalizer;
mod scheduler;
mod tempo;

pub use continuation::{
    ContinuationAction, GapWaiter, PlayMode, WaitOutcome, WaitWindow, next_action,
};
pub use normalizer::{
    NormalizedTrack, Note, TrackInfo, UNTITLED_TRACK, is_program_track_name, normalize,
};
pub use scheduler::schedule;
pub use tempo::{
    DEFAULT_MICROS_PER_QUARTER, DEFAULT_TICKS_PER_QUARTER, Division, TempoChange, TempoMap,
};
