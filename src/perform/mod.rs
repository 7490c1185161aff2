mod device;
mod instrument;
mod tone;
mod translate;

pub use crate::error::UnknownInstrument;
pub use device::{KeyInjector, KeyOffsets, Performer, TrackFilter, note_name};
pub use instrument::{Instrument, gm_program_name};
pub use tone::{CHANNEL_COUNT, DEFAULT_PROGRAM, ToneMode, ToneState};
pub use translate::{
    BASE_OFFSET, MAX_KEY, TranslateSettings, Translated, fold_into_range, translate,
};

#[cfg(test)]
pub(crate) use device::tests::{Action, Recorder};
