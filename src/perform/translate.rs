use crate::config::Config;

/// MIDI pitch that lands on key 0 (C3 in the instrument's register).
pub const BASE_OFFSET: i32 = 48;
/// Highest playable key; the range is `0..=MAX_KEY`.
pub const MAX_KEY: i32 = 36;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateSettings {
    pub transpose_global: i32,
    pub enable_transpose_per_track: bool,
    pub transpose_per_track: Vec<i32>,
    pub adapt_out_of_range: bool,
    /// External sync mode: transposition belongs to the controller.
    pub override_active: bool,
}

impl TranslateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transpose_global: config.transpose_global,
            enable_transpose_per_track: config.enable_transpose_per_track,
            transpose_per_track: config.transpose_per_track.clone(),
            adapt_out_of_range: config.adapt_notes_out_of_range,
            override_active: config.use_override,
        }
    }

    fn offset_for(&self, track: Option<usize>) -> i32 {
        if self.override_active {
            return 0;
        }
        let per_track = match track {
            Some(index) if self.enable_transpose_per_track => {
                self.transpose_per_track.get(index).copied().unwrap_or(0)
            }
            _ => 0,
        };
        self.transpose_global + per_track
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translated {
    pub index: i32,
    /// Octaves added by out-of-range adaptation (negative when folded down).
    pub octave_shift: i32,
}

impl Translated {
    pub fn is_playable(&self) -> bool {
        (0..=MAX_KEY).contains(&self.index)
    }

    pub fn key(&self) -> Option<u8> {
        self.is_playable().then_some(self.index as u8)
    }
}

/// Folds an out-of-range key back into `0..=MAX_KEY`, keeping its pitch
/// class. Low notes land in the bottom octave (0..=11), high notes in the
/// top octave (25..=36).
pub fn fold_into_range(key: i32) -> i32 {
    if key < 0 {
        (key + 1) % 12 + 11
    } else if key > MAX_KEY {
        (key - 1) % 12 + 25
    } else {
        key
    }
}

pub fn translate(pitch: u8, track: Option<usize>, settings: &TranslateSettings) -> Translated {
    let key = pitch as i32 - BASE_OFFSET + settings.offset_for(track);
    if !settings.adapt_out_of_range {
        return Translated {
            index: key,
            octave_shift: 0,
        };
    }
    let folded = fold_into_range(key);
    Translated {
        index: folded,
        octave_shift: (folded - key) / 12,
    }
}
