use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::perform::ToneMode;
use crate::timing::PlayMode;

/// Size of the per-track tables (transpose, tones, enabled flags).
pub const MAX_TRACKS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub play_speed: f32,
    pub transpose_global: i32,
    pub enable_transpose_per_track: bool,
    pub transpose_per_track: Vec<i32>,
    pub adapt_notes_out_of_range: bool,
    pub tone_mode: ToneMode,
    pub tones_per_track: Vec<u8>,
    pub seconds_between_tracks: f32,
    pub play_mode: PlayMode,
    /// Ensemble controller drives song selection and transposition.
    pub use_override: bool,
    pub use_song_cache: bool,
    /// Override mode: close the performance window after a song ends.
    pub close_on_finish: bool,
    pub enabled_tracks: Vec<bool>,
    pub soloed_track: Option<usize>,
    /// Track index -> pitches allowed through on that track.
    pub percussion_notes: HashMap<usize, BTreeSet<u8>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            play_speed: 1.0,
            transpose_global: 0,
            enable_transpose_per_track: false,
            transpose_per_track: vec![0; MAX_TRACKS],
            adapt_notes_out_of_range: true,
            tone_mode: ToneMode::Off,
            tones_per_track: vec![0; MAX_TRACKS],
            seconds_between_tracks: 3.0,
            play_mode: PlayMode::Single,
            use_override: false,
            use_song_cache: true,
            close_on_finish: false,
            enabled_tracks: vec![true; MAX_TRACKS],
            soloed_track: None,
            percussion_notes: HashMap::new(),
        }
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        let config: Config = ron::from_str(&ron_string)?;
        Ok(config)
    }

    pub fn gap_between_tracks(&self) -> Duration {
        Duration::try_from_secs_f32(self.seconds_between_tracks).unwrap_or(Duration::ZERO)
    }

    /// Playback speed clamped to a usable range.
    pub fn speed(&self) -> f32 {
        clamp_speed(self.play_speed).unwrap_or(1.0)
    }
}

pub const MIN_SPEED: f32 = 0.1;
pub const MAX_SPEED: f32 = 10.0;

/// `None` for speeds that are not a usable number.
pub fn clamp_speed(speed: f32) -> Option<f32> {
    speed.is_finite().then(|| speed.clamp(MIN_SPEED, MAX_SPEED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_ron() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bardcast.ron");
        let mut config = Config {
            tone_mode: ToneMode::Simple,
            play_mode: PlayMode::ListRepeat,
            soloed_track: Some(2),
            ..Config::default()
        };
        config.percussion_notes.insert(3, BTreeSet::from([35, 36]));
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.ron");
        fs::write(&path, "(play_mode: Random, transpose_global: -12)").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.play_mode, PlayMode::Random);
        assert_eq!(config.transpose_global, -12);
        assert_eq!(config.enabled_tracks.len(), MAX_TRACKS);
        assert!(config.use_song_cache);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        fs::write(&path, "(play_mode: ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn gap_and_speed_are_sanitized() {
        let config = Config {
            seconds_between_tracks: -1.0,
            play_speed: f32::NAN,
            ..Config::default()
        };
        assert_eq!(config.gap_between_tracks(), Duration::ZERO);
        assert_eq!(config.speed(), 1.0);
    }
}
