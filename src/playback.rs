//! A single song's playback: the ordered timeline, a song clock and the
//! performer that turns due events into key presses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::config::{Config, clamp_speed};
use crate::error::LoadError;
use crate::events::{MidiMessage, ScheduledEvent};
use crate::midi::MidiFile;
use crate::perform::{CHANNEL_COUNT, Instrument, KeyInjector, Performer, gm_program_name};
use crate::timing::{TempoMap, TrackInfo, normalize, schedule};

/// A normalized, scheduled song. Shared read-only between the cache and
/// any number of playbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSong {
    pub name: String,
    pub tempo_map: TempoMap,
    pub tracks: Vec<TrackInfo>,
    pub timeline: Vec<ScheduledEvent>,
}

impl PreparedSong {
    pub fn prepare(name: &str, file: &MidiFile) -> Result<Self, LoadError> {
        info!("[LoadPlayback] -> {name} START");
        let stopwatch = Instant::now();

        let normalized = normalize(&file.events, &file.tempo_map).map_err(|e| {
            error!("[LoadPlayback] still errors? check your file: {e}");
            LoadError::Parse {
                song: name.to_string(),
                message: e.to_string(),
            }
        })?;
        info!(
            "[LoadPlayback] -> {name} normalized {} tracks in {:.1} ms",
            normalized.len(),
            stopwatch.elapsed().as_secs_f64() * 1000.0
        );

        let timeline = schedule(&normalized);
        info!(
            "[LoadPlayback] -> {name} scheduled {} events in {:.1} ms",
            timeline.len(),
            stopwatch.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            name: name.to_string(),
            tempo_map: file.tempo_map.clone(),
            tracks: normalized.into_iter().map(|t| t.info).collect(),
            timeline,
        })
    }

    pub fn duration(&self) -> Duration {
        self.timeline
            .last()
            .map_or(Duration::ZERO, |e| self.tempo_map.duration_at(e.tick))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    EndOfTimeline,
    /// Stopped by the user with held notes interrupted.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

pub struct Playback {
    song: Arc<PreparedSong>,
    /// Song time of each timeline event, in microseconds.
    times: Vec<u64>,
    cursor: usize,
    position: u64,
    state: TransportState,
    speed: f32,
    performer: Performer,
    finished: bool,
}

impl Playback {
    /// Settings are read once here; later config changes need a reload.
    pub fn new(song: Arc<PreparedSong>, config: &Config, instrument: Option<Instrument>) -> Self {
        let times = song
            .timeline
            .iter()
            .map(|e| song.tempo_map.micros_at(e.tick))
            .collect();
        let mut performer = Performer::new(config, &song.tracks, instrument);
        performer.reset();

        debug!("[LoadPlayback] Channels for {}:", song.name);
        for (channel, &program) in performer.tone().programs().iter().enumerate() {
            debug!("  - [{channel}]: {} ({program})", gm_program_name(program));
        }

        Self {
            song,
            times,
            cursor: 0,
            position: 0,
            state: TransportState::Stopped,
            speed: config.speed(),
            performer,
            finished: false,
        }
    }

    pub fn song(&self) -> &Arc<PreparedSong> {
        &self.song
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> Duration {
        Duration::from_micros(self.position)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.times.last().copied().unwrap_or(0))
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn channel_programs(&self) -> [u8; CHANNEL_COUNT] {
        *self.performer.tone().programs()
    }

    pub fn performer(&self) -> &Performer {
        &self.performer
    }

    /// Sets the clock speed, clamped like the configured speed. Zero,
    /// negative and non-finite values are ignored.
    pub fn set_speed(&mut self, speed: f32) {
        if speed > 0.0 {
            if let Some(speed) = clamp_speed(speed) {
                self.speed = speed;
            }
        }
    }

    pub fn set_instrument(&mut self, instrument: Option<Instrument>) {
        self.performer.set_instrument(instrument);
    }

    pub fn play(&mut self) {
        if self.cursor < self.times.len() || self.times.is_empty() {
            self.state = TransportState::Playing;
        }
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Stops and releases the held key. Raises [`FinishReason::Stopped`]
    /// if the song was running and had not finished yet.
    pub fn stop(&mut self, injector: &mut dyn KeyInjector) -> Option<FinishReason> {
        self.performer.release_all(injector);
        let was_running = self.state != TransportState::Stopped;
        self.state = TransportState::Stopped;
        if was_running && !self.finished {
            self.finished = true;
            return Some(FinishReason::Stopped);
        }
        None
    }

    /// Moves the clock to `target` (clamped to the song length). Program
    /// changes before the target are replayed so tone state matches a
    /// straight play-through.
    pub fn seek(&mut self, target: Duration, injector: &mut dyn KeyInjector) {
        self.performer.release_all(injector);
        let target = (target.as_micros() as u64).min(self.duration().as_micros() as u64);
        self.position = target;
        self.cursor = self.times.partition_point(|&t| t < target);
        self.finished = false;

        self.performer.tone_mut().reset();
        for event in &self.song.timeline[..self.cursor] {
            if matches!(event.message, MidiMessage::ProgramChange { .. }) {
                self.performer.send(event, injector);
            }
        }
    }

    pub fn move_to_start(&mut self, injector: &mut dyn KeyInjector) {
        self.seek(Duration::ZERO, injector);
    }

    /// Advances the clock by `elapsed` wall time (scaled by the speed) and
    /// emits every event that became due, in timeline order.
    pub fn advance(
        &mut self,
        elapsed: Duration,
        injector: &mut dyn KeyInjector,
    ) -> Option<FinishReason> {
        if self.state != TransportState::Playing {
            return None;
        }
        // float to int casts saturate
        let scaled = (elapsed.as_micros() as f64 * self.speed as f64) as u64;
        self.position = self.position.saturating_add(scaled);

        while let Some(&time) = self.times.get(self.cursor) {
            if time > self.position {
                break;
            }
            self.performer.send(&self.song.timeline[self.cursor], injector);
            self.cursor += 1;
        }

        if self.cursor >= self.times.len() {
            self.performer.release_all(injector);
            self.position = self.position.min(self.duration().as_micros() as u64);
            self.state = TransportState::Stopped;
            if !self.finished {
                self.finished = true;
                return Some(FinishReason::EndOfTimeline);
            }
        }
        None
    }

    /// Releases anything still held. Call before dropping a playback that
    /// is being replaced.
    pub fn dispose(mut self, injector: &mut dyn KeyInjector) {
        self.performer.release_all(injector);
        self.state = TransportState::Stopped;
    }
}
