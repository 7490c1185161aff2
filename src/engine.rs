use crate::cache::SongCache;
use crate::config::Config;
use crate::ensemble::ClientIdentity;
use crate::error::{ContinuationError, LoadError};
use crate::perform::{Instrument, KeyInjector};
use crate::playback::{FinishReason, Playback, PreparedSong};
use crate::playlist::{FileSource, Playlist, PlaylistEntry};
use crate::timing::{ContinuationAction, GapWaiter, TrackInfo, WaitOutcome, next_action};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Clock resolution while a song is playing.
pub const CLOCK_INTERVAL: Duration = Duration::from_millis(1);
const IDLE_INTERVAL: Duration = Duration::from_millis(50);
const ENSEMBLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ENSEMBLE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    LoadSong { index: usize, start_playing: bool },
    Play,
    Pause,
    Stop,
    Seek(Duration),
    SetSpeed(f32),
    MoveToStart,
    ReloadPlaylist,
    /// Re-read the config file and reload the current song with it.
    ReloadConfig,
    SwitchInstrument,
    RestartOverride,
    ClosePerformance,
    CancelWaiting,
    SkipWaiting,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    SongLoaded {
        index: usize,
        name: String,
        tracks: Vec<TrackInfo>,
    },
    /// The song's file is gone or unreadable; it was removed from the playlist.
    SongMissing { index: usize, name: String },
    PlaylistChanged { len: usize },
    PlaybackState { playing: bool },
    Finished { reason: FinishReason },
    Error { message: String },
}

/// The game-side collaborator: instrument handling and the ensemble
/// performance window.
pub trait Host: Send + Sync {
    fn ensemble_running(&self) -> bool {
        false
    }

    fn close_performance(&self) {}

    fn current_instrument(&self) -> Option<Instrument>;

    /// Returns `false` if the switch did not happen.
    fn switch_instrument(&self, instrument: Option<Instrument>) -> bool;
}

/// A host with no game attached. Instrument switches always succeed.
#[derive(Debug, Default)]
pub struct OfflineHost {
    instrument: Mutex<Option<Instrument>>,
}

impl OfflineHost {
    pub fn new(instrument: Option<Instrument>) -> Self {
        Self {
            instrument: Mutex::new(instrument),
        }
    }
}

impl Host for OfflineHost {
    fn current_instrument(&self) -> Option<Instrument> {
        *self.instrument.lock()
    }

    fn switch_instrument(&self, instrument: Option<Instrument>) -> bool {
        *self.instrument.lock() = instrument;
        true
    }
}

pub struct SessionContext {
    pub config: Arc<ArcSwap<Config>>,
    /// Where [`SessionCommand::ReloadConfig`] re-reads settings from.
    pub config_path: Option<PathBuf>,
    pub source: Arc<dyn FileSource>,
    pub injector: Box<dyn KeyInjector>,
    pub host: Arc<dyn Host>,
    pub cache: Arc<SongCache>,
    pub identity: ClientIdentity,
}

pub struct SessionHandle {
    pub command_tx: Sender<SessionCommand>,
    pub update_rx: Receiver<SessionUpdate>,
    waiter: GapWaiter,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) {
        let _ = self.command_tx.send(command);
    }

    pub fn is_waiting(&self) -> bool {
        self.waiter.is_waiting()
    }

    /// Progress through the gap before the next song, 1.0 when idle.
    pub fn wait_progress(&self) -> f32 {
        self.waiter.progress()
    }
}

pub fn spawn_session(context: SessionContext) -> SessionHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();
    let (internal_tx, internal_rx) = crossbeam::channel::unbounded();
    let waiter = GapWaiter::new();

    let playlist = match context.source.playlist() {
        Ok(entries) => Playlist::new(entries),
        Err(e) => {
            error!("Failed to read playlist: {e}");
            Playlist::default()
        }
    };

    let state = SessionState {
        config: context.config,
        config_path: context.config_path,
        source: context.source,
        injector: context.injector,
        host: context.host,
        cache: context.cache,
        identity: context.identity,
        playlist,
        playback: None,
        generation: 0,
        last_tick: Instant::now(),
        waiter: waiter.clone(),
        update_tx,
        internal_tx,
    };

    thread::spawn(move || {
        session_thread(state, command_rx, internal_rx);
    });

    SessionHandle {
        command_tx,
        update_rx,
        waiter,
    }
}

/// Results posted back to the session thread by its helper threads.
enum Internal {
    Prepared {
        generation: u64,
        index: usize,
        path: PathBuf,
        result: Result<Arc<PreparedSong>, LoadError>,
        start_playing: bool,
        resume_at: Option<Duration>,
    },
    Continue {
        generation: u64,
        action: ContinuationAction,
    },
}

struct SessionState {
    config: Arc<ArcSwap<Config>>,
    config_path: Option<PathBuf>,
    source: Arc<dyn FileSource>,
    injector: Box<dyn KeyInjector>,
    host: Arc<dyn Host>,
    cache: Arc<SongCache>,
    identity: ClientIdentity,
    playlist: Playlist,
    playback: Option<Playback>,
    /// Bumped on every load; results tagged with an older value are stale.
    generation: u64,
    last_tick: Instant,
    waiter: GapWaiter,
    update_tx: Sender<SessionUpdate>,
    internal_tx: Sender<Internal>,
}

fn session_thread(
    mut state: SessionState,
    command_rx: Receiver<SessionCommand>,
    internal_rx: Receiver<Internal>,
) {
    loop {
        let timeout = if state.is_playing() {
            CLOCK_INTERVAL
        } else {
            IDLE_INTERVAL
        };

        crossbeam::select! {
            recv(command_rx) -> command => match command {
                Ok(SessionCommand::Shutdown) | Err(_) => break,
                Ok(command) => state.handle_command(command),
            },
            recv(internal_rx) -> message => {
                if let Ok(message) = message {
                    state.handle_internal(message);
                }
            },
            default(timeout) => {},
        }

        state.tick();
    }

    state.waiter.cancel();
    if let Some(playback) = state.playback.take() {
        playback.dispose(&mut *state.injector);
    }
    info!("Session stopped");
}

impl SessionState {
    fn is_playing(&self) -> bool {
        self.playback.as_ref().is_some_and(Playback::is_playing)
    }

    fn send_update(&self, update: SessionUpdate) {
        let _ = self.update_tx.send(update);
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;

        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        if let Some(reason) = playback.advance(elapsed, &mut *self.injector) {
            self.on_finished(reason);
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::LoadSong {
                index,
                start_playing,
            } => self.load_song(index, start_playing, None),

            SessionCommand::Play => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.play();
                    self.last_tick = Instant::now();
                    let playing = playback.is_playing();
                    self.send_update(SessionUpdate::PlaybackState { playing });
                } else if !self.playlist.is_empty() {
                    let index = self.playlist.current().unwrap_or(0);
                    self.load_song(index, true, None);
                }
            }

            SessionCommand::Pause => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.pause();
                    self.send_update(SessionUpdate::PlaybackState { playing: false });
                }
            }

            SessionCommand::Stop => self.stop(),

            SessionCommand::Seek(target) => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.seek(target, &mut *self.injector);
                }
            }

            SessionCommand::SetSpeed(speed) => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.set_speed(speed);
                }
            }

            SessionCommand::MoveToStart => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.move_to_start(&mut *self.injector);
                }
            }

            SessionCommand::ReloadPlaylist => self.reload_playlist(),

            SessionCommand::ReloadConfig => {
                self.reload_config();
                self.reload_current();
            }

            SessionCommand::RestartOverride => {
                self.reload_config();
                self.reload_playlist();
                self.reload_current();
            }

            SessionCommand::SwitchInstrument => {
                if let Some(index) = self.playlist.current() {
                    self.switch_instrument_for(index);
                }
                let instrument = self.host.current_instrument();
                if let Some(playback) = self.playback.as_mut() {
                    playback.set_instrument(instrument);
                }
            }

            SessionCommand::ClosePerformance => {
                self.stop();
                self.host.close_performance();
            }

            SessionCommand::CancelWaiting => self.waiter.cancel(),
            SessionCommand::SkipWaiting => self.waiter.skip(),

            // handled by the thread loop
            SessionCommand::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Prepared {
                generation,
                index,
                path,
                result,
                start_playing,
                resume_at,
            } => {
                if generation != self.generation {
                    debug!("Dropping stale load of song {index}");
                    return;
                }
                // the playlist may have been reloaded while the song loaded
                let Some(index) = self.playlist.locate(index, &path) else {
                    debug!("{} left the playlist while loading", path.display());
                    return;
                };
                self.finish_load(index, result, start_playing, resume_at);
            }
            Internal::Continue { generation, action } => {
                if generation != self.generation {
                    debug!("Dropping stale continuation {action:?}");
                    return;
                }
                self.continue_with(action);
            }
        }
    }

    fn stop(&mut self) {
        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        let reason = playback.stop(&mut *self.injector);
        self.send_update(SessionUpdate::PlaybackState { playing: false });
        if let Some(reason) = reason {
            self.on_finished(reason);
        }
    }

    /// Disposes the current playback, then prepares the song off-thread.
    fn load_song(&mut self, index: usize, start_playing: bool, resume_at: Option<Duration>) {
        let Some(entry) = self.playlist.get(index).cloned() else {
            let e = LoadError::IndexOutOfRange {
                index,
                len: self.playlist.len(),
            };
            self.send_update(SessionUpdate::Error {
                message: format!("Failed to load song: {}", e),
            });
            return;
        };

        if let Some(previous) = self.playback.take() {
            previous.dispose(&mut *self.injector);
        }
        self.generation += 1;

        let job = LoadJob {
            generation: self.generation,
            index,
            entry,
            config: self.config.load_full(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            start_playing,
            resume_at,
            internal_tx: self.internal_tx.clone(),
        };
        thread::spawn(move || job.run());
    }

    fn finish_load(
        &mut self,
        index: usize,
        result: Result<Arc<PreparedSong>, LoadError>,
        start_playing: bool,
        resume_at: Option<Duration>,
    ) {
        let song = match result {
            Ok(song) => song,
            Err(e @ (LoadError::MissingFile(_) | LoadError::Midi(_))) => {
                warn!("Song {index} not found: {e}");
                if let Some(entry) = self.playlist.remove(index) {
                    self.send_update(SessionUpdate::SongMissing {
                        index,
                        name: entry.name().to_string(),
                    });
                    self.send_update(SessionUpdate::PlaylistChanged {
                        len: self.playlist.len(),
                    });
                }
                return;
            }
            Err(e) => {
                error!("Failed to load song {index}: {e}");
                self.send_update(SessionUpdate::Error {
                    message: format!("Failed to load song: {}", e),
                });
                return;
            }
        };

        self.playlist.set_current(index);
        let config = self.config.load_full();
        if config.use_override {
            self.switch_instrument_for(index);
        }

        let mut playback = Playback::new(song.clone(), &config, self.host.current_instrument());
        if let Some(position) = resume_at {
            playback.seek(position, &mut *self.injector);
        }
        info!(
            "Loaded '{}' ({} tracks, {:.1}s)",
            song.name,
            song.tracks.len(),
            playback.duration().as_secs_f32()
        );
        self.send_update(SessionUpdate::SongLoaded {
            index,
            name: song.name.clone(),
            tracks: song.tracks.clone(),
        });

        if start_playing {
            playback.play();
            self.last_tick = Instant::now();
            self.send_update(SessionUpdate::PlaybackState { playing: true });
        }
        self.playback = Some(playback);
    }

    fn switch_instrument_for(&mut self, index: usize) {
        let Some(member) = self.identity.get() else {
            return;
        };
        let Some(instrument) = self.playlist.get(index).and_then(|e| e.instrument_for(member))
        else {
            return;
        };
        if self.host.current_instrument() == Some(instrument) {
            return;
        }
        if !self.host.switch_instrument(Some(instrument)) {
            warn!("Could not switch to {instrument}");
        }
    }

    fn reload_playlist(&mut self) {
        match self.source.playlist() {
            Ok(entries) => {
                self.playlist.replace(entries);
                self.send_update(SessionUpdate::PlaylistChanged {
                    len: self.playlist.len(),
                });
            }
            Err(e) => {
                error!("Failed to reload playlist: {e}");
                self.send_update(SessionUpdate::Error {
                    message: format!("Failed to reload playlist: {}", e),
                });
            }
        }
    }

    fn reload_config(&mut self) {
        let Some(path) = self.config_path.as_ref() else {
            return;
        };
        match Config::load(path) {
            Ok(config) => {
                info!("Reloaded settings from {}", path.display());
                self.config.store(Arc::new(config));
            }
            Err(e) => {
                error!("Failed to reload settings: {e}");
                self.send_update(SessionUpdate::Error {
                    message: format!("Failed to reload settings: {}", e),
                });
            }
        }
    }

    /// Reloads the current song with fresh settings, resuming where it was.
    fn reload_current(&mut self) {
        let Some(index) = self.playlist.current() else {
            return;
        };
        let (playing, position) = self
            .playback
            .as_ref()
            .map_or((false, Duration::ZERO), |p| (p.is_playing(), p.position()));
        let resume_at = (position > Duration::ZERO).then_some(position);
        self.load_song(index, playing, resume_at);
    }

    fn on_finished(&mut self, reason: FinishReason) {
        self.send_update(SessionUpdate::Finished { reason });
        self.send_update(SessionUpdate::PlaybackState { playing: false });
        if reason != FinishReason::EndOfTimeline {
            return;
        }

        let job = Continuation {
            config: self.config.load_full(),
            host: self.host.clone(),
            waiter: self.waiter.clone(),
            current: self.playlist.current(),
            len: self.playlist.len(),
            generation: self.generation,
            internal_tx: self.internal_tx.clone(),
        };
        thread::spawn(move || {
            if let Err(e) = job.run() {
                error!("Unexpected error when playback finished: {e}");
            }
        });
    }

    fn continue_with(&mut self, action: ContinuationAction) {
        match action {
            ContinuationAction::Stop => debug!("Play mode ends here"),
            ContinuationAction::Replay => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.move_to_start(&mut *self.injector);
                    playback.play();
                    self.last_tick = Instant::now();
                    self.send_update(SessionUpdate::PlaybackState { playing: true });
                }
            }
            ContinuationAction::Load(index) => self.load_song(index, true, None),
        }
    }
}

struct LoadJob {
    generation: u64,
    index: usize,
    entry: PlaylistEntry,
    config: Arc<Config>,
    source: Arc<dyn FileSource>,
    cache: Arc<SongCache>,
    start_playing: bool,
    resume_at: Option<Duration>,
    internal_tx: Sender<Internal>,
}

impl LoadJob {
    fn run(self) {
        let result = prepare_song(&*self.source, &self.cache, &self.entry, &self.config);
        let _ = self.internal_tx.send(Internal::Prepared {
            generation: self.generation,
            index: self.index,
            path: self.entry.path.clone(),
            result,
            start_playing: self.start_playing,
            resume_at: self.resume_at,
        });
    }
}

/// Loads and prepares a playlist entry, going through the cache when it is
/// enabled.
pub fn prepare_song(
    source: &dyn FileSource,
    cache: &SongCache,
    entry: &PlaylistEntry,
    config: &Config,
) -> Result<Arc<PreparedSong>, LoadError> {
    let name = entry.name();
    if config.use_song_cache {
        if let Some(song) = cache.get(name) {
            info!("[LoadPlayback] -> {name} found in cache");
            return Ok(song);
        }
    }

    let file = source.load_midi_file(entry)?;
    let song = Arc::new(PreparedSong::prepare(name, &file)?);
    if config.use_song_cache {
        cache.add_or_update(name, song.clone());
    }
    Ok(song)
}

/// Runs after a song reached its end: waits out the gap, then asks the
/// session to act on the play mode.
struct Continuation {
    config: Arc<Config>,
    host: Arc<dyn Host>,
    waiter: GapWaiter,
    current: Option<usize>,
    len: usize,
    generation: u64,
    internal_tx: Sender<Internal>,
}

impl Continuation {
    fn run(self) -> Result<(), ContinuationError> {
        if self.config.use_override {
            if self.config.close_on_finish {
                if let Err(e) = self.wait_for_ensemble_end() {
                    warn!("{e}");
                }
                self.host.close_performance();
            }
        } else if self.host.ensemble_running() {
            debug!("Ensemble performance in progress, not continuing");
            return Ok(());
        }

        match self.waiter.wait(self.config.gap_between_tracks()) {
            WaitOutcome::Cancelled => {
                info!("Waiting cancelled, not continuing");
                return Ok(());
            }
            WaitOutcome::Skipped => debug!("Wait skipped"),
            WaitOutcome::Elapsed => {}
        }

        let action = next_action(
            self.config.play_mode,
            self.current,
            self.len,
            &mut rand::thread_rng(),
        );
        debug!("Continuing with {action:?}");
        self.internal_tx
            .send(Internal::Continue {
                generation: self.generation,
                action,
            })
            .map_err(|_| ContinuationError::SessionClosed)
    }

    fn wait_for_ensemble_end(&self) -> Result<(), ContinuationError> {
        let deadline = Instant::now() + ENSEMBLE_WAIT_TIMEOUT;
        while self.host.ensemble_running() {
            if Instant::now() >= deadline {
                return Err(ContinuationError::EnsembleTimeout(ENSEMBLE_WAIT_TIMEOUT));
            }
            thread::sleep(ENSEMBLE_POLL_INTERVAL);
        }
        Ok(())
    }
}
