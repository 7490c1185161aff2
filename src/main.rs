use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bardcast::ensemble::{ClientIdentity, MappedMailbox, Receiver, bind_session};
use bardcast::perform::{BASE_OFFSET, KeyInjector, KeyOffsets, note_name};
use bardcast::{
    Config, DiskSource, OfflineHost, PlaylistEntry, SessionCommand, SessionContext,
    SessionUpdate, SongCache, spawn_session,
};
use crossbeam::channel::RecvTimeoutError;
use tracing::{error, info};

const USAGE: &str =
    "usage: bardcast [--config <file.ron>] [--mailbox <file> --member <n>] <song.mid>...";

/// Logs keys instead of sending them to a game client.
struct KeyLogger;

impl KeyInjector for KeyLogger {
    fn press_key(&mut self, key: u8, _offsets: &mut KeyOffsets) -> bool {
        info!("press   {:>2} ({})", key, note_name(key + BASE_OFFSET as u8));
        true
    }

    fn release_key(&mut self, key: u8) -> bool {
        info!("release {:>2}", key);
        true
    }

    fn switch_guitar_tone(&mut self, tone: u8) {
        info!("guitar tone -> {tone}");
    }
}

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    mailbox: Option<PathBuf>,
    member: Option<i32>,
    songs: Vec<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next()?.into()),
            "--mailbox" => args.mailbox = Some(iter.next()?.into()),
            "--member" => args.member = Some(iter.next()?.parse().ok()?),
            "-h" | "--help" => return None,
            _ => args.songs.push(arg.into()),
        }
    }
    (!args.songs.is_empty()).then_some(args)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let Some(args) = parse_args() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let config = match &args.config {
        Some(path) if path.exists() => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        _ => Config::default(),
    };
    let config = Arc::new(ArcSwap::from_pointee(config));
    let gap = config.load().gap_between_tracks();

    let identity = ClientIdentity::new();
    if let Some(member) = args.member {
        identity.set(member);
    }

    let entries = args.songs.into_iter().map(PlaylistEntry::from_path).collect();
    let handle = spawn_session(SessionContext {
        config: config.clone(),
        config_path: args.config,
        source: Arc::new(DiskSource::Fixed(entries)),
        injector: Box::new(KeyLogger),
        host: Arc::new(OfflineHost::default()),
        cache: Arc::new(SongCache::new()),
        identity: identity.clone(),
    });

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::unbounded();
    if let Some(path) = &args.mailbox {
        match MappedMailbox::open(path) {
            Ok(mailbox) => {
                let mut receiver = Receiver::new(Arc::new(mailbox), identity, config)
                    .with_shutdown_notifier(shutdown_tx);
                bind_session(&mut receiver, &handle.command_tx);
                receiver.spawn();
                info!("Listening for ensemble messages on {}", path.display());
            }
            Err(e) => {
                error!("Failed to open mailbox {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    handle.send(SessionCommand::Play);

    let mut playing = false;
    let mut finished = false;
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }
        match handle.update_rx.recv_timeout(gap + Duration::from_secs(1)) {
            Ok(SessionUpdate::SongLoaded { name, tracks, .. }) => {
                info!("Now playing '{name}'");
                for track in &tracks {
                    info!(
                        "  [{}] {} ({} notes, {:.1}s)",
                        track.index,
                        track.name,
                        track.note_count,
                        track.duration.as_secs_f32()
                    );
                }
                finished = false;
            }
            Ok(SessionUpdate::PlaybackState { playing: now }) => playing = now,
            Ok(SessionUpdate::Finished { reason }) => {
                info!("Finished: {reason:?}");
                finished = true;
            }
            Ok(SessionUpdate::SongMissing { name, .. }) => {
                error!("'{name}' is missing");
                handle.send(SessionCommand::Play);
            }
            Ok(SessionUpdate::Error { message }) => {
                error!("{message}");
                finished = true;
            }
            Ok(SessionUpdate::PlaylistChanged { len }) if len == 0 => break,
            Ok(SessionUpdate::PlaylistChanged { .. }) => {}
            Err(RecvTimeoutError::Timeout) => {
                if args.mailbox.is_none() && finished && !playing && !handle.is_waiting() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.send(SessionCommand::Shutdown);
    ExitCode::SUCCESS
}
