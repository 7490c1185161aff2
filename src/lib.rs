pub mod cache;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod midi;
pub mod perform;
pub mod playback;
pub mod playlist;
pub mod timing;

pub use cache::SongCache;
pub use config::Config;
pub use engine::{
    Host, OfflineHost, SessionCommand, SessionContext, SessionHandle, SessionUpdate,
    prepare_song, spawn_session,
};
pub use playback::{FinishReason, Playback, PreparedSong, TransportState};
pub use playlist::{DiskSource, FileSource, Playlist, PlaylistEntry, TrackAssignment};
