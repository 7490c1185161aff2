//! Ensemble synchronization: a coordinator broadcasts small commands to
//! every client through a single-slot mailbox.

mod mailbox;
mod message;
mod receiver;

pub use mailbox::{LocalMailbox, MAPPED_SIZE, Mailbox, MappedMailbox, POLL_INTERVAL};
pub use message::{EnsembleMessage, MESSAGE_SIZE, MessageKind, bytes_to_words, words_to_bytes};
pub use receiver::{ClientIdentity, Handler, Receiver};

use crossbeam::channel::Sender;
use tracing::warn;

use crate::engine::SessionCommand;

/// Routes ensemble messages into a playback session.
pub fn bind_session(receiver: &mut Receiver, commands: &Sender<SessionCommand>) {
    let forward = |command: SessionCommand| {
        let commands = commands.clone();
        move |_payload: i32| {
            let _ = commands.send(command.clone());
        }
    };

    let tx = commands.clone();
    receiver.on(MessageKind::ChangeSong, move |payload| match usize::try_from(payload) {
        Ok(index) => {
            let _ = tx.send(SessionCommand::LoadSong {
                index,
                start_playing: false,
            });
        }
        Err(_) => warn!("ignoring song change to index {payload}"),
    });
    receiver
        .on(MessageKind::ReloadPlaylist, forward(SessionCommand::ReloadPlaylist))
        .on(
            MessageKind::ReloadPlaylistSettings,
            forward(SessionCommand::ReloadConfig),
        )
        .on(
            MessageKind::SwitchInstruments,
            forward(SessionCommand::SwitchInstrument),
        )
        .on(
            MessageKind::RestartOverride,
            forward(SessionCommand::RestartOverride),
        )
        .on(
            MessageKind::ClosePerformance,
            forward(SessionCommand::ClosePerformance),
        )
        .on(MessageKind::KillClient, forward(SessionCommand::Shutdown));
}
