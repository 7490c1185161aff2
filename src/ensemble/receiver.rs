use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use crossbeam::channel::Sender;
use tracing::{debug, error, info, warn};

use super::mailbox::Mailbox;
use super::message::{EnsembleMessage, MessageKind};
use crate::config::Config;
use crate::error::MailboxError;

/// This client's member index within the ensemble. Unset until the host
/// has loaded it.
#[derive(Debug, Clone)]
pub struct ClientIdentity(Arc<AtomicI32>);

impl Default for ClientIdentity {
    fn default() -> Self {
        Self(Arc::new(AtomicI32::new(-1)))
    }
}

impl ClientIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<i32> {
        let value = self.0.load(Ordering::SeqCst);
        (value >= 0).then_some(value)
    }

    pub fn set(&self, member: i32) {
        self.0.store(member.max(-1), Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(-1, Ordering::SeqCst);
    }
}

pub type Handler = Box<dyn Fn(i32) + Send + Sync>;

/// Client side of the ensemble protocol: waits on the mailbox and
/// dispatches each message to its registered handler.
pub struct Receiver {
    mailbox: Arc<dyn Mailbox>,
    handlers: HashMap<MessageKind, Handler>,
    identity: ClientIdentity,
    config: Arc<ArcSwap<Config>>,
    connected: Arc<AtomicBool>,
    shutdown: Option<Sender<i32>>,
}

impl Receiver {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        identity: ClientIdentity,
        config: Arc<ArcSwap<Config>>,
    ) -> Self {
        Self {
            mailbox,
            handlers: HashMap::new(),
            identity,
            config,
            connected: Arc::new(AtomicBool::new(true)),
            shutdown: None,
        }
    }

    /// Receives this client's member index when a `KillClient` targets it.
    pub fn with_shutdown_notifier(mut self, notifier: Sender<i32>) -> Self {
        self.shutdown = Some(notifier);
        self
    }

    pub fn on(
        &mut self,
        kind: MessageKind,
        handler: impl Fn(i32) + Send + Sync + 'static,
    ) -> &mut Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ends the loop; a blocked wait is woken by closing the mailbox.
    pub fn stop(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.mailbox.close();
    }

    /// Handlers only fire once the identity is known and override is on.
    fn ready(&self) -> bool {
        self.identity.get().is_some() && self.config.load().use_override
    }

    pub fn run(&self) -> Result<(), MailboxError> {
        info!("Started client message event handling.");
        while self.is_connected() {
            debug!("Client waiting for message.");
            if let Err(e) = self.mailbox.wait() {
                if !self.is_connected() {
                    break;
                }
                error!("An error occurred waiting on event signal: {e}");
                self.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }
            if !self.is_connected() {
                break;
            }

            // lower the signal before reading so a send during dispatch is not lost
            if let Err(e) = self.mailbox.reset() {
                if !self.is_connected() {
                    break;
                }
                error!("Could not reset event signal: {e}");
                self.connected.store(false, Ordering::SeqCst);
                return Err(e);
            }

            if self.ready() {
                self.consume();
            } else {
                debug!("Ignoring message: client not ready for ensemble messages.");
            }
        }
        info!("Stopping client message event handler.");
        Ok(())
    }

    pub fn spawn(self) -> JoinHandle<Result<(), MailboxError>> {
        thread::spawn(move || self.run())
    }

    fn consume(&self) {
        let words = match self.mailbox.read() {
            Ok(words) => words,
            Err(e) => {
                error!("Could not read from shared memory: {e}");
                return;
            }
        };
        debug!("Buffer: {} {}", words[0], words[1]);

        match EnsembleMessage::decode(words) {
            Ok(Some(message)) => {
                self.dispatch(message);
                if let Err(e) = self.mailbox.clear() {
                    warn!("Could not acknowledge message: {e}");
                }
            }
            Ok(None) => info!("Buffer has been cleared."),
            Err(e) => warn!("{e}"),
        }
    }

    pub fn dispatch(&self, message: EnsembleMessage) {
        if message.kind == MessageKind::KillClient {
            if self.identity.get() != Some(message.payload) {
                return;
            }
            info!("Client {} asked to exit.", message.payload);
            self.stop();
            if let Some(notifier) = &self.shutdown {
                let _ = notifier.send(message.payload);
            }
        }

        match self.handlers.get(&message.kind) {
            Some(handler) => handler(message.payload),
            None => debug!("No handler registered for {:?}.", message.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::LocalMailbox;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn override_config() -> Arc<ArcSwap<Config>> {
        Arc::new(ArcSwap::from_pointee(Config {
            use_override: true,
            ..Config::default()
        }))
    }

    fn recording(receiver: &mut Receiver) -> Arc<Mutex<Vec<(MessageKind, i32)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let kinds = [
            MessageKind::ChangeSong,
            MessageKind::ReloadPlaylist,
            MessageKind::KillClient,
        ];
        for kind in kinds {
            let seen = seen.clone();
            receiver.on(kind, move |payload| seen.lock().push((kind, payload)));
        }
        seen
    }

    #[test]
    fn identity_starts_unset() {
        let identity = ClientIdentity::new();
        assert_eq!(identity.get(), None);
        identity.set(3);
        assert_eq!(identity.clone().get(), Some(3));
        identity.clear();
        assert_eq!(identity.get(), None);
    }

    #[test]
    fn kill_client_only_targets_this_member() {
        let identity = ClientIdentity::new();
        identity.set(1);
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut receiver = Receiver::new(Arc::new(LocalMailbox::new()), identity, override_config())
            .with_shutdown_notifier(tx);
        let seen = recording(&mut receiver);

        receiver.dispatch(EnsembleMessage::kill_client(2));
        assert!(receiver.is_connected());
        assert!(seen.lock().is_empty());

        receiver.dispatch(EnsembleMessage::kill_client(1));
        assert!(!receiver.is_connected());
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(*seen.lock(), vec![(MessageKind::KillClient, 1)]);
    }

    #[test]
    fn loop_dispatches_acknowledges_and_stops_on_close() {
        let mailbox = Arc::new(LocalMailbox::new());
        let identity = ClientIdentity::new();
        identity.set(0);
        let mut receiver = Receiver::new(mailbox.clone(), identity, override_config());
        let seen = recording(&mut receiver);
        let handle = receiver.spawn();

        mailbox.send(EnsembleMessage::change_song(4).encode()).unwrap();
        assert!(mailbox.wait_for_ack(Duration::from_secs(5)).unwrap());
        // kind 0 and unknown kinds are skipped without ending the loop
        mailbox.send([0, 0]).unwrap();
        thread::sleep(Duration::from_millis(50));
        mailbox.send([42, 0]).unwrap();
        thread::sleep(Duration::from_millis(50));
        mailbox.send([MessageKind::ReloadPlaylist as i32, 0]).unwrap();
        assert!(mailbox.wait_for_ack(Duration::from_secs(5)).unwrap());

        mailbox.close();
        assert!(handle.join().unwrap().is_err());
        let seen = seen.lock();
        assert_eq!(seen[0], (MessageKind::ChangeSong, 4));
        assert_eq!(seen.last(), Some(&(MessageKind::ReloadPlaylist, 0)));
    }

    #[test]
    fn messages_are_ignored_until_ready() {
        let mailbox = Arc::new(LocalMailbox::new());
        let identity = ClientIdentity::new();
        let mut receiver = Receiver::new(mailbox.clone(), identity.clone(), override_config());
        let seen = recording(&mut receiver);
        let handle = receiver.spawn();

        mailbox.send(EnsembleMessage::change_song(1).encode()).unwrap();
        assert!(!mailbox.wait_for_ack(Duration::from_millis(100)).unwrap());
        assert!(seen.lock().is_empty());

        identity.set(0);
        mailbox.send(EnsembleMessage::change_song(2).encode()).unwrap();
        assert!(mailbox.wait_for_ack(Duration::from_secs(5)).unwrap());
        assert_eq!(*seen.lock(), vec![(MessageKind::ChangeSong, 2)]);

        mailbox.close();
        let _ = handle.join().unwrap();
    }
}
