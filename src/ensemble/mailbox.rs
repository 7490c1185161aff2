//! Single-slot mailboxes carrying ensemble messages.
//!
//! A mailbox holds one 8-byte message plus a signal. Writing a new message
//! before the reader acknowledged the previous one overwrites it.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::{Condvar, Mutex};

use super::message::{MESSAGE_SIZE, bytes_to_words, words_to_bytes};
use crate::error::MailboxError;

pub trait Mailbox: Send + Sync {
    /// Blocks until a message is signalled or the mailbox is closed.
    fn wait(&self) -> Result<(), MailboxError>;

    fn read(&self) -> Result<[i32; 2], MailboxError>;

    /// Zeroes the message buffer. Senders treat an empty buffer as an
    /// acknowledgement.
    fn clear(&self) -> Result<(), MailboxError>;

    /// Lowers the signal so the next [`Mailbox::wait`] blocks again.
    fn reset(&self) -> Result<(), MailboxError>;

    fn send(&self, words: [i32; 2]) -> Result<(), MailboxError>;

    /// Wakes any waiter with [`MailboxError::Closed`].
    fn close(&self);

    /// Polls until the reader clears the buffer. Returns `false` on timeout.
    fn wait_for_ack(&self, timeout: Duration) -> Result<bool, MailboxError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.read()?[0] == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Slot {
    buffer: [u8; MESSAGE_SIZE],
    signalled: bool,
    closed: bool,
}

/// In-process mailbox. Useful for a coordinator and its clients running in
/// the same process, and for tests.
#[derive(Debug, Default)]
pub struct LocalMailbox {
    slot: Mutex<Slot>,
    signal: Condvar,
}

impl LocalMailbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mailbox for LocalMailbox {
    fn wait(&self) -> Result<(), MailboxError> {
        let mut slot = self.slot.lock();
        while !slot.signalled && !slot.closed {
            self.signal.wait(&mut slot);
        }
        if slot.closed {
            return Err(MailboxError::Closed);
        }
        Ok(())
    }

    fn read(&self) -> Result<[i32; 2], MailboxError> {
        let slot = self.slot.lock();
        Ok(bytes_to_words(&slot.buffer)?)
    }

    fn clear(&self) -> Result<(), MailboxError> {
        self.slot.lock().buffer = [0; MESSAGE_SIZE];
        Ok(())
    }

    fn reset(&self) -> Result<(), MailboxError> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(MailboxError::Closed);
        }
        slot.signalled = false;
        Ok(())
    }

    fn send(&self, words: [i32; 2]) -> Result<(), MailboxError> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Err(MailboxError::Closed);
        }
        slot.buffer = words_to_bytes(words);
        slot.signalled = true;
        self.signal.notify_all();
        Ok(())
    }

    fn close(&self) {
        self.slot.lock().closed = true;
        self.signal.notify_all();
    }
}

/// Layout: `[kind: i32][payload: i32][signal: u32]`, native endian.
pub const MAPPED_SIZE: usize = MESSAGE_SIZE + 4;

/// Cross-process mailbox backed by a shared memory-mapped file. Every
/// process opening the same path sees the same slot.
pub struct MappedMailbox {
    map: Mutex<MmapMut>,
    closed: AtomicBool,
}

impl MappedMailbox {
    pub fn open(path: &Path) -> Result<Self, MailboxError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if (file.metadata()?.len() as usize) < MAPPED_SIZE {
            file.set_len(MAPPED_SIZE as u64)?;
        }

        // Safety: the mapping is only accessed through the mutex below;
        // other processes only ever touch these 12 bytes.
        let map = unsafe { MmapOptions::new().len(MAPPED_SIZE).map_mut(&file)? };
        if map.len() < MAPPED_SIZE {
            return Err(MailboxError::TooSmall(map.len()));
        }

        Ok(Self {
            map: Mutex::new(map),
            closed: AtomicBool::new(false),
        })
    }

    fn signalled(&self) -> bool {
        let map = self.map.lock();
        map[MESSAGE_SIZE..MAPPED_SIZE] != [0; 4]
    }

    fn set_signal(&self, value: u32) {
        self.map.lock()[MESSAGE_SIZE..MAPPED_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    fn check_open(&self) -> Result<(), MailboxError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MailboxError::Closed);
        }
        Ok(())
    }
}

impl Mailbox for MappedMailbox {
    fn wait(&self) -> Result<(), MailboxError> {
        loop {
            self.check_open()?;
            if self.signalled() {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn read(&self) -> Result<[i32; 2], MailboxError> {
        let map = self.map.lock();
        Ok(bytes_to_words(&map[..MESSAGE_SIZE])?)
    }

    fn clear(&self) -> Result<(), MailboxError> {
        self.map.lock()[..MESSAGE_SIZE].fill(0);
        Ok(())
    }

    fn reset(&self) -> Result<(), MailboxError> {
        self.check_open()?;
        self.set_signal(0);
        Ok(())
    }

    fn send(&self, words: [i32; 2]) -> Result<(), MailboxError> {
        self.check_open()?;
        {
            let mut map = self.map.lock();
            map[..MESSAGE_SIZE].copy_from_slice(&words_to_bytes(words));
        }
        self.set_signal(1);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn local_wait_wakes_on_send() {
        let mailbox = Arc::new(LocalMailbox::new());
        let reader = mailbox.clone();
        let handle = thread::spawn(move || {
            reader.wait().unwrap();
            reader.read().unwrap()
        });
        mailbox.send([5, 0]).unwrap();
        assert_eq!(handle.join().unwrap(), [5, 0]);
    }

    #[test]
    fn unacknowledged_message_is_overwritten() {
        let mailbox = LocalMailbox::new();
        mailbox.send([1, 1]).unwrap();
        mailbox.send([1, 2]).unwrap();
        assert_eq!(mailbox.read().unwrap(), [1, 2]);
        assert!(!mailbox.wait_for_ack(Duration::from_millis(20)).unwrap());
        mailbox.clear().unwrap();
        assert!(mailbox.wait_for_ack(Duration::ZERO).unwrap());
    }

    #[test]
    fn close_wakes_a_blocked_waiter() {
        let mailbox = Arc::new(LocalMailbox::new());
        let reader = mailbox.clone();
        let handle = thread::spawn(move || reader.wait());
        thread::sleep(Duration::from_millis(20));
        mailbox.close();
        assert!(matches!(handle.join().unwrap(), Err(MailboxError::Closed)));
        assert!(matches!(mailbox.send([1, 0]), Err(MailboxError::Closed)));
    }

    #[test]
    fn mapped_mailboxes_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.mbx");
        let writer = MappedMailbox::open(&path).unwrap();
        let reader = MappedMailbox::open(&path).unwrap();

        assert_eq!(reader.read().unwrap(), [0, 0]);
        writer.send([1, 7]).unwrap();
        reader.wait().unwrap();
        assert_eq!(reader.read().unwrap(), [1, 7]);

        reader.clear().unwrap();
        reader.reset().unwrap();
        assert!(writer.wait_for_ack(Duration::ZERO).unwrap());
        assert!(!reader.signalled());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MAPPED_SIZE as u64);
    }

    #[test]
    fn mapped_close_ends_the_poll_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Arc::new(MappedMailbox::open(&dir.path().join("m")).unwrap());
        let reader = mailbox.clone();
        let handle = thread::spawn(move || reader.wait());
        thread::sleep(Duration::from_millis(30));
        mailbox.close();
        assert!(matches!(handle.join().unwrap(), Err(MailboxError::Closed)));
    }
}
