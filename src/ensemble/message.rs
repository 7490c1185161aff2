use crate::error::MessageError;

/// Bytes occupied by one message in a mailbox: two native-endian `i32`s.
pub const MESSAGE_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageKind {
    /// Payload is the playlist index to load.
    ChangeSong = 1,
    ReloadPlaylist = 2,
    ReloadPlaylistSettings = 3,
    SwitchInstruments = 4,
    RestartOverride = 5,
    ClosePerformance = 6,
    /// Payload is the member index of the client that should exit.
    KillClient = 7,
}

impl TryFrom<i32> for MessageKind {
    type Error = MessageError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageKind::ChangeSong,
            2 => MessageKind::ReloadPlaylist,
            3 => MessageKind::ReloadPlaylistSettings,
            4 => MessageKind::SwitchInstruments,
            5 => MessageKind::RestartOverride,
            6 => MessageKind::ClosePerformance,
            7 => MessageKind::KillClient,
            other => return Err(MessageError::UnknownKind(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsembleMessage {
    pub kind: MessageKind,
    pub payload: i32,
}

impl EnsembleMessage {
    pub fn new(kind: MessageKind, payload: i32) -> Self {
        Self { kind, payload }
    }

    pub fn change_song(index: usize) -> Self {
        Self::new(MessageKind::ChangeSong, index as i32)
    }

    pub fn kill_client(member: i32) -> Self {
        Self::new(MessageKind::KillClient, member)
    }

    /// Kind `0` is an empty (acknowledged) buffer and decodes to `None`.
    pub fn decode(words: [i32; 2]) -> Result<Option<Self>, MessageError> {
        if words[0] == 0 {
            return Ok(None);
        }
        let kind = MessageKind::try_from(words[0])?;
        Ok(Some(Self::new(kind, words[1])))
    }

    pub fn encode(&self) -> [i32; 2] {
        [self.kind as i32, self.payload]
    }
}

pub fn words_to_bytes(words: [i32; 2]) -> [u8; MESSAGE_SIZE] {
    let mut bytes = [0u8; MESSAGE_SIZE];
    bytes[..4].copy_from_slice(&words[0].to_ne_bytes());
    bytes[4..].copy_from_slice(&words[1].to_ne_bytes());
    bytes
}

pub fn bytes_to_words(bytes: &[u8]) -> Result<[i32; 2], MessageError> {
    if bytes.len() < MESSAGE_SIZE {
        return Err(MessageError::Truncated(bytes.len()));
    }
    let mut kind = [0u8; 4];
    let mut payload = [0u8; 4];
    kind.copy_from_slice(&bytes[..4]);
    payload.copy_from_slice(&bytes[4..MESSAGE_SIZE]);
    Ok([i32::from_ne_bytes(kind), i32::from_ne_bytes(payload)])
}
