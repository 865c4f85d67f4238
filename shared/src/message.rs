//! Application messages sent from server to client inside data datagrams.
//!
//! Every message starts with a big-endian `u16` kind:
//!
//! | kind | message    | body                                  |
//! |------|------------|---------------------------------------|
//! | 0    | `Ack`      | `u32` highest input index seen        |
//! | 1    | `Snapshot` | `u32` snapshot index, encoded [`State`] |

use crate::error::MessageError;
use crate::state::State;

pub const KIND_ACK: u16 = 0;
pub const KIND_SNAPSHOT: u16 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Ack { index: u32 },
    Snapshot { index: u32, state: State },
}

impl Message {
    pub fn kind(&self) -> u16 {
        match self {
            Message::Ack { .. } => KIND_ACK,
            Message::Snapshot { .. } => KIND_SNAPSHOT,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::with_capacity(6);
        bytes.extend_from_slice(&self.kind().to_be_bytes());
        match self {
            Message::Ack { index } => bytes.extend_from_slice(&index.to_be_bytes()),
            Message::Snapshot { index, state } => {
                bytes.extend_from_slice(&index.to_be_bytes());
                bytes.extend_from_slice(&state.encode()?);
            }
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, MessageError> {
        let kind = read_u16(bytes, 0, "message kind")?;
        let index = read_u32(bytes, 2, "message index")?;

        match kind {
            KIND_ACK => Ok(Message::Ack { index }),
            KIND_SNAPSHOT => Ok(Message::Snapshot {
                index,
                state: State::decode(&bytes[6..])?,
            }),
            other => Err(MessageError::UnknownKind(other)),
        }
    }
}

fn read_u16(bytes: &[u8], at: usize, what: &'static str) -> Result<u16, MessageError> {
    match bytes.get(at..at + 2) {
        Some(raw) => Ok(u16::from_be_bytes([raw[0], raw[1]])),
        None => Err(MessageError::Truncated {
            what,
            len: bytes.len(),
            needed: at + 2,
        }),
    }
}

fn read_u32(bytes: &[u8], at: usize, what: &'static str) -> Result<u32, MessageError> {
    match bytes.get(at..at + 4) {
        Some(raw) => Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])),
        None => Err(MessageError::Truncated {
            what,
            len: bytes.len(),
            needed: at + 4,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Entity, Vec2};

    #[test]
    fn test_ack_layout() {
        let bytes = Message::Ack { index: 0x0102_0304 }.encode().unwrap();
        assert_eq!(bytes, vec![0, 0, 1, 2, 3, 4]);
        assert_eq!(
            Message::decode(&bytes).unwrap(),
            Message::Ack { index: 0x0102_0304 }
        );
    }

    #[test]
    fn test_snapshot_layout() {
        let state = State {
            players: vec![Entity::new(1, Vec2::new(80.0, 80.0))],
            ..State::default()
        };
        let message = Message::Snapshot { index: 9, state };
        let bytes = message.encode().unwrap();

        assert_eq!(&bytes[..6], &[0, 1, 0, 0, 0, 9]);
        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(matches!(
            Message::decode(&[0, 7, 0, 0, 0, 0]),
            Err(MessageError::UnknownKind(7))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(matches!(
            Message::decode(&[0]),
            Err(MessageError::Truncated { needed: 2, .. })
        ));
        assert!(matches!(
            Message::decode(&[0, 0, 1]),
            Err(MessageError::Truncated { needed: 6, .. })
        ));
        assert!(Message::decode(&[0, 1, 0, 0, 0, 1, 0xff]).is_err());
    }
}
