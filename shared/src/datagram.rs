//! Datagram header codec: one version byte and a big-endian flag word ahead of an opaque payload

use crate::error::CodecError;
use bitflags::bitflags;
use std::fmt;

pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 3;
/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

bitflags! {
    /// Control bits carried in the datagram header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        const JOIN  = 0b0000_0001;
        const LEAVE = 0b0000_0010;
    }
}

/// One transport record: header plus payload. The payload is not length-prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub version: u8,
    pub flags: Flags,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn data(payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: Flags::empty(),
            payload,
        }
    }

    pub fn join() -> Self {
        Self::control(Flags::JOIN)
    }

    pub fn leave() -> Self {
        Self::control(Flags::LEAVE)
    }

    fn control(flags: Flags) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags,
            payload: Vec::new(),
        }
    }

    pub fn is_join(&self) -> bool {
        self.flags.contains(Flags::JOIN)
    }

    pub fn is_leave(&self) -> bool {
        self.flags.contains(Flags::LEAVE)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_parts(self.flags, &self.payload)
    }

    /// Parses a received record, rejecting short buffers, foreign versions, and JOIN|LEAVE.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::ShortBuffer {
                len: bytes.len(),
                needed: HEADER_SIZE,
            });
        }

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let raw = u16::from_be_bytes([bytes[1], bytes[2]]);
        let flags = Flags::from_bits_truncate(raw);
        if flags.contains(Flags::JOIN | Flags::LEAVE) {
            return Err(CodecError::ConflictingFlags(raw));
        }

        Ok(Self {
            version,
            flags,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

impl fmt::Display for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} flags={:?} payload={}B",
            self.version,
            self.flags,
            self.payload.len()
        )
    }
}

/// Encodes a header and payload without building a `Datagram` first.
pub(crate) fn encode_parts(flags: Flags, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.push(PROTOCOL_VERSION);
    bytes.extend_from_slice(&flags.bits().to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}
