//! Error types for the datagram codec, the session protocol, and application payloads

use std::fmt;
use std::net::SocketAddr;

/// Failure to decode a raw datagram header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("short buffer: got {len} bytes, header needs {needed}")]
    ShortBuffer { len: usize, needed: usize },
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("conflicting flags {0:#06x}: join and leave are mutually exclusive")]
    ConflictingFlags(u16),
    #[error("datagram exceeds the {capacity}-byte receive buffer")]
    Oversized { capacity: usize },
}

/// Failure while dispatching an inbound datagram inside the read loop.
///
/// These never reach `send`/`receive` callers; the read loop logs them and moves on.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed datagram from {from}: {source}")]
    Codec {
        from: SocketAddr,
        #[source]
        source: CodecError,
    },
    #[error("duplicate join from {0}")]
    DuplicateJoin(SocketAddr),
    #[error("no session for {0}")]
    UnknownPeer(SocketAddr),
    #[error("join from {0} on a dialing listener")]
    UnexpectedJoin(SocketAddr),
}

/// Outcome of a session or listener operation that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session or listener has already been closed.
    #[error("use of closed session")]
    Closed,
    /// The caller's cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Several failures collected while tearing sessions down.
    #[error("teardown failed: {}", ErrorList(.0))]
    Teardown(Vec<SessionError>),
}

impl SessionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionError::Closed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// Folds collected errors into a single result.
    pub(crate) fn aggregate(mut errors: Vec<SessionError>) -> Result<(), SessionError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SessionError::Teardown(errors)),
        }
    }
}

struct ErrorList<'a>(&'a [SessionError]);

impl fmt::Display for ErrorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Failure to decode an application payload (input batch, ack, snapshot).
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("truncated {what}: got {len} bytes, need {needed}")]
    Truncated {
        what: &'static str,
        len: usize,
        needed: usize,
    },
    #[error("unknown message kind {0}")]
    UnknownKind(u16),
    #[error("state encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}
