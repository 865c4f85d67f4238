//! Listener tuning knobs and the per-listener logging context

use std::fmt;
use std::net::SocketAddr;

pub const DEFAULT_LOG_TARGET: &str = "shared::listener";

/// What happens to an inbound payload when the session inbox is already full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InboxOverflow {
    /// Keep what is queued and discard the arriving payload.
    #[default]
    DropNewest,
    /// Evict the oldest queued payload to make room for the arriving one.
    DropOldest,
}

/// Queue sizes and buffers for a [`Listener`](crate::listener::Listener) and its sessions.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Payloads queued per session ahead of `receive`.
    pub inbox_capacity: usize,
    pub inbox_overflow: InboxOverflow,
    /// Payloads a session may have in flight towards the socket.
    pub outbox_capacity: usize,
    /// Joined sessions waiting for `accept` before the read loop stalls.
    pub accept_backlog: usize,
    /// Largest datagram the read loop accepts; longer records are dropped as malformed.
    pub recv_buffer_size: usize,
    pub log_target: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 1,
            inbox_overflow: InboxOverflow::DropNewest,
            outbox_capacity: 1,
            accept_backlog: 1,
            recv_buffer_size: crate::datagram::MAX_DATAGRAM_SIZE,
            log_target: DEFAULT_LOG_TARGET.to_string(),
        }
    }
}

impl ListenerConfig {
    pub fn with_inbox(mut self, capacity: usize, overflow: InboxOverflow) -> Self {
        self.inbox_capacity = capacity.max(1);
        self.inbox_overflow = overflow;
        self
    }

    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    pub fn with_accept_backlog(mut self, backlog: usize) -> Self {
        self.accept_backlog = backlog.max(1);
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size.max(crate::datagram::HEADER_SIZE);
        self
    }

    pub fn with_log_target(mut self, target: impl Into<String>) -> Self {
        self.log_target = target.into();
        self
    }

    /// Clamps zero capacities, which the underlying channels reject.
    pub(crate) fn sanitized(mut self) -> Self {
        self.inbox_capacity = self.inbox_capacity.max(1);
        self.outbox_capacity = self.outbox_capacity.max(1);
        self.accept_backlog = self.accept_backlog.max(1);
        self.recv_buffer_size = self.recv_buffer_size.max(crate::datagram::HEADER_SIZE);
        self
    }
}

/// Log target and label shared by one listener and every session it owns.
#[derive(Debug, Clone)]
pub struct LogContext {
    target: String,
    label: String,
}

impl LogContext {
    pub fn new(target: impl Into<String>, role: &str, local_addr: SocketAddr) -> Self {
        Self {
            target: target.into(),
            label: format!("{role} {local_addr}"),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Context for a session, labelled with its remote address.
    pub fn for_peer(&self, remote: SocketAddr) -> Self {
        Self {
            target: self.target.clone(),
            label: format!("{} <-> {remote}", self.label),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label)
    }
}
