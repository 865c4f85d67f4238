//! Session protocol over a single datagram socket.
//!
//! A [`Listener`] owns one socket and demultiplexes inbound datagrams into per-peer
//! [`Session`]s, keyed by the sender's socket address. Peers announce themselves with a JOIN
//! datagram and say goodbye with LEAVE; everything else is data for an existing session.
//!
//! ## Tasks
//!
//! Each listener runs two background tasks:
//! - **Read loop**: decodes every inbound datagram and dispatches it by flag. Malformed records
//!   and data from unknown peers are logged and dropped.
//! - **Write loop**: all sessions feed one shared queue; the loop writes each queued payload to
//!   the socket in arrival order. A per-session semaphore bounds how many payloads one session
//!   may have queued, and its permit is released once the datagram has been written.
//!
//! ## Cancellation and closing
//!
//! Every blocking operation takes a [`CancellationToken`]. A cancelled call returns
//! [`SessionError::Cancelled`] and leaves the session untouched. Closing is idempotent: the first
//! call does the work and every later call returns [`SessionError::Closed`].

use crate::config::{InboxOverflow, ListenerConfig, LogContext};
use crate::datagram::{encode_parts, Datagram, Flags};
use crate::error::{CodecError, ProtocolError, SessionError};
use crate::socket::DatagramSocket;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Listening,
    Dialing,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Listening => "listen",
            Role::Dialing => "dial",
        }
    }
}

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Unjoined = 0,
    Joined = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Unjoined,
            1 => SessionState::Joined,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Point-in-time traffic counters of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub delivered: u64,
    pub dropped_inbound: u64,
    pub sent: u64,
    pub dropped_outbound: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped_inbound: AtomicU64,
    sent: AtomicU64,
    dropped_outbound: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A payload waiting for the write loop, holding one slot of its session's outbox.
struct Outgoing {
    session: Arc<SessionShared>,
    payload: Vec<u8>,
    _permit: OwnedSemaphorePermit,
}

/// Owner of one socket and of the sessions multiplexed on it.
#[derive(Clone)]
pub struct Listener {
    shared: Arc<ListenerShared>,
}

struct ListenerShared {
    role: Role,
    socket: Arc<dyn DatagramSocket>,
    local_addr: SocketAddr,
    config: ListenerConfig,
    log: LogContext,
    sessions: Mutex<HashMap<SocketAddr, Session>>,
    accept_tx: mpsc::Sender<Session>,
    accept_rx: tokio::sync::Mutex<mpsc::Receiver<Session>>,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    die: CancellationToken,
    closed: AtomicBool,
}

impl Listener {
    /// Binds a UDP socket and starts the read and write loops.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: ListenerConfig,
    ) -> Result<Listener, SessionError> {
        let socket = UdpSocket::bind(addr).await?;
        Self::from_socket(Arc::new(socket), config)
    }

    /// Starts a listener over an existing socket. Must be called inside a tokio runtime.
    pub fn from_socket(
        socket: Arc<dyn DatagramSocket>,
        config: ListenerConfig,
    ) -> Result<Listener, SessionError> {
        let shared = ListenerShared::start(socket, Role::Listening, config)?;
        Ok(Listener { shared })
    }

    /// Opens a session to `remote` from a private, ephemeral listener.
    ///
    /// The JOIN is sent once and never retried; if it is lost the returned session stays silent.
    pub async fn dial(
        cancel: &CancellationToken,
        remote: impl ToSocketAddrs,
        config: ListenerConfig,
    ) -> Result<Session, SessionError> {
        let remote = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            resolved = lookup_host(remote) => resolved?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "remote address resolved to nothing")
            })?,
        };

        let socket = UdpSocket::bind(ephemeral_bind_addr(remote)).await?;
        let shared = ListenerShared::start(Arc::new(socket), Role::Dialing, config)?;
        let session = shared.register(remote, SessionState::Unjoined);

        if let Err(error) = session.shared.send_control(Datagram::join(), cancel).await {
            shared.terminate();
            return Err(error);
        }
        session.shared.transition(SessionState::Unjoined, SessionState::Joined);
        info!(target: session.shared.log.target(), "{} join sent", session.shared.log);

        Ok(session)
    }

    /// Waits for the next peer to join.
    pub async fn accept(&self, cancel: &CancellationToken) -> Result<Session, SessionError> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut queue = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            _ = shared.die.cancelled() => return Err(SessionError::Closed),
            queue = shared.accept_rx.lock() => queue,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            _ = shared.die.cancelled() => Err(SessionError::Closed),
            next = queue.recv() => next.ok_or(SessionError::Closed),
        }
    }

    /// Sends `payload` to every live session.
    ///
    /// Sessions that close while the broadcast is in progress are skipped.
    pub async fn broadcast(
        &self,
        cancel: &CancellationToken,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        if self.shared.is_closed() {
            return Err(SessionError::Closed);
        }

        let sessions: Vec<Session> = lock(&self.shared.sessions).values().cloned().collect();
        let mut errors = Vec::new();
        for session in sessions {
            match session.send(cancel, payload.to_vec()).await {
                Ok(()) | Err(SessionError::Closed) => {}
                Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
                Err(error) => errors.push(error),
            }
        }
        SessionError::aggregate(errors)
    }

    /// Closes every session (sending LEAVE to each) and stops the loops.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        let sessions: Vec<Session> = lock(&shared.sessions).values().cloned().collect();
        let mut errors = Vec::new();
        for session in sessions {
            match session.close(cancel).await {
                Ok(()) | Err(SessionError::Closed) => {}
                Err(error) => errors.push(error),
            }
        }

        shared.terminate();
        info!(target: shared.log.target(), "{} closed", shared.log);
        SessionError::aggregate(errors)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    pub fn session_count(&self) -> usize {
        lock(&self.shared.sessions).len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("role", &self.shared.role)
            .field("local_addr", &self.shared.local_addr)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}

fn ephemeral_bind_addr(remote: SocketAddr) -> SocketAddr {
    let ip = match (remote.ip(), remote.ip().is_loopback()) {
        (IpAddr::V4(_), true) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        (IpAddr::V4(_), false) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        (IpAddr::V6(_), true) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        (IpAddr::V6(_), false) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}

impl ListenerShared {
    fn start(
        socket: Arc<dyn DatagramSocket>,
        role: Role,
        config: ListenerConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let local_addr = socket.local_addr()?;
        let config = config.sanitized();
        let log = LogContext::new(config.log_target.clone(), role.as_str(), local_addr);
        let (accept_tx, accept_rx) = mpsc::channel(config.accept_backlog);
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(ListenerShared {
            role,
            socket,
            local_addr,
            config,
            log,
            sessions: Mutex::new(HashMap::new()),
            accept_tx,
            accept_rx: tokio::sync::Mutex::new(accept_rx),
            outgoing_tx,
            die: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(read_loop(Arc::clone(&shared)));
        tokio::spawn(write_loop(Arc::clone(&shared), outgoing_rx));
        debug!(target: shared.log.target(), "{} started", shared.log);

        Ok(shared)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.die.is_cancelled()
    }

    fn register(self: &Arc<Self>, remote: SocketAddr, state: SessionState) -> Session {
        let session = Session::new(Arc::clone(self), remote, state);
        lock(&self.sessions).insert(remote, session.clone());
        session
    }

    /// Removes `session` from the registry unless the slot already belongs to a newer one.
    fn unregister(&self, session: &Arc<SessionShared>) {
        let mut sessions = lock(&self.sessions);
        if sessions
            .get(&session.remote_addr)
            .is_some_and(|current| Arc::ptr_eq(&current.shared, session))
        {
            sessions.remove(&session.remote_addr);
        }
    }

    /// Stops both loops and tears down whatever is still registered. Idempotent.
    fn terminate(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let remaining: Vec<Session> = lock(&self.sessions).drain().map(|(_, s)| s).collect();
        for session in remaining {
            session.shared.finish();
        }
        self.die.cancel();
    }

    async fn handle_datagram(
        self: &Arc<Self>,
        from: SocketAddr,
        datagram: Datagram,
    ) -> Result<(), ProtocolError> {
        if datagram.is_join() {
            return self.handle_join(from).await;
        }

        if datagram.is_leave() {
            let session = lock(&self.sessions)
                .remove(&from)
                .ok_or(ProtocolError::UnknownPeer(from))?;
            session.shared.finish();
            info!(target: self.log.target(), "{} peer {} left", self.log, from);
            if self.role == Role::Dialing {
                self.terminate();
            }
            return Ok(());
        }

        let session = lock(&self.sessions)
            .get(&from)
            .cloned()
            .ok_or(ProtocolError::UnknownPeer(from))?;
        session.shared.deliver(datagram.payload);
        Ok(())
    }

    async fn handle_join(self: &Arc<Self>, from: SocketAddr) -> Result<(), ProtocolError> {
        if self.role == Role::Dialing {
            return Err(ProtocolError::UnexpectedJoin(from));
        }

        let session = {
            let mut sessions = lock(&self.sessions);
            if sessions.contains_key(&from) {
                return Err(ProtocolError::DuplicateJoin(from));
            }
            let session = Session::new(Arc::clone(self), from, SessionState::Joined);
            sessions.insert(from, session.clone());
            session
        };
        info!(target: self.log.target(), "{} peer {} joined", self.log, from);

        // Blocks the read loop until accept makes room.
        tokio::select! {
            biased;
            _ = self.die.cancelled() => {}
            sent = self.accept_tx.send(session) => {
                if sent.is_err() {
                    debug!(target: self.log.target(), "{} accept queue gone", self.log);
                }
            }
        }
        Ok(())
    }
}

async fn read_loop(shared: Arc<ListenerShared>) {
    // One spare byte: a record that fills it was cut short by the OS.
    let capacity = shared.config.recv_buffer_size;
    let mut buffer = vec![0u8; capacity + 1];

    loop {
        let received = tokio::select! {
            biased;
            _ = shared.die.cancelled() => break,
            received = shared.socket.recv_from(&mut buffer) => received,
        };

        let (len, from) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!(target: shared.log.target(), "{} receive failed: {}", shared.log, e);
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
        };

        let decoded = if len > capacity {
            Err(CodecError::Oversized { capacity })
        } else {
            Datagram::decode(&buffer[..len])
        };

        let result = match decoded {
            Ok(datagram) => {
                trace!(target: shared.log.target(), "{} {} from {}", shared.log, datagram, from);
                shared.handle_datagram(from, datagram).await
            }
            Err(source) => Err(ProtocolError::Codec { from, source }),
        };

        if let Err(e) = result {
            warn!(target: shared.log.target(), "{} dropped datagram: {}", shared.log, e);
        }
    }

    debug!(target: shared.log.target(), "{} read loop stopped", shared.log);
}

async fn write_loop(shared: Arc<ListenerShared>, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shared.die.cancelled() => break,
            next = outgoing.recv() => next,
        };
        let Some(item) = next else { break };

        let session = &item.session;
        if session.is_closed() {
            continue;
        }

        let bytes = encode_parts(Flags::empty(), &item.payload);
        match shared.socket.send_to(&bytes, session.remote_addr).await {
            Ok(_) => {
                session.counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(target: shared.log.target(), "{} send to {} failed: {}", shared.log, session.remote_addr, e);
            }
        }
    }

    debug!(target: shared.log.target(), "{} write loop stopped", shared.log);
}

/// A logical channel to one remote peer.
///
/// Cloning is cheap; all clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    listener: Arc<ListenerShared>,
    remote_addr: SocketAddr,
    log: LogContext,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    inbox_ready: Notify,
    outbox: Arc<Semaphore>,
    state: AtomicU8,
    die: CancellationToken,
    counters: Counters,
}

impl Session {
    fn new(listener: Arc<ListenerShared>, remote_addr: SocketAddr, state: SessionState) -> Self {
        let log = listener.log.for_peer(remote_addr);
        let outbox = Arc::new(Semaphore::new(listener.config.outbox_capacity));
        let die = listener.die.child_token();
        Session {
            shared: Arc::new(SessionShared {
                listener,
                remote_addr,
                log,
                inbox: Mutex::new(VecDeque::new()),
                inbox_ready: Notify::new(),
                outbox,
                state: AtomicU8::new(state as u8),
                die,
                counters: Counters::default(),
            }),
        }
    }

    /// Waits for the next payload from the peer.
    pub async fn receive(&self, cancel: &CancellationToken) -> Result<Vec<u8>, SessionError> {
        let shared = &self.shared;
        loop {
            let notified = shared.inbox_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shared.is_closed() {
                return Err(SessionError::Closed);
            }
            if let Some(payload) = lock(&shared.inbox).pop_front() {
                return Ok(payload);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = shared.die.cancelled() => return Err(SessionError::Closed),
                _ = &mut notified => {}
            }
        }
    }

    /// Queues `payload` for the peer, waiting for outbox room if necessary.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), SessionError> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(SessionError::Closed);
        }

        let outbox = Arc::clone(&shared.outbox);
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            _ = shared.die.cancelled() => return Err(SessionError::Closed),
            permit = outbox.acquire_owned() => permit.map_err(|_| SessionError::Closed)?,
        };
        shared.enqueue(payload.into(), permit)
    }

    /// Queues `payload` without waiting. Returns `Ok(false)` if the outbox was full and the
    /// payload was dropped.
    pub fn try_send(&self, payload: impl Into<Vec<u8>>) -> Result<bool, SessionError> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(SessionError::Closed);
        }

        match Arc::clone(&shared.outbox).try_acquire_owned() {
            Ok(permit) => shared.enqueue(payload.into(), permit).map(|()| true),
            Err(TryAcquireError::NoPermits) => {
                shared.counters.dropped_outbound.fetch_add(1, Ordering::Relaxed);
                trace!(target: shared.log.target(), "{} outbox full, payload dropped", shared.log);
                Ok(false)
            }
            Err(TryAcquireError::Closed) => Err(SessionError::Closed),
        }
    }

    /// Sends LEAVE and tears the session down. A dialed session also takes its listener down.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let shared = &self.shared;
        if !shared.begin_close() {
            return Err(SessionError::Closed);
        }

        let mut errors = Vec::new();
        if let Err(error) = shared.send_control(Datagram::leave(), cancel).await {
            errors.push(error);
        }

        shared.finish();
        if shared.listener.role == Role::Dialing {
            shared.listener.terminate();
        }
        info!(target: shared.log.target(), "{} closed", shared.log);

        SessionError::aggregate(errors)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.listener.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.shared.remote_addr
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn stats(&self) -> SessionStats {
        let counters = &self.shared.counters;
        SessionStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped_inbound: counters.dropped_inbound.load(Ordering::Relaxed),
            sent: counters.sent.load(Ordering::Relaxed),
            dropped_outbound: counters.dropped_outbound.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("local_addr", &self.local_addr())
            .field("remote_addr", &self.remote_addr())
            .field("state", &self.state())
            .finish()
    }
}

impl SessionShared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn is_closed(&self) -> bool {
        self.state() >= SessionState::Closing || self.die.is_cancelled()
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claims the single close. Fails if another close or a LEAVE got there first.
    fn begin_close(&self) -> bool {
        self.transition(SessionState::Joined, SessionState::Closing)
            || self.transition(SessionState::Unjoined, SessionState::Closing)
    }

    /// Final teardown: wakes every waiter and leaves the registry. Idempotent.
    fn finish(self: &Arc<Self>) {
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
        self.die.cancel();
        self.outbox.close();
        lock(&self.inbox).clear();
        self.listener.unregister(self);
    }

    fn deliver(&self, payload: Vec<u8>) {
        let mut inbox = lock(&self.inbox);
        if inbox.len() >= self.listener.config.inbox_capacity {
            self.counters.dropped_inbound.fetch_add(1, Ordering::Relaxed);
            match self.listener.config.inbox_overflow {
                InboxOverflow::DropNewest => {
                    trace!(target: self.log.target(), "{} inbox full, dropped newest", self.log);
                    return;
                }
                InboxOverflow::DropOldest => {
                    trace!(target: self.log.target(), "{} inbox full, dropped oldest", self.log);
                    inbox.pop_front();
                }
            }
        }
        inbox.push_back(payload);
        drop(inbox);

        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        self.inbox_ready.notify_one();
    }

    fn enqueue(self: &Arc<Self>, payload: Vec<u8>, permit: OwnedSemaphorePermit) -> Result<(), SessionError> {
        self.listener
            .outgoing_tx
            .send(Outgoing {
                session: Arc::clone(self),
                payload,
                _permit: permit,
            })
            .map_err(|_| SessionError::Closed)
    }

    async fn send_control(&self, datagram: Datagram, cancel: &CancellationToken) -> Result<(), SessionError> {
        let bytes = datagram.encode();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            sent = self.listener.socket.send_to(&bytes, self.remote_addr) => {
                sent.map(|_| ()).map_err(SessionError::from)
            }
        }
    }
}
