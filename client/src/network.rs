//! Client connection: sends the input backlog every frame and folds server messages into local state

use crate::game::Reconciler;
use log::{debug, info, trace, warn};
use shared::{
    CancellationToken, InboxOverflow, Input, InputBuffer, Listener, ListenerConfig, Message,
    Session, SessionError, SessionStats, State,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::net::ToSocketAddrs;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub listener: ListenerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Acks and snapshots share one inbox; keep the freshest when it backs up.
            listener: ListenerConfig::default()
                .with_inbox(8, InboxOverflow::DropOldest)
                .with_log_target("client::network"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A joined session to the game server
pub struct Client {
    session: Session,
    inputs: Arc<Mutex<InputBuffer>>,
    reconciler: Arc<Mutex<Reconciler>>,
    stop: CancellationToken,
}

impl Client {
    /// Dials the server and starts the receive loop. Must be called inside a tokio runtime.
    pub async fn connect(
        server: impl ToSocketAddrs,
        config: ClientConfig,
    ) -> Result<Self, SessionError> {
        let stop = CancellationToken::new();
        let session = Listener::dial(&stop, server, config.listener).await?;
        info!(
            "Connected to {} from {}",
            session.remote_addr(),
            session.local_addr()
        );

        let inputs = Arc::new(Mutex::new(InputBuffer::new()));
        let reconciler = Arc::new(Mutex::new(Reconciler::new()));
        tokio::spawn(receive_messages(
            session.clone(),
            Arc::clone(&inputs),
            Arc::clone(&reconciler),
            stop.clone(),
        ));

        Ok(Self {
            session,
            inputs,
            reconciler,
            stop,
        })
    }

    /// Records this frame's input, resends the unacknowledged backlog and returns the state to
    /// render. Never blocks: if the outbox is full the batch is skipped, and the next frame's
    /// batch carries the same inputs again.
    pub fn update(&self, input: Input) -> Option<State> {
        let batch = {
            let mut inputs = lock(&self.inputs);
            inputs.append(input);
            inputs.encode()
        };

        match self.session.try_send(batch) {
            Ok(true) => {}
            Ok(false) => trace!("Outbox full, batch skipped"),
            Err(e) => debug!("Batch not sent: {}", e),
        }

        self.interpolated(Instant::now())
    }

    pub fn interpolated(&self, now: Instant) -> Option<State> {
        lock(&self.reconciler).interpolated(now)
    }

    /// Inputs sent but not yet acknowledged
    pub fn pending_inputs(&self) -> usize {
        lock(&self.inputs).len()
    }

    pub fn last_snapshot_index(&self) -> Option<u32> {
        lock(&self.reconciler).last_index()
    }

    /// Sends LEAVE and stops the receive loop.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), SessionError> {
        self.stop.cancel();
        self.session.close(cancel).await
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.session.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.session.remote_addr()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn receive_messages(
    session: Session,
    inputs: Arc<Mutex<InputBuffer>>,
    reconciler: Arc<Mutex<Reconciler>>,
    stop: CancellationToken,
) {
    loop {
        let payload = match session.receive(&stop).await {
            Ok(payload) => payload,
            Err(e) => {
                if !e.is_closed() && !e.is_cancelled() {
                    warn!("Receive failed: {}", e);
                }
                break;
            }
        };

        match Message::decode(&payload) {
            Ok(Message::Ack { index }) => lock(&inputs).discard_until(index),
            Ok(Message::Snapshot { index, state }) => {
                lock(&reconciler).apply(index, state, Instant::now());
            }
            Err(e) => warn!("Invalid message from server: {}", e),
        }
    }

    info!("Disconnected from {}", session.remote_addr());
}
