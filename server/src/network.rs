//! Server network layer: session acceptance, per-peer input handling and the tick loop

use crate::client_manager::{Client, ClientManager};
use crate::simulation::Simulation;
use log::{debug, error, info, trace, warn};
use shared::{
    decode_batch, CancellationToken, Input, Listener, ListenerConfig, Message, Session,
    SessionError,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::ToSocketAddrs;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Tuning for the authoritative server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation steps per second
    pub tick_rate: u32,
    /// Fresh inputs buffered per peer between ticks; extra inputs are dropped
    pub input_backlog: usize,
    /// Peers beyond this are closed right after joining
    pub max_clients: usize,
    pub listener: ListenerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 10,
            input_backlog: 8,
            max_clients: 16,
            listener: ListenerConfig::default().with_log_target("server::network"),
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

/// Messages sent from the network tasks to the tick loop
#[derive(Debug)]
pub enum ServerMessage {
    Joined {
        session: Session,
        inputs: mpsc::Receiver<Input>,
    },
    Left {
        addr: SocketAddr,
    },
}

/// Authoritative server driving a [`Simulation`] from the inputs of every joined peer
pub struct Server<S: Simulation> {
    listener: Listener,
    simulation: S,
    clients: ClientManager,
    config: ServerConfig,
    snapshot_index: u32,
}

impl<S: Simulation> Server<S> {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        config: ServerConfig,
        simulation: S,
    ) -> Result<Self, SessionError> {
        let listener = Listener::bind(addr, config.listener.clone()).await?;
        info!("Server listening on {}", listener.local_addr());
        Ok(Self::from_listener(listener, config, simulation))
    }

    pub fn from_listener(listener: Listener, config: ServerConfig, simulation: S) -> Self {
        Self {
            listener,
            simulation,
            clients: ClientManager::new(config.max_clients),
            config,
            snapshot_index: 0,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Index the next broadcast snapshot will carry
    pub fn snapshot_index(&self) -> u32 {
        self.snapshot_index
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Main server loop. Runs until `shutdown` is cancelled, then closes every session.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), SessionError> {
        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_sessions(
            self.listener.clone(),
            server_tx,
            self.config.input_backlog,
            shutdown.clone(),
        ));

        let tick_duration = self.config.tick_duration();
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started at {} Hz", self.config.tick_rate);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,

                message = server_rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => break,
                },

                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick);
                    last_tick = now;
                    self.tick(dt, tick_duration, &shutdown).await;
                },
            }
        }

        info!("Server shutting down");
        match self.listener.close(&CancellationToken::new()).await {
            Ok(()) | Err(SessionError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Joined { session, inputs } => {
                let addr = session.remote_addr();
                match self.clients.add_client(session, inputs) {
                    Ok(()) => self.simulation.add_entity(addr),
                    Err(rejected) => {
                        warn!("Server full, closing session from {}", addr);
                        tokio::spawn(async move {
                            if let Err(e) = rejected.session.close(&CancellationToken::new()).await {
                                debug!("Close of rejected session {} failed: {}", addr, e);
                            }
                        });
                    }
                }
            }
            ServerMessage::Left { addr } => {
                if self.clients.remove_client(&addr) {
                    self.simulation.remove_entity(addr);
                }
            }
        }
    }

    /// Advances the simulation one step and broadcasts the resulting snapshot
    async fn tick(&mut self, dt: Duration, budget: Duration, shutdown: &CancellationToken) {
        let inputs = self.clients.collect_inputs();
        let state = self.simulation.advance(dt, &inputs);

        let index = self.snapshot_index;
        self.snapshot_index = self.snapshot_index.wrapping_add(1);

        let payload = match (Message::Snapshot { index, state }).encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode snapshot {}: {}", index, e);
                return;
            }
        };

        if self.clients.is_empty() {
            return;
        }

        // A slow peer may hold up the broadcast, but never past the next tick.
        match timeout(budget, self.listener.broadcast(shutdown, &payload)).await {
            Ok(Ok(())) => trace!("Snapshot {} sent to {} clients", index, self.clients.len()),
            Ok(Err(e)) if e.is_cancelled() || e.is_closed() => {}
            Ok(Err(e)) => warn!("Snapshot {} broadcast failed: {}", index, e),
            Err(_) => debug!("Snapshot {} broadcast cut short after {:?}", index, budget),
        }

        if index % 100 == 0 {
            debug!("Tick {}: {} clients, dt {:?}", index, self.clients.len(), dt);
        }
    }
}

/// Accepts joining peers until the listener closes or `shutdown` fires
async fn accept_sessions(
    listener: Listener,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    input_backlog: usize,
    shutdown: CancellationToken,
) {
    loop {
        let session = match listener.accept(&shutdown).await {
            Ok(session) => session,
            Err(e) if e.is_closed() || e.is_cancelled() => break,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        let (inputs_tx, inputs_rx) = mpsc::channel(input_backlog.max(1));
        let joined = ServerMessage::Joined {
            session: session.clone(),
            inputs: inputs_rx,
        };
        if server_tx.send(joined).is_err() {
            break;
        }

        tokio::spawn(receive_inputs(
            session,
            inputs_tx,
            server_tx.clone(),
            shutdown.clone(),
        ));
    }

    debug!("Accept loop stopped");
}

/// Per-peer loop: decodes input batches, forwards fresh inputs and acknowledges them
async fn receive_inputs(
    session: Session,
    inputs_tx: mpsc::Sender<Input>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    shutdown: CancellationToken,
) {
    let addr = session.remote_addr();
    let mut client = Client::new(addr);

    loop {
        let payload = match session.receive(&shutdown).await {
            Ok(payload) => payload,
            Err(e) => {
                if !e.is_closed() && !e.is_cancelled() {
                    warn!("Receive from {} failed: {}", addr, e);
                }
                break;
            }
        };

        let batch = match decode_batch(&payload) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Invalid input batch from {}: {}", addr, e);
                continue;
            }
        };

        let outcome = client.accept_batch(&batch);
        for input in outcome.fresh {
            if inputs_tx.try_send(input).is_err() {
                trace!("Input queue for {} full, dropping input", addr);
            }
        }

        let Some(index) = outcome.ack else { continue };
        match (Message::Ack { index }).encode() {
            Ok(ack) => {
                if let Err(e) = session.try_send(ack) {
                    debug!("Ack to {} not sent: {}", addr, e);
                    break;
                }
            }
            Err(e) => error!("Failed to encode ack {}: {}", index, e),
        }
    }

    if server_tx.send(ServerMessage::Left { addr }).is_err() {
        debug!("Server loop gone before {} left", addr);
    }
}
