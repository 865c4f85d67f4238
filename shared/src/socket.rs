//! Datagram socket seam used by the listener, plus a lossy wrapper for fault injection

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::net::UdpSocket;

/// Opaque record transport: send one payload to a peer, receive one payload from anyone.
pub trait DatagramSocket: Send + Sync + 'static {
    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, SocketAddr)>>;

    fn send_to<'a>(&'a self, buf: &'a [u8], target: SocketAddr) -> BoxFuture<'a, io::Result<usize>>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, SocketAddr)>> {
        UdpSocket::recv_from(self, buf).boxed()
    }

    fn send_to<'a>(&'a self, buf: &'a [u8], target: SocketAddr) -> BoxFuture<'a, io::Result<usize>> {
        UdpSocket::send_to(self, buf, target).boxed()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Inbound loss model for [`LossySocket`].
#[derive(Debug, Clone, Default)]
pub struct LossConfig {
    /// Drop every n-th datagram from each sender (2 drops the 2nd, 4th, 6th, ...).
    pub drop_every_nth: Option<u32>,
    /// Probability of dropping any inbound datagram, applied after `drop_every_nth`.
    pub loss_rate: f64,
    /// Seed for the loss RNG so runs are reproducible.
    pub seed: u64,
}

impl LossConfig {
    pub fn every_other() -> Self {
        Self {
            drop_every_nth: Some(2),
            ..Self::default()
        }
    }

    pub fn random(loss_rate: f64, seed: u64) -> Self {
        Self {
            drop_every_nth: None,
            loss_rate: loss_rate.clamp(0.0, 1.0),
            seed,
        }
    }
}

struct LossState {
    per_sender: HashMap<SocketAddr, u32>,
    rng: StdRng,
    dropped: u64,
}

/// Wraps a socket and discards inbound datagrams according to a [`LossConfig`].
pub struct LossySocket<S> {
    inner: S,
    config: LossConfig,
    state: Mutex<LossState>,
}

impl<S: DatagramSocket> LossySocket<S> {
    pub fn new(inner: S, config: LossConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(LossState {
                per_sender: HashMap::new(),
                rng,
                dropped: 0,
            }),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.state.lock().map(|state| state.dropped).unwrap_or(0)
    }

    fn should_drop(&self, from: SocketAddr) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        let count = state.per_sender.entry(from).or_insert(0);
        *count += 1;
        let mut drop = matches!(self.config.drop_every_nth, Some(n) if n > 0 && *count % n == 0);

        if !drop && self.config.loss_rate > 0.0 {
            drop = state.rng.gen_bool(self.config.loss_rate);
        }
        if drop {
            state.dropped += 1;
        }
        drop
    }
}

impl<S: DatagramSocket> DatagramSocket for LossySocket<S> {
    fn recv_from<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<(usize, SocketAddr)>> {
        async move {
            loop {
                let (len, from) = self.inner.recv_from(buf).await?;
                if !self.should_drop(from) {
                    return Ok((len, from));
                }
                log::trace!("lossy socket dropped {} bytes from {}", len, from);
            }
        }
        .boxed()
    }

    fn send_to<'a>(&'a self, buf: &'a [u8], target: SocketAddr) -> BoxFuture<'a, io::Result<usize>> {
        self.inner.send_to(buf, target)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
