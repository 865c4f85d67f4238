//! Per-peer input bookkeeping for the authoritative server
//!
//! This module handles the server-side view of every connected peer:
//! - Deduplicating the overlapping input batches each client resends every frame
//! - Choosing which index to acknowledge so the client can trim its jitter buffer
//! - Queueing fresh inputs between the per-peer receive loops and the tick loop
//! - Capacity management
//!
//! Each receive loop owns one [`Client`] and forwards fresh inputs through a bounded queue;
//! the tick loop owns the [`ClientManager`] and drains those queues once per tick.

use log::info;
use shared::{IndexedInput, Input, Session};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Dedup state for one connected peer, owned by its receive loop.
#[derive(Debug)]
pub struct Client {
    /// Remote address, also the simulation key
    pub addr: SocketAddr,
    /// Highest input index already handed to the simulation
    pub last_processed_input: Option<u32>,
}

/// Result of feeding one decoded batch through [`Client::accept_batch`].
#[derive(Debug, Default, PartialEq)]
pub struct BatchOutcome {
    /// Inputs not seen before, oldest first
    pub fresh: Vec<Input>,
    /// Highest index observed in the batch, to be acknowledged
    pub ack: Option<u32>,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_processed_input: None,
        }
    }

    /// Filters a batch down to entries newer than anything processed so far
    ///
    /// Clients resend their whole unacknowledged backlog, so consecutive batches overlap.
    /// Only entries whose index exceeds the last processed index are returned; the ack
    /// covers the highest index in the batch even when nothing in it was new.
    pub fn accept_batch(&mut self, batch: &[IndexedInput]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for entry in batch {
            let is_fresh = self
                .last_processed_input
                .map_or(true, |last| entry.index > last);
            if is_fresh {
                outcome.fresh.push(entry.input);
                self.last_processed_input = Some(entry.index);
            }
            outcome.ack = Some(outcome.ack.map_or(entry.index, |ack: u32| ack.max(entry.index)));
        }
        outcome
    }
}

/// A peer as seen by the tick loop
#[derive(Debug)]
pub struct ClientHandle {
    pub session: Session,
    inputs: mpsc::Receiver<Input>,
}

/// Manages all connected peers and the inputs waiting for the next tick
pub struct ClientManager {
    /// Connected peers indexed by remote address
    clients: HashMap<SocketAddr, ClientHandle>,
    /// Maximum number of concurrent peers allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a joined peer. Returns the handle back if the server is full.
    pub fn add_client(
        &mut self,
        session: Session,
        inputs: mpsc::Receiver<Input>,
    ) -> Result<(), ClientHandle> {
        let handle = ClientHandle { session, inputs };
        if self.clients.len() >= self.max_clients {
            return Err(handle);
        }

        let addr = handle.session.remote_addr();
        info!("Client {} connected", addr);
        self.clients.insert(addr, handle);
        Ok(())
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove_client(&mut self, addr: &SocketAddr) -> bool {
        if self.clients.remove(addr).is_some() {
            info!("Client {} disconnected", addr);
            true
        } else {
            false
        }
    }

    /// Drains every peer's queue into one input per peer for the coming tick
    ///
    /// Movement follows the most recent input; a shot fired in any drained input is kept so
    /// short taps between ticks are not lost. Peers with nothing queued are left out.
    pub fn collect_inputs(&mut self) -> HashMap<SocketAddr, Input> {
        let mut collected = HashMap::new();
        for (addr, client) in &mut self.clients {
            let mut merged: Option<Input> = None;
            while let Ok(input) = client.inputs.try_recv() {
                let fired = merged.is_some_and(|m| m.fires());
                let mut next = input;
                next.set(Input::SPACE, fired || input.fires());
                merged = Some(next);
            }
            if let Some(input) = merged {
                collected.insert(*addr, input);
            }
        }
        collected
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.clients.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn batch(entries: &[(u32, Input)]) -> Vec<IndexedInput> {
        entries
            .iter()
            .map(|&(index, input)| IndexedInput { index, input })
            .collect()
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(test_addr());
        assert_eq!(client.addr, test_addr());
        assert_eq!(client.last_processed_input, None);
    }

    #[test]
    fn test_first_batch_is_all_fresh() {
        let mut client = Client::new(test_addr());
        let outcome = client.accept_batch(&batch(&[(0, Input::UP), (1, Input::LEFT)]));
        assert_eq!(outcome.fresh, vec![Input::UP, Input::LEFT]);
        assert_eq!(outcome.ack, Some(1));
        assert_eq!(client.last_processed_input, Some(1));
    }

    #[test]
    fn test_overlapping_batches_are_deduplicated() {
        let mut client = Client::new(test_addr());
        client.accept_batch(&batch(&[(0, Input::UP), (1, Input::LEFT)]));

        let outcome = client.accept_batch(&batch(&[
            (0, Input::UP),
            (1, Input::LEFT),
            (2, Input::RIGHT),
        ]));
        assert_eq!(outcome.fresh, vec![Input::RIGHT]);
        assert_eq!(outcome.ack, Some(2));
    }

    #[test]
    fn test_stale_batch_still_acknowledged() {
        let mut client = Client::new(test_addr());
        client.accept_batch(&batch(&[(5, Input::UP)]));

        let outcome = client.accept_batch(&batch(&[(4, Input::DOWN), (5, Input::UP)]));
        assert!(outcome.fresh.is_empty());
        assert_eq!(outcome.ack, Some(5));
        assert_eq!(client.last_processed_input, Some(5));
    }

    #[test]
    fn test_empty_batch_has_no_ack() {
        let mut client = Client::new(test_addr());
        assert_eq!(client.accept_batch(&[]), BatchOutcome::default());
    }

    #[tokio::test]
    async fn test_collect_inputs_keeps_latest_and_fire() {
        let server = shared::Listener::bind("127.0.0.1:0", shared::ListenerConfig::default())
            .await
            .unwrap();
        let cancel = shared::CancellationToken::new();
        let session = shared::Listener::dial(&cancel, server.local_addr(), Default::default())
            .await
            .unwrap();

        let mut manager = ClientManager::new(4);
        let (tx, rx) = mpsc::channel(8);
        assert_ok!(manager.add_client(session.clone(), rx));
        assert_eq!(manager.len(), 1);

        tx.try_send(Input::UP | Input::SPACE).unwrap();
        tx.try_send(Input::LEFT).unwrap();
        let inputs = manager.collect_inputs();
        assert_eq!(inputs[&session.remote_addr()], Input::LEFT | Input::SPACE);

        assert!(manager.collect_inputs().is_empty());
        assert!(manager.remove_client(&session.remote_addr()));
        assert!(!manager.remove_client(&session.remote_addr()));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let server = shared::Listener::bind("127.0.0.1:0", shared::ListenerConfig::default())
            .await
            .unwrap();
        let cancel = shared::CancellationToken::new();
        let session = shared::Listener::dial(&cancel, server.local_addr(), Default::default())
            .await
            .unwrap();

        let mut manager = ClientManager::new(0);
        let (_tx, rx) = mpsc::channel(1);
        let rejected = manager.add_client(session, rx).unwrap_err();
        assert!(!manager.contains(&rejected.session.remote_addr()));
    }
}
