//! # Game Server Library
//!
//! Authoritative server for the networked asteroids game. It accepts peers over the shared
//! session protocol, folds their input batches into one simulation, and broadcasts an indexed
//! snapshot of the world every tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server owns the only real copy of the world. Clients send inputs, never positions,
//! and render whatever the snapshots say.
//!
//! ### Input Acknowledgement
//! Clients resend every unacknowledged input in each batch. The server deduplicates the
//! overlap, forwards only fresh inputs to the tick loop, and acknowledges the highest index
//! it has seen so the client can trim its jitter buffer.
//!
//! ### State Broadcasting
//! Each tick produces a `Snapshot { index, state }` sent to every joined peer. The index grows
//! by one per tick, which lets clients discard snapshots that arrive out of order.
//!
//! ## Architecture Design
//!
//! The server runs as a handful of cooperating tasks:
//! - **Accept loop**: waits for joining peers and hands each one to the tick loop
//! - **Receive loop** (one per peer): decodes batches, deduplicates, acknowledges
//! - **Tick loop**: applies joins and leaves, advances the simulation, broadcasts
//!
//! Fresh inputs reach the tick loop through a small bounded queue per peer; when a peer
//! floods faster than the tick rate, the surplus is dropped rather than buffered.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Per-peer deduplication state and the tick loop's table of joined peers.
//!
//! ### Network Module (`network`)
//! Server configuration, the accept and receive loops, and the tick loop itself.
//!
//! ### Simulation Module (`simulation`)
//! The `Simulation` trait the tick loop drives and `World`, the asteroids implementation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use server::simulation::World;
//! use shared::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080", ServerConfig::default(), World::default()).await?;
//!
//!     let shutdown = CancellationToken::new();
//!     server.run(shutdown).await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod simulation;
