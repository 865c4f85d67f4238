//! # Game Client Library
//!
//! Client side of the networked asteroids game. The client never simulates the world itself:
//! it sends inputs, renders whatever the server says, and smooths between snapshots.
//!
//! ## Architecture Overview
//!
//! ### Input Jitter Buffer
//! Every frame the sampled input is appended to a backlog and the whole unacknowledged backlog
//! is sent in one datagram. A lost datagram costs nothing as long as a later one arrives; the
//! server's acks trim the backlog.
//!
//! ### Snapshot Interpolation
//! Snapshots arrive at the server's tick rate, far below the frame rate. The client keeps the
//! last two, stamped with their local arrival time, and renders a blend of them. Stale or
//! reordered snapshots are dropped by index.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The `Reconciler` holding the two most recent snapshots and computing the blend.
//!
//! ### Input Module (`input`)
//! Keyboard sampling (WASD or arrows, Space to fire) into the shared `Input` bitset.
//!
//! ### Network Module (`network`)
//! The `Client` connection: dialing, the background receive loop, and the per-frame update.
//!
//! ### Rendering Module (`rendering`)
//! A macroquad renderer for ships, bullets, asteroids and the score.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use shared::{CancellationToken, Input};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect("127.0.0.1:8080", ClientConfig::default()).await?;
//!
//!     // once per frame
//!     if let Some(state) = client.update(Input::UP) {
//!         println!("{} players", state.players.len());
//!     }
//!
//!     client.close(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
