//! # Shared Networking Core
//!
//! Everything both ends of the game need to talk to each other over UDP: the datagram
//! header codec, the session protocol that multiplexes peers on one socket, the input
//! jitter buffer, the application messages, and the world state with its interpolation.
//!
//! ## Module Organization
//!
//! ### Datagram (`datagram`)
//! Three-byte header (version, JOIN/LEAVE flags) ahead of an opaque payload.
//!
//! ### Listener (`listener`)
//! Join/leave session protocol with per-peer inboxes, a shared write queue, cancellation
//! on every blocking call, and idempotent close.
//!
//! ### Socket (`socket`)
//! The transport seam the listener reads and writes through, and a lossy wrapper for
//! fault-injection tests.
//!
//! ### Input and Jitter Buffer (`input`, `jitter`)
//! One-byte input bitsets and the client backlog of unacknowledged inputs that is resent
//! with every batch until the server acknowledges it.
//!
//! ### Messages and State (`message`, `state`)
//! Acks and indexed snapshots sent by the server, and the entity model with ID-correlated
//! interpolation used to render between snapshots.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use shared::{CancellationToken, Listener, ListenerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancellationToken::new();
//!     let listener = Listener::bind("127.0.0.1:8080", ListenerConfig::default()).await?;
//!
//!     let session = listener.accept(&cancel).await?;
//!     let ping = session.receive(&cancel).await?;
//!     session.send(&cancel, ping).await?;
//!
//!     listener.close(&cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod datagram;
pub mod error;
pub mod input;
pub mod jitter;
pub mod listener;
pub mod message;
pub mod socket;
pub mod state;

pub use config::{InboxOverflow, ListenerConfig, LogContext};
pub use datagram::{Datagram, Flags};
pub use error::{CodecError, MessageError, ProtocolError, SessionError};
pub use input::Input;
pub use jitter::{decode_batch, IndexedInput, InputBuffer};
pub use listener::{Listener, Session, SessionState, SessionStats};
pub use message::Message;
pub use socket::{DatagramSocket, LossConfig, LossySocket};
pub use state::{lerp, lerp_angle, Entity, State, Transform, Vec2};

pub use tokio_util::sync::CancellationToken;

pub const WORLD_WIDTH: f64 = 1920.0;
pub const WORLD_HEIGHT: f64 = 1080.0;
pub const PLAYER_SIZE: f64 = 80.0;
pub const BULLET_SIZE: f64 = 12.0;
pub const ASTEROID_SIZE: f64 = 96.0;
