//! # Roster Server Library
//!
//! This library keeps a displayed roster for every connected client and keeps
//! each client converged with as little traffic as possible.
//!
//! ## Layers
//!
//! ### Global Layer
//! The [`GlobalRegistry`](registry::GlobalRegistry) holds entries every client
//! sees by default: live participants and server-defined synthetic entries.
//! Every mutation is fanned out to all sessions, in mutation order.
//!
//! ### Per-Client Layer
//! Each [`ClientSession`](session::ClientSession) adds private overrides on top
//! of the global layer. An override shadows the global entry with the same
//! identity for that client only. Sessions also own the client's visibility
//! flag and header/footer text.
//!
//! ### Operation Selection
//! Labels and appearance cannot be patched on a client, so the
//! [`tracker`] module remembers what each client was last given and picks
//! between an in-place patch and a remove + add pair.
//!
//! ## Module Organization
//!
//! - `registry`, `session`, `coordinator`, `tracker`: the roster core
//! - `transport`: the outbound path the core writes packets to
//! - `network`, `client_manager`: the UDP host around the core
//! - `config`, `visual`: startup configuration and appearance lookup
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RosterConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new("127.0.0.1:8080", RosterConfig::default()).await?;
//!
//!     // Seed an entry every client will see
//!     let coordinator = server.coordinator();
//!     coordinator
//!         .registry()
//!         .upsert(shared::RosterEntry::builder().label("Shop_Bot").build()?);
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Embedding hosts that bring their own networking construct a
//! [`RosterCoordinator`](coordinator::RosterCoordinator) directly with any
//! [`Transport`](transport::Transport).

pub mod client_manager;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod registry;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod visual;

pub use coordinator::{RosterCoordinator, RosterEvent};
pub use error::{RosterError, TransportError};
pub use registry::{GlobalChange, GlobalRegistry};
pub use session::{ClientSession, HeaderFooter, SessionDefaults};
pub use tracker::{select_actions, ChangeTracker};
pub use transport::{ChannelTransport, OutboundMessage, RecordingTransport, Transport};
