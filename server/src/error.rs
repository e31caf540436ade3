//! Error types surfaced by the roster core and its transport

use shared::{ClientId, EntryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("invalid roster entry: {0}")]
    InvalidEntry(#[from] EntryError),

    #[error("no session registered for client {0}")]
    SessionNotFound(ClientId),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failure to hand a packet to the outbound path
///
/// These are logged by the caller and never propagated into registry or
/// session state.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("outbound queue is closed")]
    ChannelClosed,

    #[error("client {0} is not connected")]
    UnknownClient(ClientId),

    #[error("transport rejected packet for client {0}")]
    Rejected(ClientId),
}
