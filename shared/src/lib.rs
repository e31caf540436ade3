//! Types shared by the roster server and its clients: the entry model, the
//! roster operations clients apply, and the packets both ends exchange.

pub mod entry;
pub mod error;

pub use entry::{
    is_valid_label, synthetic_identity, GameMode, PatchFields, RosterEntry, RosterEntryBuilder,
    VisualRef, VisualSource,
};
pub use error::{EntryError, VisualError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 8192;
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const CLIENT_TIMEOUT_SECS: u64 = 5;

/// Connection-scoped client identifier assigned by the server
pub type ClientId = u32;

/// One incremental change to a client's displayed roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosterOp {
    /// Insert the entry, replacing any entry the client holds with the same identity
    Add(RosterEntry),
    /// Update fields that do not affect how the entry is presented
    Patch { identity: Uuid, fields: PatchFields },
    Remove(Uuid),
    RemoveMany(Vec<Uuid>),
}

impl RosterOp {
    pub fn is_add(&self) -> bool {
        matches!(self, RosterOp::Add(_))
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, RosterOp::Patch { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, RosterOp::Remove(_) | RosterOp::RemoveMany(_))
    }

    /// Identities touched by this operation
    pub fn identities(&self) -> Vec<Uuid> {
        match self {
            RosterOp::Add(entry) => vec![entry.identity()],
            RosterOp::Patch { identity, .. } | RosterOp::Remove(identity) => vec![*identity],
            RosterOp::RemoveMany(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
    },
    Heartbeat {
        timestamp: u64,
        latency_ms: u32,
    },
    Disconnect,

    Connected {
        client_id: ClientId,
        identity: Uuid,
    },
    HeartbeatAck {
        timestamp: u64,
    },
    Roster(RosterOp),
    HeaderFooter {
        header: String,
        footer: String,
    },
    Disconnected {
        reason: String,
    },
}
