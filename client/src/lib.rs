//! # Roster Client Library
//!
//! A headless client for the roster server. It connects over UDP, reports
//! its latency through heartbeats, and mirrors whatever roster the server
//! decides to show it.
//!
//! ## Module Organization
//!
//! ### Roster Module (`roster`)
//! The local mirror. Applies `Add`, `Patch`, `Remove` and batch remove
//! operations exactly as received; it never infers state on its own.
//!
//! ### Network Module (`network`)
//! Socket handling, the heartbeat loop and round trip measurement.
//!
//! ### Rendering Module (`rendering`)
//! Formats the mirror as text lines with a latency indicator per entry.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::roster::ClientRoster;
//! use shared::{RosterEntry, RosterOp};
//!
//! let mut roster = ClientRoster::new();
//! let entry = RosterEntry::builder().label("Alice").build().unwrap();
//! roster.apply(&RosterOp::Add(entry.clone()));
//! roster.apply(&RosterOp::Remove(entry.identity()));
//! assert!(roster.is_empty());
//! ```

pub mod network;
pub mod rendering;
pub mod roster;
