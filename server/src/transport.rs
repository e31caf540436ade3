//! Outbound packet path from the roster core to connected clients
//!
//! The core never touches sockets. Every packet it wants delivered goes through
//! a [`Transport`], which must not block: [`ChannelTransport`] pushes onto an
//! unbounded queue drained by the network sender task, [`RecordingTransport`]
//! keeps packets in memory for embedding hosts and tests.

use crate::error::TransportError;
use parking_lot::Mutex;
use shared::{ClientId, Packet, RosterOp};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

pub trait Transport: Send + Sync {
    /// Queues `packet` for `client_id`. Returning means the packet was handed
    /// off, not that the client received it.
    fn send(&self, client_id: ClientId, packet: Packet) -> Result<(), TransportError>;
}

/// Messages sent from the roster core to the network sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { client_id: ClientId, packet: Packet },
    /// For peers that never got a client id, e.g. a rejected connect
    SendTo { addr: SocketAddr, packet: Packet },
}

/// Transport backed by the network sender task's queue
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, client_id: ClientId, packet: Packet) -> Result<(), TransportError> {
        self.tx
            .send(OutboundMessage::SendPacket { client_id, packet })
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// In-memory transport that records every packet in send order
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ClientId, Packet)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send is rejected and nothing is recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Drains everything recorded so far
    pub fn take(&self) -> Vec<(ClientId, Packet)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Drains the roster operations sent to `client_id`, leaving packets for
    /// other clients in place
    pub fn take_ops(&self, client_id: ClientId) -> Vec<RosterOp> {
        let mut sent = self.sent.lock();
        let mut ops = Vec::new();
        sent.retain(|(id, packet)| match packet {
            Packet::Roster(op) if *id == client_id => {
                ops.push(op.clone());
                false
            }
            _ => true,
        });
        ops
    }

    pub fn packets_for(&self, client_id: ClientId) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| *id == client_id)
            .map(|(_, packet)| packet.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, client_id: ClientId, packet: Packet) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(client_id));
        }
        self.sent.lock().push((client_id, packet));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_channel_transport_queues_packets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(tx);

        let id = Uuid::new_v4();
        assert!(transport.send(7, Packet::Roster(RosterOp::Remove(id))).is_ok());

        match rx.try_recv().unwrap() {
            OutboundMessage::SendPacket { client_id, packet } => {
                assert_eq!(client_id, 7);
                assert!(matches!(packet, Packet::Roster(RosterOp::Remove(r)) if r == id));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_channel_transport_reports_closed_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let transport = ChannelTransport::new(tx);

        let result = transport.send(1, Packet::Disconnect);
        assert!(matches!(result, Err(TransportError::ChannelClosed)));
    }

    #[test]
    fn test_recording_transport_take_ops_filters_by_client() {
        let transport = RecordingTransport::new();
        let id = Uuid::new_v4();

        transport.send(1, Packet::Roster(RosterOp::Remove(id))).unwrap();
        transport.send(2, Packet::Roster(RosterOp::Remove(id))).unwrap();
        transport
            .send(
                1,
                Packet::HeaderFooter {
                    header: "h".to_string(),
                    footer: String::new(),
                },
            )
            .unwrap();

        assert_eq!(transport.take_ops(1), vec![RosterOp::Remove(id)]);
        assert_eq!(transport.len(), 2);
        assert_eq!(transport.packets_for(2).len(), 1);
    }

    #[test]
    fn test_recording_transport_failure_mode() {
        let transport = RecordingTransport::new();
        transport.set_failing(true);

        assert!(transport.send(1, Packet::Disconnect).is_err());
        assert!(transport.is_empty());

        transport.set_failing(false);
        assert!(transport.send(1, Packet::Disconnect).is_ok());
        assert_eq!(transport.len(), 1);
    }
}
