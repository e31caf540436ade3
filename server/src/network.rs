//! Server network layer: UDP communication and the roster event loop
//!
//! Three background tasks feed the main loop: a receiver decoding incoming
//! datagrams, a sender draining the outbound queue the roster core writes to,
//! and a timeout checker. The main loop turns connection events into
//! registry and coordinator calls.

use crate::client_manager::{Client, ClientManager};
use crate::config::RosterConfig;
use crate::coordinator::RosterCoordinator;
use crate::registry::GlobalRegistry;
use crate::transport::{ChannelTransport, OutboundMessage};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, RosterEntry, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client: Client },
    Shutdown,
}

/// UDP host around a [`RosterCoordinator`]
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    coordinator: Arc<RosterCoordinator>,
    config: RosterConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
}

impl Server {
    /// Binds the socket and seeds the global layer with the configured entries
    pub async fn new(addr: &str, config: RosterConfig) -> Result<Self, BoxError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let registry = Arc::new(GlobalRegistry::new());
        registry.initialize(config.build_entries()?);

        let coordinator = Arc::new(RosterCoordinator::new(
            registry,
            Arc::new(ChannelTransport::new(outbound_tx.clone())),
            config.session_defaults(),
        ));

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_clients,
                config.client_timeout(),
            ))),
            coordinator,
            config,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn coordinator(&self) -> Arc<RosterCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Sending [`ServerMessage::Shutdown`] on this stops [`run`](Self::run)
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outbound queue onto the socket
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            warn!("Network sender already running");
            return;
        };
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let (addr, packet) = match message {
                    OutboundMessage::SendPacket { client_id, packet } => {
                        let addr = clients.read().await.addr_of(client_id);
                        match addr {
                            Some(addr) => (addr, packet),
                            None => {
                                debug!("Dropping packet for departed client {}", client_id);
                                continue;
                            }
                        }
                    }
                    OutboundMessage::SendTo { addr, packet } => (addr, packet),
                };

                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let data = serialize(packet)?;
        if data.len() > MAX_PACKET_SIZE {
            warn!(
                "Packet of {} bytes to {} exceeds the datagram limit",
                data.len(),
                addr
            );
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue(&self, message: OutboundMessage) {
        if let Err(e) = self.outbound_tx.send(message) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn reject(&self, addr: SocketAddr, reason: &str) {
        self.queue(OutboundMessage::SendTo {
            addr,
            packet: Packet::Disconnected {
                reason: reason.to_string(),
            },
        });
    }

    /// Processes an incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                name,
            } => {
                info!(
                    "Client {} connecting from {} (version: {})",
                    name, addr, client_version
                );
                self.handle_connect(client_version, name, addr).await;
            }

            Packet::Heartbeat {
                timestamp,
                latency_ms,
            } => {
                let updated = {
                    let mut clients = self.clients.write().await;
                    let Some(client_id) = clients.find_client_by_addr(addr) else {
                        debug!("Heartbeat from unknown peer {}", addr);
                        return;
                    };
                    clients.get_mut(client_id).map(|client| {
                        (client.id, client.identity, client.touch(latency_ms))
                    })
                };

                if let Some((client_id, identity, changed)) = updated {
                    if changed {
                        self.update_latency(identity, latency_ms);
                    }
                    self.queue(OutboundMessage::SendPacket {
                        client_id,
                        packet: Packet::HeartbeatAck { timestamp },
                    });
                }
            }

            Packet::Disconnect => {
                let client = {
                    let mut clients = self.clients.write().await;
                    clients
                        .find_client_by_addr(addr)
                        .and_then(|id| clients.remove_client(id))
                };

                if let Some(client) = client {
                    self.drop_roster(&client);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, name: String, addr: SocketAddr) {
        if client_version != PROTOCOL_VERSION {
            self.reject(addr, "Protocol version mismatch");
            return;
        }

        // Remove existing connection if present
        let existing = {
            let mut clients = self.clients.write().await;
            clients
                .find_client_by_addr(addr)
                .and_then(|id| clients.remove_client(id))
        };
        if let Some(existing) = existing {
            info!("Removing existing client {} from {}", existing.id, addr);
            self.drop_roster(&existing);
        }

        let added = {
            let mut clients = self.clients.write().await;
            clients
                .add_client(addr, name.clone())
                .map(|client| (client.id, client.identity))
        };
        let Some((client_id, identity)) = added else {
            self.reject(addr, "Server full");
            return;
        };

        let entry = match RosterEntry::live(identity, name).build() {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Rejecting client {}: {}", client_id, e);
                self.clients.write().await.remove_client(client_id);
                self.reject(addr, "Invalid name");
                return;
            }
        };

        self.queue(OutboundMessage::SendPacket {
            client_id,
            packet: Packet::Connected {
                client_id,
                identity,
            },
        });

        self.coordinator.registry().upsert(entry);
        self.coordinator.register_client(client_id);

        if self.config.hide_player_join {
            if let Err(e) = self.coordinator.hide_from_others(identity, client_id) {
                warn!("Could not hide client {} on join: {}", client_id, e);
            }
        }
    }

    fn update_latency(&self, identity: uuid::Uuid, latency_ms: u32) {
        let registry = self.coordinator.registry();
        let Some(current) = registry.find(identity) else {
            return;
        };

        match current
            .to_builder()
            .latency_ms(i64::from(latency_ms))
            .build()
        {
            Ok(entry) => registry.upsert(entry),
            Err(e) => warn!("Could not update latency of {}: {}", identity, e),
        }
    }

    /// Tears down the roster state of a departed client
    fn drop_roster(&self, client: &Client) {
        self.coordinator.unregister_client(client.id);
        self.coordinator.registry().remove(client.identity);
        // Hide-on-join overrides would otherwise outlive the entry
        self.coordinator.forget_identity(client.identity);
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.coordinator.client_ids()
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let refresh_enabled = self.config.refresh_interval_secs > 0;
        let mut refresh_interval =
            interval(Duration::from_secs(self.config.refresh_interval_secs.max(1)));
        refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately
        refresh_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client }) => {
                            info!("Client {} timed out", client.id);
                            self.drop_roster(&client);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = refresh_interval.tick(), if refresh_enabled => {
                    debug!("Periodic refresh for {} sessions", self.coordinator.session_count());
                    self.coordinator.registry().refresh();
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::RosterOp;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio_test::assert_ok;

    async fn test_server(config: RosterConfig) -> Server {
        Server::new("127.0.0.1:0", config).await.unwrap()
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn connect(name: &str) -> Packet {
        Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: name.to_string(),
        }
    }

    fn drain(server: &mut Server) -> Vec<OutboundMessage> {
        let rx = server.outbound_rx.as_mut().unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_connect_creates_live_entry_and_session() {
        let mut server = test_server(RosterConfig::default()).await;
        server.handle_packet(connect("Steve"), peer(9001)).await;

        let coordinator = server.coordinator();
        assert_eq!(coordinator.session_count(), 1);
        let entry = coordinator.registry().find_by_label("Steve").unwrap();
        assert!(entry.is_live());

        let messages = drain(&mut server);
        match &messages[0] {
            OutboundMessage::SendPacket {
                packet: Packet::Connected { identity, .. },
                ..
            } => assert_eq!(*identity, entry.identity()),
            other => panic!("expected connected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let mut server = test_server(RosterConfig::default()).await;
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            name: "Steve".to_string(),
        };
        server.handle_packet(packet, peer(9001)).await;

        assert_eq!(server.coordinator().session_count(), 0);
        let messages = drain(&mut server);
        assert!(matches!(
            &messages[0],
            OutboundMessage::SendTo { packet: Packet::Disconnected { reason }, .. }
                if reason == "Protocol version mismatch"
        ));
    }

    #[tokio::test]
    async fn test_server_full() {
        let config = RosterConfig {
            max_clients: 1,
            ..RosterConfig::default()
        };
        let mut server = test_server(config).await;
        server.handle_packet(connect("Alice"), peer(9001)).await;
        drain(&mut server);
        server.handle_packet(connect("Bob"), peer(9002)).await;

        assert_eq!(server.client_ids(), vec![1]);
        let messages = drain(&mut server);
        assert!(matches!(
            &messages[0],
            OutboundMessage::SendTo { packet: Packet::Disconnected { reason }, .. }
                if reason == "Server full"
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_updates_latency_and_acks() {
        let mut server = test_server(RosterConfig::default()).await;
        server.handle_packet(connect("Steve"), peer(9001)).await;
        drain(&mut server);

        let heartbeat = Packet::Heartbeat {
            timestamp: 77,
            latency_ms: 42,
        };
        server.handle_packet(heartbeat, peer(9001)).await;

        let entry = server.coordinator().registry().find_by_label("Steve").unwrap();
        assert_eq!(entry.latency_ms(), 42);

        let messages = drain(&mut server);
        assert!(messages.iter().any(|m| matches!(
            m,
            OutboundMessage::SendPacket { packet: Packet::HeartbeatAck { timestamp: 77 }, .. }
        )));
    }

    #[tokio::test]
    async fn test_disconnect_removes_roster_state() {
        let mut server = test_server(RosterConfig::default()).await;
        server.handle_packet(connect("Steve"), peer(9001)).await;
        server.handle_packet(Packet::Disconnect, peer(9001)).await;

        let coordinator = server.coordinator();
        assert_eq!(coordinator.session_count(), 0);
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_from_same_address_replaces_client() {
        let mut server = test_server(RosterConfig::default()).await;
        server.handle_packet(connect("Steve"), peer(9001)).await;
        server.handle_packet(connect("Steve"), peer(9001)).await;

        assert_eq!(server.client_ids(), vec![2]);
        assert_eq!(server.coordinator().registry().len(), 1);
    }

    #[tokio::test]
    async fn test_hide_player_join() {
        let config = RosterConfig {
            hide_player_join: true,
            ..RosterConfig::default()
        };
        let mut server = test_server(config).await;
        server.handle_packet(connect("Alice"), peer(9001)).await;
        server.handle_packet(connect("Bob"), peer(9002)).await;

        let coordinator = server.coordinator();
        let bob = coordinator.registry().find_by_label("Bob").unwrap();
        let alice_view = coordinator.session(1).unwrap().find(bob.identity()).unwrap();
        let bob_view = coordinator.session(2).unwrap().find(bob.identity()).unwrap();

        assert!(!alice_view.is_listed());
        assert!(bob_view.is_listed());
    }

    #[tokio::test]
    async fn test_hidden_joiner_leaves_no_override_behind() {
        let config = RosterConfig {
            hide_player_join: true,
            ..RosterConfig::default()
        };
        let mut server = test_server(config).await;
        server.handle_packet(connect("Alice"), peer(9001)).await;
        server.handle_packet(connect("Bob"), peer(9002)).await;
        let bob = server
            .coordinator()
            .registry()
            .find_by_label("Bob")
            .unwrap()
            .identity();
        drain(&mut server);

        server.handle_packet(Packet::Disconnect, peer(9002)).await;

        let alice = server.coordinator().session(1).unwrap();
        assert!(alice.find(bob).is_none());
        assert!(alice.overrides().is_empty());
        assert_eq!(alice.visible_count(), 1);

        let to_alice: Vec<RosterOp> = drain(&mut server)
            .into_iter()
            .filter_map(|message| match message {
                OutboundMessage::SendPacket {
                    client_id: 1,
                    packet: Packet::Roster(op),
                } => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(to_alice, vec![RosterOp::Remove(bob)]);
    }

    #[tokio::test]
    async fn test_configured_entries_are_seeded() {
        let config = RosterConfig::from_toml_str(
            r#"
            [[entries]]
            label = "Shop_Bot"
            "#,
        )
        .unwrap();
        let server = test_server(config).await;

        assert!(server.coordinator().registry().contains_label("Shop_Bot"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut server = test_server(RosterConfig::default()).await;
        let shutdown = server.shutdown_sender();
        shutdown.send(ServerMessage::Shutdown).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        assert_ok!(assert_ok!(result));
    }
}
