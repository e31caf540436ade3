use crate::rendering::Renderer;
use crate::roster::ClientRoster;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{ClientId, Packet, HEARTBEAT_INTERVAL_MS, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    name: String,
    client_id: Option<ClientId>,
    identity: Option<Uuid>,
    connected: bool,

    roster: ClientRoster,
    renderer: Renderer,
    roster_dirty: bool,

    ping_ms: u64,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(server_addr: &str, name: &str, fake_ping_ms: u64) -> Result<Self, BoxError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            name: name.to_string(),
            client_id: None,
            identity: None,
            connected: false,
            roster: ClientRoster::new(),
            renderer: Renderer::new(40),
            roster_dirty: false,
            ping_ms: 0,
            fake_ping_ms,
        })
    }

    pub fn roster(&self) -> &ClientRoster {
        &self.roster
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Identity of the live roster entry the server created for us
    pub fn identity(&self) -> Option<Uuid> {
        self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Round trip time measured from heartbeat acknowledgements
    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    async fn connect(&mut self) -> Result<(), BoxError> {
        info!("Connecting to server as {}...", self.name);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            name: self.name.clone(),
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), BoxError> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), BoxError> {
        if !self.connected {
            return Ok(());
        }

        let latency = (self.ping_ms + self.fake_ping_ms).min(u64::from(u32::MAX)) as u32;
        let packet = Packet::Heartbeat {
            timestamp: now_millis(),
            latency_ms: latency,
        };
        self.send_packet(&packet).await
    }

    /// Applies a packet from the server to the local state
    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                identity,
            } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.identity = Some(identity);
                self.connected = true;
            }

            Packet::Roster(op) => {
                debug!("Roster update touching {} entries", op.identities().len());
                self.roster.apply(&op);
                self.roster_dirty = true;
            }

            Packet::HeaderFooter { header, footer } => {
                self.roster.set_header_footer(header, footer);
                self.roster_dirty = true;
            }

            Packet::HeartbeatAck { timestamp } => {
                self.ping_ms = now_millis().saturating_sub(timestamp);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
                self.identity = None;
                self.roster.clear();
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Rendered roster lines, the same text [`run`](Self::run) logs
    pub fn render(&self) -> Vec<String> {
        self.renderer.render(&self.roster, self.identity)
    }

    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.connect().await?;

        let mut heartbeat_interval = interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
        let mut render_interval = interval(Duration::from_secs(1));

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(Packet::Disconnected { reason }) => {
                                    self.handle_packet(Packet::Disconnected { reason });
                                    break;
                                }
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        error!("Error sending heartbeat: {}", e);
                    }
                },

                _ = render_interval.tick() => {
                    if self.roster_dirty {
                        self.roster_dirty = false;
                        for line in self.render() {
                            info!("{}", line);
                        }
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, leaving");
                    break;
                }
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{RosterEntry, RosterOp};
    use tokio_test::assert_ok;

    async fn test_client() -> Client {
        assert_ok!(Client::new("127.0.0.1:9", "Steve", 0).await)
    }

    #[tokio::test]
    async fn test_connected_sets_identity() {
        let mut client = test_client().await;
        let identity = Uuid::new_v4();

        client.handle_packet(Packet::Connected {
            client_id: 3,
            identity,
        });

        assert!(client.is_connected());
        assert_eq!(client.client_id(), Some(3));
        assert_eq!(client.identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_roster_packets_update_mirror() {
        let mut client = test_client().await;
        let entry = RosterEntry::builder().label("Alice").build().unwrap();

        client.handle_packet(Packet::Roster(RosterOp::Add(entry.clone())));
        client.handle_packet(Packet::HeaderFooter {
            header: "Hi".to_string(),
            footer: String::new(),
        });

        assert_eq!(client.roster().len(), 1);
        assert_eq!(client.roster().header(), "Hi");
        assert!(client.render().iter().any(|line| line.contains("Alice")));
    }

    #[tokio::test]
    async fn test_heartbeat_ack_measures_ping() {
        let mut client = test_client().await;
        client.handle_packet(Packet::HeartbeatAck {
            timestamp: now_millis().saturating_sub(25),
        });

        assert!(client.ping_ms() >= 25);
        assert!(client.ping_ms() < 5_000);
    }

    #[tokio::test]
    async fn test_disconnected_clears_state() {
        let mut client = test_client().await;
        client.handle_packet(Packet::Connected {
            client_id: 1,
            identity: Uuid::new_v4(),
        });
        client.handle_packet(Packet::Roster(RosterOp::Add(
            RosterEntry::builder().label("Alice").build().unwrap(),
        )));

        client.handle_packet(Packet::Disconnected {
            reason: "Server full".to_string(),
        });

        assert!(!client.is_connected());
        assert!(client.roster().is_empty());
    }
}
