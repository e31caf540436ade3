//! Connection bookkeeping for the UDP host
//!
//! This module tracks which socket address belongs to which client, the live
//! roster identity created for each connection, the latency each client last
//! reported, and when it was last heard from. It knows nothing about rosters;
//! the network layer turns its answers into coordinator calls.

use log::info;
use shared::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Identity of the live roster entry mirroring this client
    pub identity: Uuid,
    pub name: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Round trip time the client last reported
    pub latency_ms: u32,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr, name: String) -> Self {
        Self {
            id,
            addr,
            identity: Uuid::new_v4(),
            name,
            last_seen: Instant::now(),
            latency_ms: 0,
        }
    }

    /// Records activity and returns true if the reported latency changed
    pub fn touch(&mut self, latency_ms: u32) -> bool {
        self.last_seen = Instant::now();
        let changed = self.latency_ms != latency_ms;
        self.latency_ms = latency_ms;
        changed
    }

    /// Returns true if nothing was received from this client within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All connected clients, with a capacity limit and timeout detection
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    /// Client ids start from 1 and are never reused
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns the new client, or None if the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, name: String) -> Option<&Client> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, name, addr);
        let client = Client::new(client_id, addr, name);
        Some(self.clients.entry(client_id).or_insert(client))
    }

    /// Removes a client, returning it if it was still connected
    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&client_id)?;
        info!("Client {} ({}) disconnected", client.id, client.name);
        Some(client)
    }

    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Removes and returns every client that exceeded the timeout
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
