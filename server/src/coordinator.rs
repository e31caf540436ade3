//! Session lifecycle and server-wide roster broadcasts
//!
//! The [`RosterCoordinator`] is the entry point hosts use: it registers and
//! unregisters clients against the [`GlobalRegistry`], hands out their
//! [`ClientSession`]s, and applies settings to every session at once.

use crate::error::RosterError;
use crate::registry::GlobalRegistry;
use crate::session::{ClientSession, HeaderFooter, SessionDefaults};
use crate::transport::Transport;
use log::{debug, info, warn};
use parking_lot::Mutex;
use shared::ClientId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle notifications for observers such as the host's logging or
/// statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterEvent {
    Joined(ClientId),
    Left(ClientId),
}

const EVENT_CAPACITY: usize = 64;

pub struct RosterCoordinator {
    registry: Arc<GlobalRegistry>,
    sessions: Mutex<HashMap<ClientId, Arc<ClientSession>>>,
    defaults: Arc<SessionDefaults>,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<RosterEvent>,
}

impl RosterCoordinator {
    pub fn new(
        registry: Arc<GlobalRegistry>,
        transport: Arc<dyn Transport>,
        defaults: SessionDefaults,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
            defaults: Arc::new(defaults),
            transport,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<GlobalRegistry> {
        &self.registry
    }

    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    /// Creates a session for `client_id` and sends it the current roster.
    ///
    /// Registering an id that already has a session replaces it; the old
    /// session is invalidated and ignores every later call.
    pub fn register_client(&self, client_id: ClientId) -> Arc<ClientSession> {
        let mut sessions = self.sessions.lock();

        let transport = Arc::clone(&self.transport);
        let defaults = Arc::clone(&self.defaults);
        let (session, replaced) = self.registry.attach(client_id, |global| {
            ClientSession::new(client_id, transport, defaults, global)
        });
        sessions.insert(client_id, Arc::clone(&session));
        drop(sessions);

        // No receivers is fine
        if replaced.is_some() {
            warn!("Client {} registered twice, replaced its session", client_id);
            let _ = self.events.send(RosterEvent::Left(client_id));
        } else {
            info!("Registered roster session for client {}", client_id);
        }
        let _ = self.events.send(RosterEvent::Joined(client_id));

        session
    }

    /// Drops the session of `client_id`. Unknown ids are ignored.
    pub fn unregister_client(&self, client_id: ClientId) {
        let mut sessions = self.sessions.lock();
        if sessions.remove(&client_id).is_none() {
            debug!("Client {} has no roster session", client_id);
            return;
        }
        self.registry.detach(client_id);
        drop(sessions);

        info!("Unregistered roster session for client {}", client_id);
        let _ = self.events.send(RosterEvent::Left(client_id));
    }

    pub fn session(&self, client_id: ClientId) -> Result<Arc<ClientSession>, RosterError> {
        self.sessions
            .lock()
            .get(&client_id)
            .cloned()
            .ok_or(RosterError::SessionNotFound(client_id))
    }

    fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Sets the visibility of every session and makes it the default for
    /// sessions created later
    pub fn broadcast_visibility(&self, visible: bool) {
        self.defaults.set_visible(visible);
        let sessions = self.snapshot();
        for session in &sessions {
            session.set_visible(visible);
        }
        info!(
            "Roster {} for {} sessions",
            if visible { "shown" } else { "hidden" },
            sessions.len()
        );
    }

    /// Sets the header and footer of every session and makes them the default
    pub fn broadcast_header_footer(&self, header: Option<String>, footer: Option<String>) {
        self.defaults
            .set_header_footer(HeaderFooter::new(header.clone(), footer.clone()));
        for session in self.snapshot() {
            session.set_header_footer(header.clone(), footer.clone());
        }
    }

    /// Hides `identity` from every session except `except` by overriding it
    /// with an unlisted copy
    pub fn hide_from_others(&self, identity: Uuid, except: ClientId) -> Result<(), RosterError> {
        let mut hidden = 0;
        for session in self.snapshot() {
            if session.client_id() == except {
                continue;
            }
            if session.unlist(identity)? {
                hidden += 1;
            }
        }
        debug!("Hid {} from {} sessions", identity, hidden);
        Ok(())
    }

    /// Drops every session's override for `identity`. Hosts call this once the
    /// entity behind a live entry is gone, after removing it from the registry,
    /// so no session keeps showing an override of an entry that left.
    pub fn forget_identity(&self, identity: Uuid) -> usize {
        let forgotten = self
            .snapshot()
            .iter()
            .filter(|session| session.remove_override(identity).is_some())
            .count();
        if forgotten > 0 {
            debug!("Dropped {} overrides of departed {}", forgotten, identity);
        }
        forgotten
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }
}
