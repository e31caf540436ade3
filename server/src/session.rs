//! Per-client roster state
//!
//! A [`ClientSession`] owns everything one client sees: its visibility flag,
//! its private override entries and their trackers, its header/footer, and a
//! mirror of the global layer kept current by registry notifications. The
//! mirror lets a session compose its view without ever reaching back into the
//! registry while its own lock is held.

use crate::registry::GlobalChange;
use crate::tracker::{select_actions, ChangeTracker};
use crate::transport::Transport;
use log::{debug, warn};
use parking_lot::Mutex;
use shared::{ClientId, EntryError, Packet, RosterEntry, RosterOp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Text shown above and below the roster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFooter {
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl HeaderFooter {
    pub fn new(header: Option<String>, footer: Option<String>) -> Self {
        Self { header, footer }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.footer.is_none()
    }

    fn to_packet(&self) -> Packet {
        Packet::HeaderFooter {
            header: self.header.clone().unwrap_or_default(),
            footer: self.footer.clone().unwrap_or_default(),
        }
    }
}

/// Server-wide defaults new sessions start from and resets fall back to
#[derive(Debug)]
pub struct SessionDefaults {
    visible: AtomicBool,
    header_footer: Mutex<HeaderFooter>,
}

impl SessionDefaults {
    pub fn new(visible: bool, header_footer: HeaderFooter) -> Self {
        Self {
            visible: AtomicBool::new(visible),
            header_footer: Mutex::new(header_footer),
        }
    }

    pub fn visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn header_footer(&self) -> HeaderFooter {
        self.header_footer.lock().clone()
    }

    pub fn set_header_footer(&self, header_footer: HeaderFooter) {
        *self.header_footer.lock() = header_footer;
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self::new(true, HeaderFooter::default())
    }
}

struct SessionState {
    valid: bool,
    visible: bool,
    /// Set by a reset: global entries that are not live are no longer shown
    baseline_only: bool,
    global: HashMap<Uuid, RosterEntry>,
    overrides: HashMap<Uuid, RosterEntry>,
    trackers: HashMap<Uuid, ChangeTracker>,
    header_footer: HeaderFooter,
}

impl SessionState {
    fn shows_global(&self, entry: &RosterEntry) -> bool {
        !self.baseline_only || entry.is_live()
    }

    fn composed(&self, identity: &Uuid) -> Option<&RosterEntry> {
        self.overrides.get(identity).or_else(|| {
            self.global
                .get(identity)
                .filter(|entry| self.shows_global(entry))
        })
    }

    fn composed_view(&self) -> Vec<RosterEntry> {
        let mut view: Vec<RosterEntry> = self
            .global
            .values()
            .filter(|entry| {
                !self.overrides.contains_key(&entry.identity()) && self.shows_global(entry)
            })
            .chain(self.overrides.values())
            .cloned()
            .collect();
        view.sort_by(RosterEntry::display_order);
        view
    }

    fn retrack_overrides(&mut self) {
        self.trackers = self
            .overrides
            .iter()
            .map(|(identity, entry)| (*identity, ChangeTracker::new(entry)))
            .collect();
    }
}

/// Roster state and outbound operations for one connected client
pub struct ClientSession {
    client_id: ClientId,
    transport: Arc<dyn Transport>,
    defaults: Arc<SessionDefaults>,
    state: Mutex<SessionState>,
}

impl ClientSession {
    /// Creates a session seeded with the current global entries. Nothing is
    /// sent until [`welcome`](Self::welcome).
    pub fn new(
        client_id: ClientId,
        transport: Arc<dyn Transport>,
        defaults: Arc<SessionDefaults>,
        global: Vec<RosterEntry>,
    ) -> Self {
        let state = SessionState {
            valid: true,
            visible: defaults.visible(),
            baseline_only: false,
            global: global
                .into_iter()
                .map(|entry| (entry.identity(), entry))
                .collect(),
            overrides: HashMap::new(),
            trackers: HashMap::new(),
            header_footer: defaults.header_footer(),
        };

        Self {
            client_id,
            transport,
            defaults,
            state: Mutex::new(state),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Marks the session as gone. Every later mutation becomes a no-op.
    pub(crate) fn invalidate(&self) {
        self.state.lock().valid = false;
    }

    pub fn is_visible(&self) -> bool {
        self.state.lock().visible
    }

    fn transmit(&self, op: RosterOp) {
        self.send_packet(Packet::Roster(op));
    }

    fn send_packet(&self, packet: Packet) {
        if let Err(e) = self.transport.send(self.client_id, packet) {
            warn!("Failed to send to client {}: {}", self.client_id, e);
        }
    }

    /// Sends the initial roster and header/footer to a freshly registered client
    pub(crate) fn welcome(&self) {
        let state = self.state.lock();
        if !state.valid {
            return;
        }

        if state.visible {
            for entry in state.composed_view() {
                self.transmit(RosterOp::Add(entry));
            }
        }

        if !state.header_footer.is_empty() {
            self.send_packet(state.header_footer.to_packet());
        }
    }

    /// Shows or hides the whole roster for this client.
    ///
    /// Only edges do anything: hiding removes every composed entry in one
    /// batch, showing sends every composed entry as a full add.
    pub fn set_visible(&self, visible: bool) {
        let mut state = self.state.lock();
        if !state.valid || state.visible == visible {
            return;
        }
        state.visible = visible;

        let view = state.composed_view();
        if visible {
            for entry in view {
                self.transmit(RosterOp::Add(entry));
            }
            state.retrack_overrides();
        } else {
            let identities: Vec<Uuid> = view.iter().map(RosterEntry::identity).collect();
            if !identities.is_empty() {
                self.transmit(RosterOp::RemoveMany(identities));
            }
        }

        debug!(
            "Roster {} for client {}",
            if visible { "shown" } else { "hidden" },
            self.client_id
        );
    }

    pub fn add_override(&self, entry: RosterEntry) {
        self.apply_override(entry, "Added");
    }

    pub fn update_override(&self, entry: RosterEntry) {
        self.apply_override(entry, "Updated");
    }

    /// Overrides the displayed entry for `identity` with an unlisted copy of
    /// itself. Returns `false` when this session shows nothing for it.
    pub fn unlist(&self, identity: Uuid) -> Result<bool, EntryError> {
        let mut state = self.state.lock();
        if !state.valid {
            return Ok(false);
        }
        let Some(shown) = state.composed(&identity) else {
            return Ok(false);
        };

        let unlisted = shown.to_builder().listed(false).build()?;
        self.override_locked(&mut state, unlisted, "Unlisted");
        Ok(true)
    }

    fn apply_override(&self, entry: RosterEntry, verb: &str) {
        let mut state = self.state.lock();
        if !state.valid {
            return;
        }
        self.override_locked(&mut state, entry, verb);
    }

    fn override_locked(&self, state: &mut SessionState, entry: RosterEntry, verb: &str) {
        let identity = entry.identity();
        // What the client holds for this identity right now, if anything
        let tracker = match state.trackers.remove(&identity) {
            Some(tracker) => Some(tracker),
            None => state.composed(&identity).map(ChangeTracker::new),
        };

        state.overrides.insert(identity, entry.clone());

        if !state.visible {
            state.trackers.insert(identity, ChangeTracker::new(&entry));
        } else if let Some(mut tracker) = tracker {
            for op in select_actions(&entry, &tracker) {
                self.transmit(op);
            }
            tracker.commit(&entry);
            state.trackers.insert(identity, tracker);
        } else {
            self.transmit(RosterOp::Add(entry.clone()));
            state.trackers.insert(identity, ChangeTracker::new(&entry));
        }

        debug!(
            "{} override for client {}: {} ({})",
            verb,
            self.client_id,
            entry.label(),
            identity
        );
    }

    /// Drops an override. Returns the removed entry, or `None` if this
    /// session had no override for `identity`.
    ///
    /// If the override was shadowing a global entry the client falls back to
    /// that entry.
    pub fn remove_override(&self, identity: Uuid) -> Option<RosterEntry> {
        let mut state = self.state.lock();
        if !state.valid {
            return None;
        }

        let removed = state.overrides.remove(&identity)?;
        state.trackers.remove(&identity);

        if state.visible {
            self.transmit(RosterOp::Remove(identity));
            if let Some(global) = state.composed(&identity) {
                self.transmit(RosterOp::Add(global.clone()));
            }
        }

        debug!(
            "Removed override for client {}: {} ({})",
            self.client_id,
            removed.label(),
            identity
        );
        Some(removed)
    }

    /// Drops every override, restoring any global entries they shadowed
    pub fn clear_overrides(&self) {
        let mut state = self.state.lock();
        if !state.valid || state.overrides.is_empty() {
            return;
        }

        let identities: Vec<Uuid> = state.overrides.drain().map(|(id, _)| id).collect();
        state.trackers.clear();

        if state.visible {
            self.transmit(RosterOp::RemoveMany(identities.clone()));
            for identity in &identities {
                if let Some(global) = state.composed(identity) {
                    self.transmit(RosterOp::Add(global.clone()));
                }
            }
        }

        debug!(
            "Cleared {} overrides for client {}",
            identities.len(),
            self.client_id
        );
    }

    /// Applies a registry change to the mirror and, unless an override shadows
    /// the identity or the roster is hidden, to the client
    pub fn reconcile_global_change(&self, change: &GlobalChange) {
        let mut state = self.state.lock();
        if !state.valid {
            return;
        }

        match change {
            GlobalChange::Upsert { entry, ops } => {
                let identity = entry.identity();
                let previous = state.global.insert(identity, entry.clone());
                if !state.visible || state.overrides.contains_key(&identity) {
                    return;
                }

                let was_shown = previous.is_some_and(|p| state.shows_global(&p));
                match (was_shown, state.shows_global(entry)) {
                    (true, true) => {
                        for op in ops {
                            self.transmit(op.clone());
                        }
                    }
                    (false, true) => self.transmit(RosterOp::Add(entry.clone())),
                    (true, false) => self.transmit(RosterOp::Remove(identity)),
                    (false, false) => {}
                }
            }
            GlobalChange::Remove(identity) => {
                let previous = state.global.remove(identity);
                if !state.visible || state.overrides.contains_key(identity) {
                    return;
                }
                if previous.is_some_and(|p| state.shows_global(&p)) {
                    self.transmit(RosterOp::Remove(*identity));
                }
            }
            GlobalChange::RemoveMany(identities) => {
                let mut removed = Vec::new();
                for identity in identities {
                    if let Some(previous) = state.global.remove(identity) {
                        if !state.overrides.contains_key(identity) && state.shows_global(&previous)
                        {
                            removed.push(*identity);
                        }
                    }
                }
                if state.visible && !removed.is_empty() {
                    self.transmit(RosterOp::RemoveMany(removed));
                }
            }
            GlobalChange::Refresh(entries) => {
                for entry in entries {
                    state.global.insert(entry.identity(), entry.clone());
                }
                if !state.visible {
                    return;
                }
                for entry in entries {
                    if !state.overrides.contains_key(&entry.identity()) && state.shows_global(entry)
                    {
                        self.transmit(RosterOp::Add(entry.clone()));
                    }
                }
            }
        }
    }

    /// Global entries overlaid with this client's overrides, in display order
    pub fn composed_view(&self) -> Vec<RosterEntry> {
        self.state.lock().composed_view()
    }

    pub fn visible_count(&self) -> usize {
        self.composed_view().len()
    }

    /// Looks an identity up in the composed view, overrides first
    pub fn find(&self, identity: Uuid) -> Option<RosterEntry> {
        self.state.lock().composed(&identity).cloned()
    }

    pub fn find_by_label(&self, label: &str) -> Option<RosterEntry> {
        let state = self.state.lock();
        state
            .overrides
            .values()
            .find(|entry| entry.label() == label)
            .or_else(|| {
                state
                    .global
                    .values()
                    .filter(|entry| !state.overrides.contains_key(&entry.identity()))
                    .find(|entry| entry.label() == label && state.shows_global(entry))
            })
            .cloned()
    }

    pub fn overrides(&self) -> Vec<RosterEntry> {
        self.state.lock().overrides.values().cloned().collect()
    }

    /// Undoes every customization for this client.
    ///
    /// Removes everything the client displays, drops overrides and the
    /// header/footer, returns visibility to the server default, and from then
    /// on shows only live entries of the global layer.
    pub fn reset_to_baseline(&self) {
        let mut state = self.state.lock();
        if !state.valid {
            return;
        }

        if state.visible {
            let identities: Vec<Uuid> = state
                .composed_view()
                .iter()
                .map(RosterEntry::identity)
                .collect();
            if !identities.is_empty() {
                self.transmit(RosterOp::RemoveMany(identities));
            }
        }

        state.overrides.clear();
        state.trackers.clear();
        state.baseline_only = true;
        state.visible = self.defaults.visible();
        state.header_footer = HeaderFooter::default();
        self.send_packet(state.header_footer.to_packet());

        if state.visible {
            for entry in state.composed_view() {
                self.transmit(RosterOp::Add(entry));
            }
        }

        debug!("Reset roster to baseline for client {}", self.client_id);
    }

    /// Re-sends the composed view and header/footer without diffing
    pub fn refresh(&self) {
        let mut state = self.state.lock();
        if !state.valid || !state.visible {
            return;
        }

        for entry in state.composed_view() {
            self.transmit(RosterOp::Add(entry));
        }
        state.retrack_overrides();
        self.send_packet(state.header_footer.to_packet());

        debug!("Refreshed roster for client {}", self.client_id);
    }

    pub fn header_footer(&self) -> HeaderFooter {
        self.state.lock().header_footer.clone()
    }

    pub fn set_header_footer(&self, header: Option<String>, footer: Option<String>) {
        self.replace_header_footer(|hf| *hf = HeaderFooter::new(header, footer));
    }

    pub fn set_header(&self, header: Option<String>) {
        self.replace_header_footer(|hf| hf.header = header);
    }

    pub fn set_footer(&self, footer: Option<String>) {
        self.replace_header_footer(|hf| hf.footer = footer);
    }

    pub fn clear_header_footer(&self) {
        self.replace_header_footer(|hf| *hf = HeaderFooter::default());
    }

    fn replace_header_footer(&self, update: impl FnOnce(&mut HeaderFooter)) {
        let mut state = self.state.lock();
        if !state.valid {
            return;
        }
        update(&mut state.header_footer);
        self.send_packet(state.header_footer.to_packet());
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
