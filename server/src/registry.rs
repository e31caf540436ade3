//! Global roster layer
//!
//! The [`GlobalRegistry`] holds the entries every client sees unless one of
//! its own overrides shadows them. Each mutation updates the registry state,
//! plans the wire operations against the registry's trackers, and fans the
//! resulting [`GlobalChange`] out to every subscribed session.
//!
//! Fan-out happens inside a dispatch lock that is taken before the state lock
//! is released, so sessions see changes in exactly the order they were
//! applied. Upserts keep the state lock until their fan-out is done and only
//! then advance the entry's tracker.

use crate::session::ClientSession;
use crate::tracker::{select_actions, ChangeTracker};
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use shared::{ClientId, RosterEntry, RosterOp};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A change to the global layer as delivered to sessions
#[derive(Debug, Clone)]
pub enum GlobalChange {
    /// `ops` bring a client that already displays the previous snapshot up to
    /// date; clients that do not display it receive a full add instead
    Upsert {
        entry: RosterEntry,
        ops: Vec<RosterOp>,
    },
    Remove(Uuid),
    RemoveMany(Vec<Uuid>),
    /// Full re-send of the listed entries
    Refresh(Vec<RosterEntry>),
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<Uuid, RosterEntry>,
    trackers: HashMap<Uuid, ChangeTracker>,
    /// Last write wins when two entries share a label
    labels: HashMap<String, Uuid>,
    subscribers: HashMap<ClientId, Arc<ClientSession>>,
}

impl RegistryState {
    fn insert(&mut self, entry: RosterEntry) -> Option<RosterEntry> {
        let identity = entry.identity();
        let previous = self.entries.insert(identity, entry.clone());
        if let Some(previous) = &previous {
            self.unindex_label(previous);
        }
        self.labels.insert(entry.label().to_string(), identity);
        previous
    }

    fn take(&mut self, identity: &Uuid) -> Option<RosterEntry> {
        let removed = self.entries.remove(identity)?;
        self.trackers.remove(identity);
        self.unindex_label(&removed);
        Some(removed)
    }

    fn unindex_label(&mut self, entry: &RosterEntry) {
        if self.labels.get(entry.label()) == Some(&entry.identity()) {
            self.labels.remove(entry.label());
        }
    }

    fn sorted_entries(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self.entries.values().cloned().collect();
        entries.sort_by(RosterEntry::display_order);
        entries
    }
}

/// Process-wide store of globally visible roster entries
pub struct GlobalRegistry {
    state: Mutex<RegistryState>,
    dispatch: Mutex<()>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            dispatch: Mutex::new(()),
        }
    }

    /// Seeds entries without notifying anyone.
    ///
    /// Meant for startup, before any client is attached. If sessions are
    /// already subscribed the entries are upserted instead so nobody misses
    /// them.
    pub fn initialize(&self, entries: Vec<RosterEntry>) {
        let mut state = self.state.lock();
        if !state.subscribers.is_empty() {
            drop(state);
            warn!(
                "Registry initialized with {} subscribers attached, upserting instead",
                self.subscriber_count()
            );
            for entry in entries {
                self.upsert(entry);
            }
            return;
        }

        let count = entries.len();
        for entry in entries {
            state
                .trackers
                .insert(entry.identity(), ChangeTracker::new(&entry));
            state.insert(entry);
        }
        info!("Registry initialized with {} entries", count);
    }

    /// Inserts or replaces the entry with the same identity and notifies
    /// every subscribed session
    pub fn upsert(&self, entry: RosterEntry) {
        let mut state = self.state.lock();
        let identity = entry.identity();

        let ops = match state.trackers.get(&identity) {
            Some(tracker) => select_actions(&entry, tracker),
            None => vec![RosterOp::Add(entry.clone())],
        };
        let replaced = state.insert(entry.clone()).is_some();

        debug!(
            "{} global entry {} ({})",
            if replaced { "Updated" } else { "Added" },
            entry.label(),
            identity
        );

        // State stays locked until the fan-out is done; the tracker advances
        // only after every session handed its operations to the transport.
        let subscribers: Vec<Arc<ClientSession>> = state.subscribers.values().cloned().collect();
        let _dispatch = self.dispatch.lock();
        let change = GlobalChange::Upsert {
            entry: entry.clone(),
            ops,
        };
        for session in &subscribers {
            session.reconcile_global_change(&change);
        }

        state
            .trackers
            .entry(identity)
            .and_modify(|tracker| tracker.commit(&entry))
            .or_insert_with(|| ChangeTracker::new(&entry));
    }

    /// Removes an entry. Returns the removed snapshot, `None` if it was absent.
    pub fn remove(&self, identity: Uuid) -> Option<RosterEntry> {
        let mut state = self.state.lock();
        let removed = state.take(&identity)?;

        debug!("Removed global entry {} ({})", removed.label(), identity);

        let (subscribers, _dispatch) = self.begin_dispatch(state);
        let change = GlobalChange::Remove(identity);
        for session in subscribers {
            session.reconcile_global_change(&change);
        }
        Some(removed)
    }

    /// Removes every entry whose group matches `group`
    pub fn remove_group(&self, group: &str) -> Vec<RosterEntry> {
        let mut state = self.state.lock();
        let identities: Vec<Uuid> = state
            .entries
            .values()
            .filter(|entry| entry.group() == Some(group))
            .map(RosterEntry::identity)
            .collect();
        self.remove_batch(state, identities)
    }

    /// Removes every entry in one batch
    pub fn clear(&self) -> Vec<RosterEntry> {
        let state = self.state.lock();
        let identities: Vec<Uuid> = state.entries.keys().copied().collect();
        self.remove_batch(state, identities)
    }

    fn remove_batch(
        &self,
        mut state: MutexGuard<'_, RegistryState>,
        identities: Vec<Uuid>,
    ) -> Vec<RosterEntry> {
        if identities.is_empty() {
            return Vec::new();
        }

        let removed: Vec<RosterEntry> = identities
            .iter()
            .filter_map(|identity| state.take(identity))
            .collect();

        info!("Removed {} global entries", removed.len());

        let (subscribers, _dispatch) = self.begin_dispatch(state);
        let change = GlobalChange::RemoveMany(identities);
        for session in subscribers {
            session.reconcile_global_change(&change);
        }
        removed
    }

    /// Re-sends every entry to every session without changing anything
    pub fn refresh(&self) {
        let state = self.state.lock();
        let entries = state.sorted_entries();
        if entries.is_empty() {
            return;
        }

        let (subscribers, _dispatch) = self.begin_dispatch(state);
        debug!(
            "Refreshing {} global entries for {} sessions",
            entries.len(),
            subscribers.len()
        );
        let change = GlobalChange::Refresh(entries);
        for session in subscribers {
            session.reconcile_global_change(&change);
        }
    }

    /// Takes the dispatch lock before giving up the state lock, so the next
    /// mutation cannot overtake this one's fan-out
    fn begin_dispatch(
        &self,
        state: MutexGuard<'_, RegistryState>,
    ) -> (Vec<Arc<ClientSession>>, MutexGuard<'_, ()>) {
        let subscribers = state.subscribers.values().cloned().collect();
        let dispatch = self.dispatch.lock();
        drop(state);
        (subscribers, dispatch)
    }

    /// Subscribes a session built from the current entries and sends it its
    /// initial roster.
    ///
    /// The snapshot, the subscription and the initial send happen without any
    /// mutation in between. Returns the new session and the one it replaced,
    /// which has already been invalidated.
    pub(crate) fn attach(
        &self,
        client_id: ClientId,
        make_session: impl FnOnce(Vec<RosterEntry>) -> ClientSession,
    ) -> (Arc<ClientSession>, Option<Arc<ClientSession>>) {
        let mut state = self.state.lock();
        let session = Arc::new(make_session(state.sorted_entries()));
        let replaced = state.subscribers.insert(client_id, session.clone());

        let _dispatch = self.dispatch.lock();
        drop(state);

        if let Some(old) = &replaced {
            old.invalidate();
        }
        session.welcome();
        (session, replaced)
    }

    /// Unsubscribes and invalidates the session of `client_id`
    pub(crate) fn detach(&self, client_id: ClientId) -> Option<Arc<ClientSession>> {
        let mut state = self.state.lock();
        let session = state.subscribers.remove(&client_id)?;
        let _dispatch = self.dispatch.lock();
        drop(state);

        session.invalidate();
        Some(session)
    }

    pub fn find(&self, identity: Uuid) -> Option<RosterEntry> {
        self.state.lock().entries.get(&identity).cloned()
    }

    pub fn find_by_label(&self, label: &str) -> Option<RosterEntry> {
        let state = self.state.lock();
        state
            .labels
            .get(label)
            .and_then(|identity| state.entries.get(identity))
            .cloned()
    }

    /// Every entry in display order. The returned list is a copy.
    pub fn all(&self) -> Vec<RosterEntry> {
        self.state.lock().sorted_entries()
    }

    pub fn find_by_group(&self, group: &str) -> Vec<RosterEntry> {
        self.find_matching(|entry| entry.group() == Some(group))
    }

    pub fn find_matching(&self, predicate: impl Fn(&RosterEntry) -> bool) -> Vec<RosterEntry> {
        let state = self.state.lock();
        let mut matching: Vec<RosterEntry> = state
            .entries
            .values()
            .filter(|&entry| predicate(entry))
            .cloned()
            .collect();
        matching.sort_by(RosterEntry::display_order);
        matching
    }

    pub fn contains(&self, identity: Uuid) -> bool {
        self.state.lock().entries.contains_key(&identity)
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.state.lock().labels.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        Self::new()
    }
}
