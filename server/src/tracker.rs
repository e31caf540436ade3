//! Change tracking and packet action selection
//!
//! The roster protocol can patch most fields of a displayed entry in place, but
//! not the label or the appearance: a client only picks those up when the entry
//! is removed and added again. A [`ChangeTracker`] remembers, per identity,
//! the label and appearance the client was last given, and [`select_actions`]
//! uses it to choose between a single patch and a remove + add pair.

use shared::{RosterEntry, RosterOp, VisualRef};

/// Presentation fields last handed to the transport for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTracker {
    last_label: String,
    last_visual: Option<VisualRef>,
}

impl ChangeTracker {
    /// Starts tracking from the entry's own values, i.e. "no divergence yet"
    pub fn new(entry: &RosterEntry) -> Self {
        Self {
            last_label: entry.label().to_string(),
            last_visual: entry.visual().cloned(),
        }
    }

    pub fn last_label(&self) -> &str {
        &self.last_label
    }

    pub fn last_visual(&self) -> Option<&VisualRef> {
        self.last_visual.as_ref()
    }

    pub fn label_changed(&self, entry: &RosterEntry) -> bool {
        self.last_label != entry.label()
    }

    pub fn visual_changed(&self, entry: &RosterEntry) -> bool {
        self.last_visual.as_ref() != entry.visual()
    }

    pub fn requires_full_replace(&self, entry: &RosterEntry) -> bool {
        self.label_changed(entry) || self.visual_changed(entry)
    }

    /// Records `entry` as what the client now holds. Call only once the
    /// operations for it have been handed to the transport.
    pub fn commit(&mut self, entry: &RosterEntry) {
        if self.label_changed(entry) {
            self.last_label = entry.label().to_string();
        }
        if self.visual_changed(entry) {
            self.last_visual = entry.visual().cloned();
        }
    }
}

/// Chooses the operations that bring a client from `tracker`'s state to `entry`
///
/// Only used for identities the client already displays; first transmissions
/// and removals are issued directly by the owning layer.
pub fn select_actions(entry: &RosterEntry, tracker: &ChangeTracker) -> Vec<RosterOp> {
    if tracker.requires_full_replace(entry) {
        vec![
            RosterOp::Remove(entry.identity()),
            RosterOp::Add(entry.clone()),
        ]
    } else {
        vec![RosterOp::Patch {
            identity: entry.identity(),
            fields: entry.patch_fields(),
        }]
    }
}
