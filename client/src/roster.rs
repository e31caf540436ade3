//! Local mirror of the roster the server displays for this client

use log::warn;
use shared::{RosterEntry, RosterOp};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ClientRoster {
    entries: HashMap<Uuid, RosterEntry>,
    header: String,
    footer: String,
}

impl ClientRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one operation. Returns false if it referred to an identity
    /// this roster does not hold.
    pub fn apply(&mut self, op: &RosterOp) -> bool {
        match op {
            RosterOp::Add(entry) => {
                self.entries.insert(entry.identity(), entry.clone());
                true
            }
            RosterOp::Patch { identity, fields } => match self.entries.get_mut(identity) {
                Some(entry) => {
                    *entry = entry.with_patch(fields);
                    true
                }
                None => {
                    warn!("Patch for unknown roster entry {}", identity);
                    false
                }
            },
            RosterOp::Remove(identity) => self.entries.remove(identity).is_some(),
            RosterOp::RemoveMany(identities) => {
                let before = self.entries.len();
                for identity in identities {
                    self.entries.remove(identity);
                }
                before - self.entries.len() == identities.len()
            }
        }
    }

    pub fn set_header_footer(&mut self, header: String, footer: String) {
        self.header = header;
        self.footer = footer;
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn footer(&self) -> &str {
        &self.footer
    }

    pub fn get(&self, identity: Uuid) -> Option<&RosterEntry> {
        self.entries.get(&identity)
    }

    /// Every held entry in display order, listed or not
    pub fn entries(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self.entries.values().cloned().collect();
        entries.sort_by(RosterEntry::display_order);
        entries
    }

    /// Entries the client actually draws
    pub fn listed_entries(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .entries
            .values()
            .filter(|entry| entry.is_listed())
            .cloned()
            .collect();
        entries.sort_by(RosterEntry::display_order);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.header.clear();
        self.footer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str) -> RosterEntry {
        RosterEntry::builder().label(label).build().unwrap()
    }

    #[test]
    fn test_add_replaces_same_identity() {
        let mut roster = ClientRoster::new();
        let alice = entry("Alice");
        roster.apply(&RosterOp::Add(alice.clone()));
        roster.apply(&RosterOp::Add(
            alice.to_builder().latency_ms(99).build().unwrap(),
        ));

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(alice.identity()).unwrap().latency_ms(), 99);
    }

    #[test]
    fn test_patch_updates_fields_in_place() {
        let mut roster = ClientRoster::new();
        let alice = entry("Alice");
        roster.apply(&RosterOp::Add(alice.clone()));

        let updated = alice.to_builder().latency_ms(40).listed(false).build().unwrap();
        assert!(roster.apply(&RosterOp::Patch {
            identity: alice.identity(),
            fields: updated.patch_fields(),
        }));

        assert!(roster.get(alice.identity()).unwrap().same_fields(&updated));
        assert!(roster.listed_entries().is_empty());
        assert_eq!(roster.entries().len(), 1);
    }

    #[test]
    fn test_patch_unknown_identity_is_ignored() {
        let mut roster = ClientRoster::new();
        let alice = entry("Alice");

        assert!(!roster.apply(&RosterOp::Patch {
            identity: alice.identity(),
            fields: alice.patch_fields(),
        }));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_remove_many() {
        let mut roster = ClientRoster::new();
        let alice = entry("Alice");
        let bob = entry("Bob");
        roster.apply(&RosterOp::Add(alice.clone()));
        roster.apply(&RosterOp::Add(bob.clone()));

        assert!(roster.apply(&RosterOp::RemoveMany(vec![alice.identity(), bob.identity()])));
        assert!(roster.is_empty());
        assert!(!roster.apply(&RosterOp::Remove(alice.identity())));
    }

    #[test]
    fn test_entries_in_display_order() {
        let mut roster = ClientRoster::new();
        roster.apply(&RosterOp::Add(entry("Zed")));
        roster.apply(&RosterOp::Add(
            RosterEntry::builder().label("Amy").sort_key(2).build().unwrap(),
        ));
        roster.apply(&RosterOp::Add(entry("Bob")));

        let labels: Vec<String> = roster
            .entries()
            .iter()
            .map(|e| e.label().to_string())
            .collect();
        assert_eq!(labels, vec!["Bob", "Zed", "Amy"]);
    }
}
