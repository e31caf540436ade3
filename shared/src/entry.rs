//! Roster entry model shared by server and client
//!
//! A [`RosterEntry`] is an immutable snapshot of one displayed item. Entries
//! are only ever replaced, never edited in place: the way to "change" an entry
//! is `entry.to_builder()`, adjust, `build()`, and hand the new snapshot to the
//! layer that owns the identity.
//!
//! Two snapshots with the same identity are the same logical entry. Equality
//! and hashing therefore only look at the identity; use
//! [`RosterEntry::same_fields`] to compare content.

use crate::error::{EntryError, VisualError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Namespace used to derive identities of synthetic entries from their label
pub const SYNTHETIC_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_9b3c_52a4_4e0f_9c7e_2b8a_41d6_f003);

/// Shortest label accepted for a synthetic entry
pub const MIN_LABEL_LEN: usize = 3;
/// Longest label accepted for a synthetic entry
pub const MAX_LABEL_LEN: usize = 16;

/// Display mode of an entry, decides the icon the client draws next to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Appearance token pair as issued by the appearance directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisualRef {
    pub value: String,
    pub signature: String,
}

impl VisualRef {
    pub fn new(value: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            signature: signature.into(),
        }
    }
}

/// Capability to look up the appearance of an identity string (usually a name)
pub trait VisualSource: Send + Sync {
    fn fetch(&self, identity: &str) -> Result<VisualRef, VisualError>;
}

/// Derives the stable identity of a synthetic entry from its label.
///
/// Calling this twice with the same label always yields the same identity, so
/// re-creating a synthetic entry replaces the previous one instead of adding a
/// duplicate.
pub fn synthetic_identity(label: &str) -> Uuid {
    Uuid::new_v3(&SYNTHETIC_NAMESPACE, format!("fake:{label}").as_bytes())
}

/// Returns true if `label` is usable as the name of a synthetic entry
///
/// Synthetic entries share their name namespace with live participants, so
/// they follow the same rules: 3 to 16 ASCII letters, digits or underscores.
pub fn is_valid_label(label: &str) -> bool {
    (MIN_LABEL_LEN..=MAX_LABEL_LEN).contains(&label.len())
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One displayed roster item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    identity: Uuid,
    label: String,
    display_text: String,
    mode: GameMode,
    latency_ms: u32,
    listed: bool,
    sort_key: i32,
    show_decoration: bool,
    group: Option<String>,
    live: bool,
    synced: bool,
    visual: Option<VisualRef>,
}

impl RosterEntry {
    /// Starts an empty builder with default values
    pub fn builder() -> RosterEntryBuilder {
        RosterEntryBuilder::default()
    }

    /// Starts a builder for an entry mirroring a connected participant
    pub fn live(identity: Uuid, label: impl Into<String>) -> RosterEntryBuilder {
        RosterEntryBuilder::default()
            .identity(identity)
            .label(label)
            .live(true)
    }

    /// Starts a builder pre-populated with this entry's values
    pub fn to_builder(&self) -> RosterEntryBuilder {
        RosterEntryBuilder::default().copy_from(self)
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn latency_ms(&self) -> u32 {
        self.latency_ms
    }

    pub fn is_listed(&self) -> bool {
        self.listed
    }

    pub fn sort_key(&self) -> i32 {
        self.sort_key
    }

    pub fn shows_decoration(&self) -> bool {
        self.show_decoration
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn visual(&self) -> Option<&VisualRef> {
        self.visual.as_ref()
    }

    /// Compares every field, not just the identity
    pub fn same_fields(&self, other: &RosterEntry) -> bool {
        self.identity == other.identity
            && self.label == other.label
            && self.display_text == other.display_text
            && self.mode == other.mode
            && self.latency_ms == other.latency_ms
            && self.listed == other.listed
            && self.sort_key == other.sort_key
            && self.show_decoration == other.show_decoration
            && self.group == other.group
            && self.live == other.live
            && self.synced == other.synced
            && self.visual == other.visual
    }

    /// Extracts the fields a patch operation is allowed to carry
    pub fn patch_fields(&self) -> PatchFields {
        PatchFields {
            latency_ms: self.latency_ms,
            mode: self.mode,
            listed: self.listed,
            show_decoration: self.show_decoration,
            sort_key: self.sort_key,
            display_text: self.display_text.clone(),
        }
    }

    /// Returns a copy of this entry with patchable fields replaced
    pub fn with_patch(&self, fields: &PatchFields) -> RosterEntry {
        RosterEntry {
            latency_ms: fields.latency_ms,
            mode: fields.mode,
            listed: fields.listed,
            show_decoration: fields.show_decoration,
            sort_key: fields.sort_key,
            display_text: fields.display_text.clone(),
            ..self.clone()
        }
    }

    /// Roster ordering: sort key ascending, ties broken by label
    pub fn display_order(a: &RosterEntry, b: &RosterEntry) -> Ordering {
        a.sort_key
            .cmp(&b.sort_key)
            .then_with(|| a.label.cmp(&b.label))
    }
}

impl PartialEq for RosterEntry {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for RosterEntry {}

impl Hash for RosterEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Fields that can be updated in place on the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFields {
    pub latency_ms: u32,
    pub mode: GameMode,
    pub listed: bool,
    pub show_decoration: bool,
    pub sort_key: i32,
    pub display_text: String,
}

/// Fluent builder for [`RosterEntry`]
///
/// Setters never fail; every constraint is checked once in [`build`].
/// The only fallible setter is [`visual_from`], which talks to an external
/// source and leaves the builder untouched when the lookup fails.
///
/// [`build`]: RosterEntryBuilder::build
/// [`visual_from`]: RosterEntryBuilder::visual_from
#[derive(Debug, Clone)]
pub struct RosterEntryBuilder {
    identity: Option<Uuid>,
    label: Option<String>,
    display_text: Option<String>,
    mode: GameMode,
    latency_ms: i64,
    listed: bool,
    sort_key: i32,
    show_decoration: bool,
    group: Option<String>,
    live: bool,
    synced: bool,
    visual: Option<VisualRef>,
}

impl Default for RosterEntryBuilder {
    fn default() -> Self {
        Self {
            identity: None,
            label: None,
            display_text: None,
            mode: GameMode::Survival,
            latency_ms: 0,
            listed: true,
            sort_key: 0,
            show_decoration: true,
            group: None,
            live: false,
            synced: false,
            visual: None,
        }
    }
}

impl RosterEntryBuilder {
    pub fn identity(mut self, identity: Uuid) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_text(mut self, text: impl Into<String>) -> Self {
        self.display_text = Some(text.into());
        self
    }

    pub fn mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Accepts any integer so that negative input is reported by `build`
    /// instead of being silently wrapped
    pub fn latency_ms(mut self, latency_ms: i64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn listed(mut self, listed: bool) -> Self {
        self.listed = listed;
        self
    }

    pub fn sort_key(mut self, sort_key: i32) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn show_decoration(mut self, show: bool) -> Self {
        self.show_decoration = show;
        self
    }

    pub fn group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    /// Marks the entry as mirroring a live participant. Live entries are
    /// kept in sync by the host, so this also sets `synced`.
    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self.synced = live;
        self
    }

    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }

    /// Copies the appearance of `name` from an external source.
    ///
    /// On failure the builder is dropped and the error returned; callers that
    /// want to fall back to the default appearance keep a clone around.
    pub fn visual_from(mut self, source: &dyn VisualSource, name: &str) -> Result<Self, EntryError> {
        if !is_valid_label(name) {
            return Err(EntryError::InvalidLabel(name.to_string()));
        }
        self.visual = Some(source.fetch(name)?);
        Ok(self)
    }

    pub fn custom_visual(
        mut self,
        value: impl Into<String>,
        signature: impl Into<String>,
    ) -> Result<Self, EntryError> {
        let visual = VisualRef::new(value, signature);
        if visual.value.trim().is_empty() || visual.signature.trim().is_empty() {
            return Err(EntryError::EmptyVisual);
        }
        self.visual = Some(visual);
        Ok(self)
    }

    pub fn default_visual(mut self) -> Self {
        self.visual = None;
        self
    }

    pub fn copy_from(mut self, entry: &RosterEntry) -> Self {
        self.identity = Some(entry.identity);
        self.label = Some(entry.label.clone());
        self.display_text = Some(entry.display_text.clone());
        self.mode = entry.mode;
        self.latency_ms = i64::from(entry.latency_ms);
        self.listed = entry.listed;
        self.sort_key = entry.sort_key;
        self.show_decoration = entry.show_decoration;
        self.group = entry.group.clone();
        self.live = entry.live;
        self.synced = entry.synced;
        self.visual = entry.visual.clone();
        self
    }

    /// Restores every field to its default
    pub fn reset(self) -> Self {
        Self::default()
    }

    pub fn build(self) -> Result<RosterEntry, EntryError> {
        let label = match self.label {
            Some(label) if !label.trim().is_empty() => label,
            _ => return Err(EntryError::EmptyLabel),
        };

        if !self.live && !is_valid_label(&label) {
            return Err(EntryError::InvalidLabel(label));
        }

        let identity = match self.identity {
            Some(identity) => identity,
            None if self.live => return Err(EntryError::MissingIdentity(label)),
            None => synthetic_identity(&label),
        };

        let latency_ms = u32::try_from(self.latency_ms)
            .map_err(|_| EntryError::NegativeLatency(self.latency_ms))?;

        let display_text = self.display_text.unwrap_or_else(|| label.clone());

        Ok(RosterEntry {
            identity,
            label,
            display_text,
            mode: self.mode,
            latency_ms,
            listed: self.listed,
            sort_key: self.sort_key,
            show_decoration: self.show_decoration,
            group: self.group,
            live: self.live,
            synced: self.synced,
            visual: self.visual,
        })
    }
}
