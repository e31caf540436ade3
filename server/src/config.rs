//! Server configuration
//!
//! Loaded from a TOML file, every key optional:
//!
//! ```toml
//! hide_tab = false
//! hide_player_join = false
//! max_clients = 64
//! client_timeout_secs = 5
//! refresh_interval_secs = 0
//!
//! [header_footer]
//! enabled = true
//! header = ["My Server", "Welcome!"]
//! footer = ["example.com"]
//!
//! [visuals.Notch]
//! value = "..."
//! signature = "..."
//!
//! [[entries]]
//! label = "Shop_Bot"
//! latency_ms = 0
//! sort_key = -10
//! copy_visual_from = "Notch"
//! ```
//!
//! Command line flags are applied on top by the binary.

use crate::error::RosterError;
use crate::session::{HeaderFooter, SessionDefaults};
use crate::visual::StaticVisualSource;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use shared::{GameMode, RosterEntry, VisualRef, VisualSource, CLIENT_TIMEOUT_SECS};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Start every session with the roster hidden
    pub hide_tab: bool,
    /// Hide newly connected participants from everyone else
    pub hide_player_join: bool,
    pub max_clients: usize,
    pub client_timeout_secs: u64,
    /// Periodic full re-send of the global layer, 0 disables it
    pub refresh_interval_secs: u64,
    pub header_footer: HeaderFooterConfig,
    pub visuals: HashMap<String, VisualConfig>,
    pub entries: Vec<EntryConfig>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            hide_tab: false,
            hide_player_join: false,
            max_clients: 64,
            client_timeout_secs: CLIENT_TIMEOUT_SECS,
            refresh_interval_secs: 0,
            header_footer: HeaderFooterConfig::default(),
            visuals: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooterConfig {
    pub enabled: bool,
    pub header: Vec<String>,
    pub footer: Vec<String>,
}

impl HeaderFooterConfig {
    /// Joins the configured lines; disabled or empty sections become `None`
    pub fn to_header_footer(&self) -> HeaderFooter {
        if !self.enabled {
            return HeaderFooter::default();
        }
        let join = |lines: &[String]| (!lines.is_empty()).then(|| lines.join("\n"));
        HeaderFooter::new(join(&self.header), join(&self.footer))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualConfig {
    pub value: String,
    pub signature: String,
}

/// A synthetic entry seeded into the global layer at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub label: String,
    pub display_text: Option<String>,
    pub latency_ms: i64,
    pub mode: GameMode,
    pub listed: Option<bool>,
    pub sort_key: i32,
    pub group: Option<String>,
    /// Name whose appearance the entry borrows from `[visuals]`
    pub copy_visual_from: Option<String>,
}

impl EntryConfig {
    fn build(&self, visuals: &dyn VisualSource) -> Result<RosterEntry, RosterError> {
        let mut builder = RosterEntry::builder()
            .label(self.label.as_str())
            .latency_ms(self.latency_ms)
            .mode(self.mode)
            .listed(self.listed.unwrap_or(true))
            .sort_key(self.sort_key)
            .group(self.group.clone());
        if let Some(text) = &self.display_text {
            builder = builder.display_text(text.as_str());
        }

        if let Some(name) = &self.copy_visual_from {
            builder = match builder.clone().visual_from(visuals, name) {
                Ok(with_visual) => with_visual,
                Err(e) => {
                    warn!(
                        "Entry {}: {}, using the default appearance",
                        self.label, e
                    );
                    builder
                }
            };
        }

        Ok(builder.build()?)
    }
}

impl RosterConfig {
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RosterError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RosterError> {
        toml::from_str(content).map_err(|e| RosterError::Config(e.to_string()))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn visual_source(&self) -> StaticVisualSource {
        StaticVisualSource::new(
            self.visuals
                .iter()
                .map(|(name, v)| {
                    (
                        name.clone(),
                        VisualRef::new(v.value.as_str(), v.signature.as_str()),
                    )
                })
                .collect(),
        )
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults::new(!self.hide_tab, self.header_footer.to_header_footer())
    }

    /// Builds the configured synthetic entries. The first invalid entry
    /// fails the whole load.
    pub fn build_entries(&self) -> Result<Vec<RosterEntry>, RosterError> {
        let visuals = self.visual_source();
        self.entries
            .iter()
            .map(|entry| entry.build(&visuals))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::EntryError;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RosterConfig::from_toml_str("").unwrap();

        assert!(!config.hide_tab);
        assert!(!config.hide_player_join);
        assert_eq!(config.max_clients, 64);
        assert_eq!(config.client_timeout(), Duration::from_secs(CLIENT_TIMEOUT_SECS));
        assert!(config.build_entries().unwrap().is_empty());
        assert!(config.session_defaults().visible());
    }

    #[test]
    fn test_full_config() {
        let config = RosterConfig::from_toml_str(
            r#"
            hide_tab = true
            hide_player_join = true
            max_clients = 8

            [header_footer]
            enabled = true
            header = ["My Server", "Welcome!"]

            [visuals.Notch]
            value = "tex"
            signature = "sig"

            [[entries]]
            label = "Shop_Bot"
            sort_key = -10
            mode = "Creative"
            copy_visual_from = "Notch"

            [[entries]]
            label = "Guide"
            display_text = "[Guide]"
            group = "npcs"
            "#,
        )
        .unwrap();

        assert!(config.hide_tab);
        assert_eq!(config.max_clients, 8);

        let defaults = config.session_defaults();
        assert!(!defaults.visible());
        let header_footer = defaults.header_footer();
        assert_eq!(header_footer.header.as_deref(), Some("My Server\nWelcome!"));
        assert_eq!(header_footer.footer, None);

        let entries = config.build_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sort_key(), -10);
        assert_eq!(entries[0].mode(), GameMode::Creative);
        assert_eq!(entries[0].visual(), Some(&VisualRef::new("tex", "sig")));
        assert_eq!(entries[1].display_text(), "[Guide]");
        assert_eq!(entries[1].group(), Some("npcs"));
    }

    #[test]
    fn test_disabled_header_footer_is_empty() {
        let config = RosterConfig::from_toml_str(
            r#"
            [header_footer]
            enabled = false
            header = ["ignored"]
            "#,
        )
        .unwrap();

        assert!(config.header_footer.to_header_footer().is_empty());
    }

    #[test]
    fn test_unknown_visual_falls_back_to_default() {
        let config = RosterConfig::from_toml_str(
            r#"
            [[entries]]
            label = "Shop_Bot"
            copy_visual_from = "Nobody"
            "#,
        )
        .unwrap();

        let entries = config.build_entries().unwrap();
        assert!(entries[0].visual().is_none());
    }

    #[test]
    fn test_invalid_entry_is_rejected() {
        let config = RosterConfig::from_toml_str(
            r#"
            [[entries]]
            label = "no spaces allowed"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.build_entries(),
            Err(RosterError::InvalidEntry(EntryError::InvalidLabel(_)))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            RosterConfig::from_toml_str("hide_tab = "),
            Err(RosterError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RosterConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(RosterError::Config(_))));
    }
}
