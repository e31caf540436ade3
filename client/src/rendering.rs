//! Text rendering of the mirrored roster

use crate::roster::ClientRoster;
use shared::{GameMode, RosterEntry};
use uuid::Uuid;

/// Bars shown for a latency, the way the roster's signal icon does
pub fn latency_bars(latency_ms: u32) -> u8 {
    match latency_ms {
        0..=149 => 5,
        150..=299 => 4,
        300..=599 => 3,
        600..=999 => 2,
        _ => 1,
    }
}

fn mode_tag(mode: GameMode) -> &'static str {
    match mode {
        GameMode::Survival => "S",
        GameMode::Creative => "C",
        GameMode::Adventure => "A",
        GameMode::Spectator => "-",
    }
}

pub struct Renderer {
    width: usize,
}

impl Renderer {
    pub fn new(width: usize) -> Self {
        Self { width: width.max(16) }
    }

    /// Renders the roster as lines of text; `local` marks this client's own entry
    pub fn render(&self, roster: &ClientRoster, local: Option<Uuid>) -> Vec<String> {
        let mut lines = Vec::new();
        let rule = "-".repeat(self.width);

        lines.extend(roster.header().lines().map(str::to_string));
        lines.push(rule.clone());

        for entry in roster.listed_entries() {
            lines.push(self.render_entry(&entry, Some(entry.identity()) == local));
        }

        lines.push(rule);
        lines.extend(roster.footer().lines().map(str::to_string));
        lines
    }

    fn render_entry(&self, entry: &RosterEntry, is_local: bool) -> String {
        let bars = latency_bars(entry.latency_ms()) as usize;
        let signal = format!("{}{}", "|".repeat(bars), ".".repeat(5 - bars));
        let marker = if is_local { '>' } else { ' ' };
        let name_width = self.width.saturating_sub(12);

        let mut name: String = entry.display_text().chars().take(name_width).collect();
        if !entry.shows_decoration() {
            name = format!("{name}*");
        }

        format!(
            "{}{} {:<width$} {}",
            marker,
            mode_tag(entry.mode()),
            name,
            signal,
            width = name_width
        )
    }
}
