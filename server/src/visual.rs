//! Appearance lookup backed by a fixed table
//!
//! Real deployments would ask a remote profile directory; this server only
//! knows the appearances listed in its configuration.

use log::debug;
use shared::{VisualError, VisualRef, VisualSource};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StaticVisualSource {
    visuals: HashMap<String, VisualRef>,
}

impl StaticVisualSource {
    pub fn new(visuals: HashMap<String, VisualRef>) -> Self {
        Self { visuals }
    }

    pub fn insert(&mut self, name: impl Into<String>, visual: VisualRef) {
        self.visuals.insert(name.into(), visual);
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

impl VisualSource for StaticVisualSource {
    fn fetch(&self, identity: &str) -> Result<VisualRef, VisualError> {
        // Names are case-insensitive in the directory this stands in for
        let found = self.visuals.get(identity).or_else(|| {
            self.visuals
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(identity))
                .map(|(_, visual)| visual)
        });

        match found {
            Some(visual) => Ok(visual.clone()),
            None => {
                debug!("No appearance known for {}", identity);
                Err(VisualError::NotAvailable(identity.to_string()))
            }
        }
    }
}
