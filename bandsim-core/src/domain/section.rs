use serde::{Deserialize, Serialize};

use super::band::Band;

/// One contest section: bands competing together for the same quotas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    /// Number of bands promoted from the top of the section.
    pub promote: usize,
    /// Number of bands relegated from the bottom of the section.
    pub relegate: usize,
    /// Named linkage rules applied after the base rule, in order.
    #[serde(default)]
    pub linkage: Vec<String>,
    pub bands: Vec<Band>,
}

impl Section {
    pub fn new(name: impl Into<String>, promote: usize, relegate: usize) -> Self {
        Self {
            name: name.into(),
            promote,
            relegate,
            linkage: Vec::new(),
            bands: Vec::new(),
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.bands.push(band);
        self
    }

    pub fn with_linkage(mut self, rule: impl Into<String>) -> Self {
        self.linkage.push(rule.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Number of bands that actually play.
    pub fn played(&self) -> usize {
        self.bands.iter().filter(|b| !b.absent).count()
    }
}
