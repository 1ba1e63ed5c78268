//! The grading table: full structure of one contest instance.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::band::Band;
use super::section::Section;
use crate::error::ConfigError;
use crate::rules::LinkageRule;

/// Sections, entrants, quotas, and the named linkage rules sections refer to.
///
/// Read-only for the duration of a run. Every band belongs to exactly one
/// section; `validate` enforces that and the quota invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingTable {
    pub name: String,
    pub sections: Vec<Section>,
    /// Rule definitions, keyed by the name sections use in `linkage`.
    #[serde(default)]
    pub rules: BTreeMap<String, LinkageRule>,
}

impl GradingTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sections: Vec::new(),
            rules: BTreeMap::new(),
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_rule(mut self, name: impl Into<String>, rule: LinkageRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// Total number of bands across all sections.
    pub fn band_count(&self) -> usize {
        self.sections.iter().map(|s| s.len()).sum()
    }

    /// All bands in table order, paired with their section.
    pub fn bands(&self) -> impl Iterator<Item = (&Section, &Band)> {
        self.sections
            .iter()
            .flat_map(|s| s.bands.iter().map(move |b| (s, b)))
    }

    /// Look up a section index by name.
    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Check every structural invariant of the table.
    ///
    /// Strengths are not checked here; a non-finite strength surfaces as a
    /// sampling error when the section is first ranked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.is_empty() {
            return Err(ConfigError::NoSections {
                table: self.name.clone(),
            });
        }

        let mut section_names = HashSet::new();
        let mut band_owner: HashMap<&str, &str> = HashMap::new();

        for section in &self.sections {
            if !section_names.insert(section.name.as_str()) {
                return Err(ConfigError::DuplicateSection {
                    section: section.name.clone(),
                });
            }
            if section.is_empty() {
                return Err(ConfigError::EmptySection {
                    section: section.name.clone(),
                });
            }
            if section.played() == 0 {
                return Err(ConfigError::NoCompetingBands {
                    section: section.name.clone(),
                    count: section.len(),
                });
            }
            if section.promote + section.relegate > section.len() {
                return Err(ConfigError::QuotaExceedsSection {
                    section: section.name.clone(),
                    promote: section.promote,
                    relegate: section.relegate,
                    size: section.len(),
                });
            }
            for band in &section.bands {
                if let Some(first) = band_owner.insert(band.name.as_str(), section.name.as_str()) {
                    return Err(ConfigError::DuplicateBand {
                        band: band.name.clone(),
                        first: first.to_string(),
                        second: section.name.clone(),
                    });
                }
            }
        }

        for section in &self.sections {
            for rule_name in &section.linkage {
                let rule = self.rules.get(rule_name).ok_or_else(|| ConfigError::UnknownRule {
                    section: section.name.clone(),
                    rule: rule_name.clone(),
                })?;
                rule.validate(rule_name, section, self)?;
            }
        }

        Ok(())
    }

    /// Deterministic BLAKE3 fingerprint of the table's full content.
    ///
    /// Two tables with the same fingerprint produce identical reports for the
    /// same simulation parameters.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        update_str(&mut hasher, &self.name);
        hasher.update(&(self.sections.len() as u64).to_le_bytes());
        for section in &self.sections {
            update_str(&mut hasher, &section.name);
            hasher.update(&(section.promote as u64).to_le_bytes());
            hasher.update(&(section.relegate as u64).to_le_bytes());
            hasher.update(&(section.linkage.len() as u64).to_le_bytes());
            for rule in &section.linkage {
                update_str(&mut hasher, rule);
            }
            hasher.update(&(section.bands.len() as u64).to_le_bytes());
            for band in &section.bands {
                update_str(&mut hasher, &band.name);
                hasher.update(&band.strength.to_bits().to_le_bytes());
                hasher.update(&(band.prior_results.len() as u64).to_le_bytes());
                for result in &band.prior_results {
                    hasher.update(&result.to_le_bytes());
                }
                hasher.update(&[u8::from(band.absent)]);
            }
        }
        hasher.update(&(self.rules.len() as u64).to_le_bytes());
        for (name, rule) in &self.rules {
            update_str(&mut hasher, name);
            rule.hash_into(&mut hasher);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Length-prefixed so adjacent strings cannot alias.
pub(crate) fn update_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
