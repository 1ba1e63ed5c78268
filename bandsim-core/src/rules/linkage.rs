//! Linkage rules: named, configurable contest quirks.
//!
//! A section lists rule names in its `linkage`; each rule then applies in
//! the context of that section. New quirks are new variants here plus a new
//! pipeline step, never edits to the base rule.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::table::update_str;
use crate::domain::{GradingTable, OutcomeLabel, Section};
use crate::error::ConfigError;

/// Serializable definition of one label-transformation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkageRule {
    /// Regrade the section on cumulative grading points: prior results plus
    /// this year's placing, lower is better.
    GradingPoints,

    /// Cap the section's promotions at the number of bands relegated out of
    /// `into`, the section above it.
    PromotionCap { into: String },

    /// Pool the top `feed` finishers of this section and of `with`; only the
    /// best `places` of the pool are promoted.
    MergedPromotionPool {
        with: Vec<String>,
        feed: usize,
        places: usize,
    },

    /// Top `places` finishers who would otherwise stay qualify via a
    /// separate path, labelled `label`.
    QualifyingPath { places: usize, label: String },
}

impl LinkageRule {
    /// Rule kind name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            LinkageRule::GradingPoints => "grading_points",
            LinkageRule::PromotionCap { .. } => "promotion_cap",
            LinkageRule::MergedPromotionPool { .. } => "merged_promotion_pool",
            LinkageRule::QualifyingPath { .. } => "qualifying_path",
        }
    }

    /// Extra label this rule can emit, if any.
    pub fn emitted_label(&self) -> Option<OutcomeLabel> {
        match self {
            LinkageRule::QualifyingPath { label, .. } => {
                Some(OutcomeLabel::Qualified(label.clone()))
            }
            _ => None,
        }
    }

    /// Validate this rule as referenced by `section` under the name `name`.
    pub fn validate(
        &self,
        name: &str,
        section: &Section,
        table: &GradingTable,
    ) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            rule: name.to_string(),
            reason: reason.to_string(),
        };

        match self {
            LinkageRule::GradingPoints => Ok(()),
            LinkageRule::PromotionCap { into } => check_other_section(name, section, into, table),
            LinkageRule::MergedPromotionPool { with, feed, places } => {
                if with.is_empty() {
                    return Err(invalid("merged pool needs at least one other section"));
                }
                if *feed == 0 {
                    return Err(invalid("feed must be at least 1"));
                }
                if *places == 0 {
                    return Err(invalid("places must be at least 1"));
                }
                let mut seen = HashSet::new();
                for other in with {
                    check_other_section(name, section, other, table)?;
                    if !seen.insert(other.as_str()) {
                        return Err(invalid(&format!("section '{other}' listed twice")));
                    }
                }
                Ok(())
            }
            LinkageRule::QualifyingPath { places, label } => {
                if label.trim().is_empty() {
                    return Err(invalid("label must not be empty"));
                }
                if OutcomeLabel::is_reserved(label) {
                    return Err(ConfigError::ReservedLabel {
                        rule: name.to_string(),
                        label: label.clone(),
                    });
                }
                if *places == 0 || *places > section.len() {
                    return Err(invalid(&format!(
                        "places {places} must be between 1 and the {} bands of '{}'",
                        section.len(),
                        section.name
                    )));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        update_str(hasher, self.kind());
        match self {
            LinkageRule::GradingPoints => {}
            LinkageRule::PromotionCap { into } => update_str(hasher, into),
            LinkageRule::MergedPromotionPool { with, feed, places } => {
                hasher.update(&(with.len() as u64).to_le_bytes());
                for other in with {
                    update_str(hasher, other);
                }
                hasher.update(&(*feed as u64).to_le_bytes());
                hasher.update(&(*places as u64).to_le_bytes());
            }
            LinkageRule::QualifyingPath { places, label } => {
                hasher.update(&(*places as u64).to_le_bytes());
                update_str(hasher, label);
            }
        }
    }
}

fn check_other_section(
    rule: &str,
    section: &Section,
    other: &str,
    table: &GradingTable,
) -> Result<(), ConfigError> {
    if table.section_index(other).is_none() {
        return Err(ConfigError::UnknownSection {
            rule: rule.to_string(),
            section: other.to_string(),
        });
    }
    if other == section.name {
        return Err(ConfigError::SelfReference {
            rule: rule.to_string(),
            section: section.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Band;

    fn table_with(rule: LinkageRule) -> GradingTable {
        let first = Section::new("First", 1, 1)
            .with_band(Band::new("A", 0.0))
            .with_band(Band::new("B", 0.0))
            .with_band(Band::new("C", 0.0));
        let second = Section::new("Second", 1, 0)
            .with_band(Band::new("D", 0.0))
            .with_band(Band::new("E", 0.0))
            .with_linkage("r");
        GradingTable::new("T")
            .with_section(first)
            .with_section(second)
            .with_rule("r", rule)
    }

    #[test]
    fn promotion_cap_into_unknown_section_rejected() {
        let err = table_with(LinkageRule::PromotionCap {
            into: "Elite".into(),
        })
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownSection {
                rule: "r".into(),
                section: "Elite".into()
            }
        );
    }

    #[test]
    fn promotion_cap_into_own_section_rejected() {
        let err = table_with(LinkageRule::PromotionCap {
            into: "Second".into(),
        })
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::SelfReference { .. }));
    }

    #[test]
    fn promotion_cap_into_other_section_accepted() {
        assert!(table_with(LinkageRule::PromotionCap {
            into: "First".into()
        })
        .validate()
        .is_ok());
    }

    #[test]
    fn merged_pool_checks_parameters() {
        let zero_places = table_with(LinkageRule::MergedPromotionPool {
            with: vec!["First".into()],
            feed: 1,
            places: 0,
        });
        assert!(matches!(
            zero_places.validate().unwrap_err(),
            ConfigError::InvalidRule { .. }
        ));

        let duplicated = table_with(LinkageRule::MergedPromotionPool {
            with: vec!["First".into(), "First".into()],
            feed: 1,
            places: 1,
        });
        assert!(matches!(
            duplicated.validate().unwrap_err(),
            ConfigError::InvalidRule { .. }
        ));

        let ok = table_with(LinkageRule::MergedPromotionPool {
            with: vec!["First".into()],
            feed: 2,
            places: 1,
        });
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn qualifying_path_rejects_reserved_label() {
        let err = table_with(LinkageRule::QualifyingPath {
            places: 1,
            label: "Promoted".into(),
        })
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::ReservedLabel { .. }));
    }

    #[test]
    fn qualifying_path_places_bounded_by_section() {
        let err = table_with(LinkageRule::QualifyingPath {
            places: 3,
            label: "national".into(),
        })
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { .. }));
    }

    #[test]
    fn rules_deserialize_from_tagged_toml() {
        let rule: LinkageRule = toml::from_str(
            r#"
type = "merged_promotion_pool"
with = ["Third"]
feed = 2
places = 3
"#,
        )
        .unwrap();
        assert_eq!(
            rule,
            LinkageRule::MergedPromotionPool {
                with: vec!["Third".into()],
                feed: 2,
                places: 3,
            }
        );

        let rule: LinkageRule = toml::from_str(r#"type = "grading_points""#).unwrap();
        assert_eq!(rule, LinkageRule::GradingPoints);
    }
}
