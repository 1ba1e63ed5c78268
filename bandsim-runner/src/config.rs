//! Contest files: TOML description of a grading table plus run parameters.
//!
//! ```toml
//! [contest]
//! name = "Regional 2026"
//!
//! [[contest.sections]]
//! name = "First"
//! promote = 2
//! relegate = 2
//! linkage = ["cap"]
//!
//! [[contest.sections.bands]]
//! name = "Hade Edge"
//! strength = 0.8
//!
//! [contest.rules.cap]
//! type = "promotion_cap"
//! into = "Championship"
//!
//! [simulation]
//! trials = 200000
//! seed = 42
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bandsim_core::{ConfigError, GradingTable};

use crate::runner::SimulationParams;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid contest file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize contest: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid grading table: {0}")]
    Table(#[from] ConfigError),
}

/// One contest file: the grading table and, optionally, how to simulate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestConfig {
    pub contest: GradingTable,
    #[serde(default)]
    pub simulation: SimulationParams,
}

impl ContestConfig {
    pub fn new(contest: GradingTable) -> Self {
        Self {
            contest,
            simulation: SimulationParams::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a contest file's contents.
    pub fn from_toml(content: &str) -> Result<Self, LoadError> {
        let config: ContestConfig = toml::from_str(content)?;
        config.contest.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, LoadError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandsim_core::rules::LinkageRule;
    use bandsim_core::SamplerKind;

    const CONTEST: &str = r#"
[contest]
name = "Area 2026"

[[contest.sections]]
name = "Second"
promote = 0
relegate = 1

[[contest.sections.bands]]
name = "Alpha"
strength = 0.3

[[contest.sections.bands]]
name = "Beta"

[[contest.sections]]
name = "Third"
promote = 2
relegate = 0
linkage = ["cap"]

[[contest.sections.bands]]
name = "Gamma"

[[contest.sections.bands]]
name = "Delta"

[[contest.sections.bands]]
name = "Epsilon"
absent = true

[contest.rules.cap]
type = "promotion_cap"
into = "Second"

[simulation]
trials = 5000
seed = 42
workers = 2
sampler = "uniform"

[simulation.convergence]
threshold = 0.01
"#;

    #[test]
    fn parses_full_contest() {
        let config = ContestConfig::from_toml(CONTEST).unwrap();
        assert_eq!(config.contest.name, "Area 2026");
        assert_eq!(config.contest.sections.len(), 2);
        assert_eq!(config.contest.sections[1].linkage, vec!["cap".to_string()]);
        assert!(config.contest.sections[1].bands[2].absent);
        assert_eq!(
            config.contest.rules["cap"],
            LinkageRule::PromotionCap {
                into: "Second".into()
            }
        );
        assert_eq!(config.simulation.trials, 5000);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.simulation.workers, 2);
        assert_eq!(config.simulation.batch_size, 10_000);
        assert_eq!(config.simulation.sampler, SamplerKind::Uniform);
        let convergence = config.simulation.convergence.unwrap();
        assert_eq!(convergence.threshold, 0.01);
        assert_eq!(convergence.min_trials, 1000);
    }

    #[test]
    fn simulation_table_is_optional() {
        let content = CONTEST.split("[simulation]").next().unwrap();
        let config = ContestConfig::from_toml(content).unwrap();
        assert_eq!(config.simulation, SimulationParams::default());
    }

    #[test]
    fn invalid_table_rejected_on_load() {
        let content = CONTEST.replace("promote = 2", "promote = 4");
        assert!(matches!(
            ContestConfig::from_toml(&content).unwrap_err(),
            LoadError::Table(ConfigError::QuotaExceedsSection { .. })
        ));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(matches!(
            ContestConfig::from_toml("[contest\nname = 1").unwrap_err(),
            LoadError::Parse(_)
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let config = ContestConfig::from_toml(CONTEST).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(ContestConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ContestConfig::from_file(Path::new("/nonexistent/contest.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/contest.toml"));
    }
}
