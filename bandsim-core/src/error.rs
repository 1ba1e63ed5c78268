//! Error types for table validation, sampling, and rule evaluation.

use thiserror::Error;

/// Structural problem with a grading table, detected before any trial runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("grading table '{table}' has no sections")]
    NoSections { table: String },

    #[error("section '{section}' has no bands")]
    EmptySection { section: String },

    #[error("section '{section}' has no competing bands: all {count} are absent")]
    NoCompetingBands { section: String, count: usize },

    #[error("section '{section}' is declared more than once")]
    DuplicateSection { section: String },

    #[error("band '{band}' is entered in both '{first}' and '{second}'")]
    DuplicateBand {
        band: String,
        first: String,
        second: String,
    },

    #[error(
        "section '{section}': promote {promote} + relegate {relegate} exceeds its {size} bands"
    )]
    QuotaExceedsSection {
        section: String,
        promote: usize,
        relegate: usize,
        size: usize,
    },

    #[error("section '{section}' references unknown rule '{rule}'")]
    UnknownRule { section: String, rule: String },

    #[error("rule '{rule}' references unknown section '{section}'")]
    UnknownSection { rule: String, section: String },

    #[error("rule '{rule}' applied to section '{section}' must name a different section")]
    SelfReference { rule: String, section: String },

    #[error("rule '{rule}': label '{label}' is reserved")]
    ReservedLabel { rule: String, label: String },

    #[error("rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },
}

/// Failure drawing a section ranking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingError {
    #[error("cannot rank an empty section")]
    EmptySection,

    #[error("strength at index {index} is not finite ({value})")]
    NonFiniteStrength { index: usize, value: f64 },
}

/// Failure evaluating the contest rule for one trial.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("expected {expected} section rankings, got {got}")]
    RankingCount { expected: usize, got: usize },

    #[error("ranking for section '{section}' is not a permutation of its {size} bands")]
    InvalidRanking { section: String, size: usize },

    #[error("label '{label}' is not in the engine's label set")]
    UnknownLabel { label: String },
}
