//! Bandsim Core — grading table model, ranking samplers, contest rule engine.
//!
//! This crate contains the deterministic and per-trial parts of the
//! promotion/relegation simulator:
//! - Domain types (bands, sections, grading tables, outcome labels)
//! - Hash-derived RNG hierarchy for reproducible, parallel trials
//! - Ranking samplers (Plackett–Luce, uniform)
//! - Rule engine: base quota rule plus an ordered pipeline of linkage rules

pub mod domain;
pub mod error;
pub mod rng;
pub mod rules;
pub mod sampler;

pub use domain::{Band, GradingTable, LabelSet, OutcomeLabel, Section};
pub use error::{ConfigError, RuleError, SamplingError};
pub use rng::RngHierarchy;
pub use rules::{LinkageRule, RuleEngine, SectionLayout};
pub use sampler::{PlackettLuce, RankingSampler, SamplerKind, SectionRanking, UniformSampler};
