//! Result aggregation: tallies to probabilities, standard errors, and the
//! convergence check.
//!
//! For every (band, label) cell, `p = count / T` and
//! `se = sqrt(p * (1 - p) / T)`. A run converges once it has at least
//! `min_trials` trials and every cell's standard error is below `threshold`.

use serde::{Deserialize, Serialize};

use bandsim_core::{GradingTable, OutcomeLabel, RuleEngine, SamplerKind};

use crate::tally::TallyTable;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_STD_ERROR_THRESHOLD: f64 = 0.005;
pub const DEFAULT_MIN_TRIALS: u64 = 1000;

/// Early-stop criterion for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Convergence {
    /// Every cell's standard error must fall strictly below this.
    pub threshold: f64,
    /// Trials required before convergence is even checked.
    pub min_trials: u64,
}

impl Default for Convergence {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_STD_ERROR_THRESHOLD,
            min_trials: DEFAULT_MIN_TRIALS,
        }
    }
}

impl Convergence {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

/// Binomial standard error of a proportion `p` estimated from `trials`.
pub fn std_error(p: f64, trials: u64) -> f64 {
    if trials == 0 {
        return f64::INFINITY;
    }
    (p * (1.0 - p) / trials as f64).sqrt()
}

/// Probability estimate for one (band, label) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEstimate {
    pub label: OutcomeLabel,
    pub count: u64,
    pub probability: f64,
    pub std_error: f64,
}

/// Label probabilities conditional on one finishing place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionBreakdown {
    /// 1-based finishing place. Absent bands share `played + 1`.
    pub place: u32,
    pub absent: bool,
    /// Trials in which the band finished here.
    pub trials: u64,
    /// Parallel to the report's `labels`.
    pub probabilities: Vec<f64>,
}

/// Every estimate for one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandReport {
    pub name: String,
    pub section: String,
    #[serde(default)]
    pub absent: bool,
    pub outcomes: Vec<OutcomeEstimate>,
    #[serde(default)]
    pub positions: Vec<PositionBreakdown>,
}

impl BandReport {
    /// Estimated probability of `label`, zero if the label never applies.
    pub fn probability(&self, label: &OutcomeLabel) -> f64 {
        self.estimate(label).map_or(0.0, |e| e.probability)
    }

    pub fn estimate(&self, label: &OutcomeLabel) -> Option<&OutcomeEstimate> {
        self.outcomes.iter().find(|e| &e.label == label)
    }
}

/// Non-fatal conditions attached to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    /// A convergence criterion was set but the trial cap came first.
    NonConvergence {
        threshold: f64,
        max_std_error: f64,
        trials: u64,
    },
    /// The run was stopped from outside before reaching its cap.
    Cancelled { trials: u64 },
}

/// Final, immutable result of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub table: String,
    pub fingerprint: String,
    pub seed: u64,
    pub trials: u64,
    pub sampler: SamplerKind,
    pub labels: Vec<OutcomeLabel>,
    /// `None` when no convergence criterion was configured.
    pub converged: Option<bool>,
    pub max_std_error: f64,
    /// In table order.
    pub bands: Vec<BandReport>,
    #[serde(default)]
    pub warnings: Vec<ReportWarning>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ProbabilityReport {
    pub fn band(&self, name: &str) -> Option<&BandReport> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// Estimated probability that `band` ends the trial with `label`.
    pub fn probability(&self, band: &str, label: &OutcomeLabel) -> Option<f64> {
        self.band(band).map(|b| b.probability(label))
    }

    /// Section names in table order.
    pub fn sections(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for band in &self.bands {
            if names.last() != Some(&band.section.as_str()) {
                names.push(&band.section);
            }
        }
        names
    }
}

/// Run metadata the aggregator cannot read off the tally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub seed: u64,
    pub sampler: SamplerKind,
    pub convergence: Option<Convergence>,
    pub cancelled: bool,
}

/// Converts tallies into estimates for one compiled table.
pub struct ResultAggregator<'a> {
    table: &'a GradingTable,
    engine: &'a RuleEngine,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(table: &'a GradingTable, engine: &'a RuleEngine) -> Self {
        Self { table, engine }
    }

    /// Largest standard error over every (band, label) cell.
    pub fn max_std_error(&self, tally: &TallyTable) -> f64 {
        let trials = tally.trials();
        if trials == 0 {
            return f64::INFINITY;
        }
        let mut worst: f64 = 0.0;
        for band in 0..tally.band_count() {
            for label in 0..tally.label_count() {
                let p = tally.count(band, label) as f64 / trials as f64;
                worst = worst.max(std_error(p, trials));
            }
        }
        worst
    }

    pub fn is_converged(&self, tally: &TallyTable, criterion: &Convergence) -> bool {
        tally.trials() >= criterion.min_trials && self.max_std_error(tally) < criterion.threshold
    }

    /// Build the final report. Bands keep table order.
    pub fn report(&self, tally: &TallyTable, summary: RunSummary) -> ProbabilityReport {
        let trials = tally.trials();
        let labels = self.engine.labels().as_slice().to_vec();
        let max_std_error = self.max_std_error(tally);

        let mut bands = Vec::with_capacity(tally.band_count());
        let mut global = 0;
        for (section, layout) in self.table.sections.iter().zip(self.engine.sections()) {
            for band in &section.bands {
                bands.push(BandReport {
                    name: band.name.clone(),
                    section: section.name.clone(),
                    absent: band.absent,
                    outcomes: self.estimates(tally, global, &labels),
                    positions: self.breakdown(tally, global, layout.played()),
                });
                global += 1;
            }
        }

        let mut warnings = Vec::new();
        let converged = summary.convergence.map(|c| self.is_converged(tally, &c));
        if let (Some(c), Some(false)) = (summary.convergence, converged) {
            if !summary.cancelled {
                warnings.push(ReportWarning::NonConvergence {
                    threshold: c.threshold,
                    max_std_error,
                    trials,
                });
            }
        }
        if summary.cancelled {
            warnings.push(ReportWarning::Cancelled { trials });
        }

        ProbabilityReport {
            schema_version: SCHEMA_VERSION,
            table: self.table.name.clone(),
            fingerprint: self.table.fingerprint(),
            seed: summary.seed,
            trials,
            sampler: summary.sampler,
            labels,
            converged,
            max_std_error,
            bands,
            warnings,
        }
    }

    fn estimates(&self, tally: &TallyTable, band: usize, labels: &[OutcomeLabel]) -> Vec<OutcomeEstimate> {
        let trials = tally.trials();
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let count = tally.count(band, i);
                let probability = ratio(count, trials);
                OutcomeEstimate {
                    label: label.clone(),
                    count,
                    probability,
                    std_error: if trials == 0 { 0.0 } else { std_error(probability, trials) },
                }
            })
            .collect()
    }

    /// Places with at least one trial. Slot `played` holds absent finishes.
    fn breakdown(&self, tally: &TallyTable, band: usize, played: usize) -> Vec<PositionBreakdown> {
        (0..tally.position_slots(band))
            .filter_map(|slot| {
                let total = tally.position_total(band, slot);
                if total == 0 {
                    return None;
                }
                Some(PositionBreakdown {
                    place: (slot + 1) as u32,
                    absent: slot >= played,
                    trials: total,
                    probabilities: (0..tally.label_count())
                        .map(|label| ratio(tally.position_count(band, slot, label), total))
                        .collect(),
                })
            })
            .collect()
    }
}

fn ratio(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
