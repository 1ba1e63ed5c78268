//! Simulation runner: drives trials in batches and merges worker tallies.
//!
//! Two entry points:
//! - `run()`: plain run to the trial cap or convergence.
//! - `run_with()`: adds a progress callback and a cooperative cancel flag.
//!
//! Each (trial, section) pair gets its own hash-derived RNG, so the report
//! depends only on the table, the parameters, and the seed: never on the
//! worker count or the order rayon schedules work in.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use bandsim_core::{
    ConfigError, GradingTable, RankingSampler, RngHierarchy, RuleEngine, RuleError, SamplerKind,
    SamplingError, SectionRanking,
};

use crate::aggregator::{Convergence, ProbabilityReport, ResultAggregator, RunSummary};
use crate::tally::TallyTable;

/// Errors that abort a run. Partial tallies are never reported.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid grading table: {0}")]
    Config(#[from] ConfigError),
    #[error(
        "sampling failed in section '{section}'{} at trial {trial}: {source}",
        band_clause(.band)
    )]
    Sampling {
        section: String,
        /// Band whose input was rejected, when the failure is band-specific.
        band: Option<String>,
        trial: u64,
        #[source]
        source: SamplingError,
    },
    #[error("rule evaluation failed at trial {trial}: {source}")]
    Rule {
        trial: u64,
        #[source]
        source: RuleError,
    },
    #[error("invalid simulation parameters: {0}")]
    InvalidParams(String),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(String),
}

fn band_clause(band: &Option<String>) -> String {
    band.as_ref()
        .map(|name| format!(" for band '{name}'"))
        .unwrap_or_default()
}

impl SimError {
    /// Trial the error occurred in, for per-trial failures.
    pub fn trial(&self) -> Option<u64> {
        match self {
            SimError::Sampling { trial, .. } | SimError::Rule { trial, .. } => Some(*trial),
            _ => None,
        }
    }
}

/// Run parameters. Everything except the seed has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Trial cap.
    pub trials: u64,
    /// Master seed; drawn from the OS and reported back when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub workers: usize,
    pub batch_size: u64,
    pub sampler: SamplerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<Convergence>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            trials: 100_000,
            seed: None,
            workers: 1,
            batch_size: 10_000,
            sampler: SamplerKind::PlackettLuce,
            convergence: None,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.trials == 0 {
            return Err(SimError::InvalidParams("trials must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(SimError::InvalidParams("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(SimError::InvalidParams("batch_size must be at least 1".into()));
        }
        if let Some(c) = &self.convergence {
            if !c.threshold.is_finite() || c.threshold <= 0.0 {
                return Err(SimError::InvalidParams(format!(
                    "convergence threshold must be finite and positive, got {}",
                    c.threshold
                )));
            }
        }
        Ok(())
    }
}

/// Progress snapshot passed to the callback after every batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SimProgress {
    pub trials_done: u64,
    pub trials_total: u64,
    pub max_std_error: f64,
    pub elapsed_secs: f64,
}

/// Run `table` to its trial cap or convergence.
pub fn run(table: &GradingTable, params: &SimulationParams) -> Result<ProbabilityReport, SimError> {
    run_with(table, params, None, None)
}

/// Run with an optional progress callback and cancel flag.
///
/// The cancel flag is checked between batches; the batch in flight always
/// completes and is counted.
pub fn run_with(
    table: &GradingTable,
    params: &SimulationParams,
    progress_cb: Option<&dyn Fn(&SimProgress)>,
    cancel: Option<&AtomicBool>,
) -> Result<ProbabilityReport, SimError> {
    params.validate()?;
    let engine = RuleEngine::new(table)?;
    let seed = params.seed.unwrap_or_else(|| OsRng.next_u64());
    let start_time = Instant::now();

    info!(
        table = %table.name,
        fingerprint = %table.fingerprint(),
        seed,
        trials = params.trials,
        workers = params.workers,
        sampler = params.sampler.sampler().name(),
        "starting simulation"
    );

    let thread_pool = if params.workers > 1 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(params.workers)
                .build()
                .map_err(|e| SimError::ThreadPool(e.to_string()))?,
        )
    } else {
        None
    };

    let trial_runner = TrialRunner {
        engine: &engine,
        sampler: params.sampler.sampler(),
        hierarchy: RngHierarchy::new(seed),
    };
    let aggregator = ResultAggregator::new(table, &engine);

    let mut tally = TallyTable::for_engine(&engine);
    let mut cancelled = false;
    let mut done: u64 = 0;

    while done < params.trials {
        let end = (done + params.batch_size).min(params.trials);
        let batch = match &thread_pool {
            Some(pool) => pool.install(|| trial_runner.run_parallel(done..end))?,
            None => trial_runner.run_serial(done..end)?,
        };
        tally.merge(&batch);
        done = end;

        let max_std_error = aggregator.max_std_error(&tally);
        debug!(trials = done, max_std_error, "batch complete");

        if let Some(cb) = progress_cb {
            cb(&SimProgress {
                trials_done: done,
                trials_total: params.trials,
                max_std_error,
                elapsed_secs: start_time.elapsed().as_secs_f64(),
            });
        }

        if let Some(criterion) = &params.convergence {
            if aggregator.is_converged(&tally, criterion) {
                debug!(trials = done, "converged");
                break;
            }
        }
        if done < params.trials && cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            cancelled = true;
            break;
        }
    }

    let report = aggregator.report(
        &tally,
        RunSummary {
            seed,
            sampler: params.sampler,
            convergence: params.convergence,
            cancelled,
        },
    );

    if cancelled {
        warn!(trials = report.trials, "simulation cancelled");
    } else if report.converged == Some(false) {
        warn!(
            trials = report.trials,
            max_std_error = report.max_std_error,
            "simulation did not converge within the trial cap"
        );
    }
    info!(
        trials = report.trials,
        converged = ?report.converged,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "simulation finished"
    );

    Ok(report)
}

/// Per-run trial executor shared read-only by every worker.
struct TrialRunner<'a> {
    engine: &'a RuleEngine,
    sampler: &'static dyn RankingSampler,
    hierarchy: RngHierarchy,
}

/// Per-worker buffers reused across trials.
struct Scratch {
    rankings: Vec<SectionRanking>,
    positions: Vec<usize>,
    labels: Vec<usize>,
}

impl TrialRunner<'_> {
    fn scratch(&self) -> Scratch {
        let bands = self.engine.band_count();
        Scratch {
            rankings: Vec::with_capacity(self.engine.sections().len()),
            positions: vec![0; bands],
            labels: vec![0; bands],
        }
    }

    fn run_serial(&self, trials: Range<u64>) -> Result<TallyTable, SimError> {
        let mut tally = TallyTable::for_engine(self.engine);
        let mut scratch = self.scratch();
        for trial in trials {
            self.run_trial(trial, &mut tally, &mut scratch)?;
        }
        Ok(tally)
    }

    /// Fold trials into per-task tallies, then reduce.
    ///
    /// Each task stops at its first failure; the reduction keeps the failure
    /// with the lowest trial index so the reported error is independent of
    /// scheduling.
    fn run_parallel(&self, trials: Range<u64>) -> Result<TallyTable, SimError> {
        trials
            .into_par_iter()
            .fold(
                || (Ok(TallyTable::for_engine(self.engine)), self.scratch()),
                |(acc, mut scratch), trial| {
                    let acc = acc.and_then(|mut tally| {
                        self.run_trial(trial, &mut tally, &mut scratch)?;
                        Ok(tally)
                    });
                    (acc, scratch)
                },
            )
            .map(|(acc, _)| acc)
            .reduce(
                || Ok(TallyTable::for_engine(self.engine)),
                |a, b| match (a, b) {
                    (Ok(mut a), Ok(b)) => {
                        a.merge(&b);
                        Ok(a)
                    }
                    (Err(a), Err(b)) => Err(earliest(a, b)),
                    (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
                },
            )
    }

    fn run_trial(&self, trial: u64, tally: &mut TallyTable, scratch: &mut Scratch) -> Result<(), SimError> {
        scratch.rankings.clear();
        for (index, layout) in self.engine.sections().iter().enumerate() {
            let mut rng = self.hierarchy.rng_for(trial, &layout.name);
            let ranking = SectionRanking::draw(index, layout, self.sampler, &mut rng).map_err(|source| {
                let band = match &source {
                    SamplingError::NonFiniteStrength { index, .. } => layout.band_names.get(*index).cloned(),
                    SamplingError::EmptySection => None,
                };
                SimError::Sampling {
                    section: layout.name.clone(),
                    band,
                    trial,
                    source,
                }
            })?;
            let played = layout.played();
            for (rank, &band) in ranking.order.iter().enumerate() {
                scratch.positions[layout.offset + band] = rank.min(played);
            }
            scratch.rankings.push(ranking);
        }

        let labels = self
            .engine
            .evaluate(&scratch.rankings)
            .map_err(|source| SimError::Rule { trial, source })?;
        let label_set = self.engine.labels();
        for (slot, label) in scratch.labels.iter_mut().zip(&labels) {
            *slot = label_set.index_of(label).ok_or_else(|| SimError::Rule {
                trial,
                source: RuleError::UnknownLabel {
                    label: label.to_string(),
                },
            })?;
        }

        tally.record_trial(&scratch.positions, &scratch.labels);
        Ok(())
    }
}

fn earliest(a: SimError, b: SimError) -> SimError {
    match (a.trial(), b.trial()) {
        (Some(ta), Some(tb)) if tb < ta => b,
        _ => a,
    }
}
