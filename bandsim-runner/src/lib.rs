//! Bandsim Runner — Monte Carlo orchestration, tallies, reports, contest files.
//!
//! This crate builds on `bandsim-core` to provide:
//! - Batched, parallel trial execution with reproducible seeding
//! - Per-worker tallies merged at batch boundaries
//! - Probability and standard-error aggregation with a convergence check
//! - TOML contest files and CSV grading-history import
//! - JSON / CSV / Markdown report export

pub mod aggregator;
pub mod config;
pub mod export;
pub mod history;
pub mod runner;
pub mod tally;

pub use aggregator::{
    std_error, BandReport, Convergence, OutcomeEstimate, PositionBreakdown, ProbabilityReport,
    ReportWarning, ResultAggregator, RunSummary, DEFAULT_MIN_TRIALS, DEFAULT_STD_ERROR_THRESHOLD,
    SCHEMA_VERSION,
};
pub use config::{ContestConfig, LoadError};
pub use history::{
    grading_table_from_history, read_history, read_history_file, section_from_history,
    HistoryError, HistoryRecord, GRADING_POINTS_RULE,
};
pub use runner::{run, run_with, SimError, SimProgress, SimulationParams};
pub use tally::TallyTable;
