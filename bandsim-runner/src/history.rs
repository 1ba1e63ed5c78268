//! Grading-history import.
//!
//! Reads the per-section results sheet: one row per band,
//! `name, result two years ago, result last year`, no header. Rows with
//! fewer than three cells are skipped. The result becomes a section whose
//! linkage regrades it on cumulative grading points.

use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use bandsim_core::rules::LinkageRule;
use bandsim_core::{Band, ConfigError, GradingTable, Section};

/// Rule name under which imported sections reference grading points.
pub const GRADING_POINTS_RULE: &str = "grading_points";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: '{value}' is not a finishing place")]
    InvalidResult { line: u64, value: String },
    #[error("absent band '{name}' is not in the history")]
    UnknownAbsentBand { name: String },
    #[error("no bands in the history")]
    Empty,
    #[error("invalid section: {0}")]
    Table(#[from] ConfigError),
}

/// One band's row of the results sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub name: String,
    pub two_years_ago: u32,
    pub last_year: u32,
}

/// Parse history rows from any reader.
pub fn read_history<R: Read>(reader: R) -> Result<Vec<HistoryRecord>, HistoryError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        if row.len() < 3 {
            continue;
        }
        let line = row.position().map_or(0, |p| p.line());
        records.push(HistoryRecord {
            name: row[0].to_string(),
            two_years_ago: parse_place(&row[1], line)?,
            last_year: parse_place(&row[2], line)?,
        });
    }
    Ok(records)
}

pub fn read_history_file(path: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    let file = std::fs::File::open(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_history(file)
}

/// Places may be written as floats (`3.0`) but must be whole and non-negative.
fn parse_place(cell: &str, line: u64) -> Result<u32, HistoryError> {
    let invalid = || HistoryError::InvalidResult {
        line,
        value: cell.to_string(),
    };
    let value: f64 = cell.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok(value as u32)
}

/// Build a section regraded on grading points.
///
/// All bands get equal strength; `absent` names must match rows exactly.
pub fn section_from_history(
    name: &str,
    records: &[HistoryRecord],
    promote: usize,
    relegate: usize,
    absent: &[String],
) -> Result<Section, HistoryError> {
    if records.is_empty() {
        return Err(HistoryError::Empty);
    }
    if let Some(missing) = absent.iter().find(|a| !records.iter().any(|r| &r.name == *a)) {
        return Err(HistoryError::UnknownAbsentBand {
            name: missing.clone(),
        });
    }

    let section = records.iter().fold(
        Section::new(name, promote, relegate).with_linkage(GRADING_POINTS_RULE),
        |section, record| {
            let band = Band::new(record.name.clone(), 0.0)
                .with_prior_results(vec![record.two_years_ago, record.last_year]);
            section.with_band(if absent.contains(&record.name) {
                band.mark_absent()
            } else {
                band
            })
        },
    );
    Ok(section)
}

/// One-section grading table from history, with the grading-points rule
/// defined and the table validated.
pub fn grading_table_from_history(
    name: &str,
    records: &[HistoryRecord],
    promote: usize,
    relegate: usize,
    absent: &[String],
) -> Result<GradingTable, HistoryError> {
    let section = section_from_history(name, records, promote, relegate, absent)?;
    let table = GradingTable::new(name)
        .with_section(section)
        .with_rule(GRADING_POINTS_RULE, LinkageRule::GradingPoints);
    table.validate()?;
    Ok(table)
}
