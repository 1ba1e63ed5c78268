//! Reporting and export: JSON, CSV, Markdown, and plain-text artifacts.
//!
//! Provides four views of a `ProbabilityReport`:
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: one row per (band, label) for spreadsheets
//! - **Markdown**: per-section probability tables and run metadata
//! - **Text**: per-band breakdown by finishing place
//!
//! Persisted reports carry a `schema_version`; newer versions are rejected
//! on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bandsim_core::OutcomeLabel;

use crate::aggregator::{ProbabilityReport, ReportWarning, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &ProbabilityReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ProbabilityReport to JSON")
}

/// Deserialize a report from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<ProbabilityReport> {
    let report: ProbabilityReport =
        serde_json::from_str(json).context("failed to deserialize ProbabilityReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: band, section, label, count, probability, std_error
pub fn export_probabilities_csv(report: &ProbabilityReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["band", "section", "label", "count", "probability", "std_error"])?;
    for band in &report.bands {
        for estimate in &band.outcomes {
            wtr.write_record([
                &band.name,
                &band.section,
                &estimate.label.to_string(),
                &estimate.count.to_string(),
                &format!("{:.6}", estimate.probability),
                &format!("{:.6}", estimate.std_error),
            ])?;
        }
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the report artifacts under `output_dir`.
///
/// Creates `{table-slug}_{seed}/` containing:
/// - `report.json`: the full `ProbabilityReport`
/// - `probabilities.csv`: per (band, label) estimates
/// - `report.md`: human-readable summary
///
/// Returns the path to the created directory.
pub fn save_report(report: &ProbabilityReport, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(format!("{}_{}", slug(&report.table), report.seed));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create report dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(
        run_dir.join("probabilities.csv"),
        export_probabilities_csv(report)?,
    )?;
    std::fs::write(run_dir.join("report.md"), generate_report(report))?;

    Ok(run_dir)
}

/// Load a report from a directory written by `save_report`.
pub fn load_report(dir: &Path) -> Result<ProbabilityReport> {
    let path = dir.join("report.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Lowercase ASCII alphanumerics, everything else collapsed to `-`.
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "contest".to_string()
    } else {
        trimmed.to_string()
    }
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(report: &ProbabilityReport) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str(&format!("# {}\n\n", report.table));

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Trials | {} |\n", report.trials));
    md.push_str(&format!("| Seed | {} |\n", report.seed));
    md.push_str(&format!("| Sampler | {:?} |\n", report.sampler));
    md.push_str(&format!("| Max Std Error | {:.4} |\n", report.max_std_error));
    match report.converged {
        Some(true) => md.push_str("| Converged | yes |\n"),
        Some(false) => md.push_str("| Converged | **no** |\n"),
        None => {}
    }
    md.push_str(&format!("| Fingerprint | {} |\n", report.fingerprint));
    md.push('\n');

    for section in report.sections() {
        md.push_str(&format!("## {section}\n\n"));
        md.push_str("| Band |");
        for label in &report.labels {
            md.push_str(&format!(" {} |", title(label)));
        }
        md.push('\n');
        md.push_str("| --- |");
        for _ in &report.labels {
            md.push_str(" ---: |");
        }
        md.push('\n');

        for band in report.bands.iter().filter(|b| b.section == section) {
            if band.absent {
                md.push_str(&format!("| {} (absent) |", band.name));
            } else {
                md.push_str(&format!("| {} |", band.name));
            }
            for label in &report.labels {
                md.push_str(&format!(" {:.1}% |", band.probability(label) * 100.0));
            }
            md.push('\n');
        }
        md.push('\n');
    }

    if !report.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &report.warnings {
            md.push_str(&format!("- {}\n", describe_warning(warning)));
        }
        md.push('\n');
    }

    md
}

fn title(label: &OutcomeLabel) -> String {
    let name = label.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

fn describe_warning(warning: &ReportWarning) -> String {
    match warning {
        ReportWarning::NonConvergence {
            threshold,
            max_std_error,
            trials,
        } => format!(
            "did not converge: max std error {max_std_error:.4} above threshold {threshold} after {trials} trials"
        ),
        ReportWarning::Cancelled { trials } => format!("cancelled after {trials} trials"),
    }
}

// ─── Position table ─────────────────────────────────────────────────

/// Per-band promote/stay/relegate percentages by finishing place.
///
/// Absent finishes are marked with an `a` after the place.
pub fn render_position_table(report: &ProbabilityReport) -> String {
    let index = |label: OutcomeLabel| report.labels.iter().position(|l| *l == label);
    let columns = [
        index(OutcomeLabel::Promoted),
        index(OutcomeLabel::Stayed),
        index(OutcomeLabel::Relegated),
    ];

    let mut out = String::new();
    for band in &report.bands {
        out.push_str(&format!("\n{}\n", band.name));
        out.push_str(&"-".repeat(band.name.chars().count()));
        out.push('\n');
        out.push_str("Place\tPromote\t Stay\tRelegate\n");
        out.push_str(&"-".repeat(32));
        out.push('\n');
        for position in &band.positions {
            let pct = |column: Option<usize>| {
                column.map_or(0.0, |i| position.probabilities[i] * 100.0)
            };
            let place = if position.absent {
                format!("{:2}a", position.place)
            } else {
                format!("{:2}", position.place)
            };
            out.push_str(&format!(
                " {}\t{:5.1}\t{:5.1}\t{:5.1}\n",
                place,
                pct(columns[0]),
                pct(columns[1]),
                pct(columns[2])
            ));
        }
    }
    out
}
