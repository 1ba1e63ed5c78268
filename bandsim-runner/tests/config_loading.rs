//! Contest file → simulation → saved artifacts, through the filesystem.

use std::io::Write;

use bandsim_core::OutcomeLabel;
use bandsim_runner::export::{load_report, render_position_table, save_report};
use bandsim_runner::{read_history_file, run, ContestConfig, HistoryError, LoadError};

const CONTEST: &str = r#"
[contest]
name = "Spring Festival"

[[contest.sections]]
name = "Third"
promote = 1
relegate = 1
linkage = ["pool"]

[[contest.sections.bands]]
name = "Alpha"
strength = 0.5

[[contest.sections.bands]]
name = "Beta"

[[contest.sections.bands]]
name = "Gamma"
strength = -0.5

[[contest.sections]]
name = "Fourth"
promote = 1
relegate = 0

[[contest.sections.bands]]
name = "Delta"

[[contest.sections.bands]]
name = "Epsilon"

[contest.rules.pool]
type = "merged_promotion_pool"
with = ["Fourth"]
feed = 1
places = 1

[simulation]
trials = 4000
seed = 9
batch_size = 1000
"#;

fn write_contest(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("contest.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CONTEST.as_bytes()).unwrap();
    path
}

#[test]
fn contest_file_runs_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let config = ContestConfig::from_file(&write_contest(dir.path())).unwrap();
    let report = run(&config.contest, &config.simulation).unwrap();

    assert_eq!(report.trials, 4000);
    assert_eq!(report.seed, 9);
    assert_eq!(report.fingerprint, config.contest.fingerprint());

    // One shared promotion place between the two section winners.
    let promoted: f64 = report
        .bands
        .iter()
        .map(|b| b.probability(&OutcomeLabel::Promoted))
        .sum();
    assert!((promoted - 1.0).abs() < 1e-9);

    let out = dir.path().join("out");
    let run_dir = save_report(&report, &out).unwrap();
    assert!(run_dir.ends_with("spring-festival_9"));
    let csv = std::fs::read_to_string(run_dir.join("probabilities.csv")).unwrap();
    assert_eq!(csv.lines().count(), 1 + 5 * 3);
    assert_eq!(load_report(&run_dir).unwrap().trials, report.trials);
}

#[test]
fn missing_contest_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ContestConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn history_file_feeds_position_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fourth.csv");
    std::fs::write(&path, "Alpha,4,2\nBeta,1,1\nGamma,6,6\nDelta,3,3\nEpsilon,2,5\n").unwrap();

    let records = read_history_file(&path).unwrap();
    let table = bandsim_runner::grading_table_from_history(
        "Fourth",
        &records,
        1,
        1,
        &["Epsilon".to_string()],
    )
    .unwrap();
    let params = bandsim_runner::SimulationParams {
        trials: 5 * 200,
        seed: Some(1),
        sampler: bandsim_core::SamplerKind::Uniform,
        ..Default::default()
    };
    let report = run(&table, &params).unwrap();
    let text = render_position_table(&report);

    assert!(text.contains("\nEpsilon\n-------\n"));
    assert!(text.contains("  5a\t"));
    for name in ["Alpha", "Beta", "Gamma", "Delta"] {
        assert!(text.contains(&format!("\n{name}\n")));
    }
}

#[test]
fn missing_history_file_is_io_error() {
    let err = read_history_file(std::path::Path::new("/nonexistent/history.csv")).unwrap_err();
    assert!(matches!(err, HistoryError::Io { .. }));
}
