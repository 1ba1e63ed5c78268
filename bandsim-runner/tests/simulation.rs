//! End-to-end simulation tests: statistical expectations, reproducibility,
//! convergence, and failure reporting.

use bandsim_core::rules::LinkageRule;
use bandsim_core::{Band, ConfigError, GradingTable, OutcomeLabel, SamplerKind, SamplingError, Section};
use bandsim_runner::{
    grading_table_from_history, read_history, run, Convergence, HistoryRecord, ProbabilityReport,
    ReportWarning, SimError, SimulationParams,
};

fn section(name: &str, promote: usize, relegate: usize, strengths: &[f64]) -> Section {
    strengths
        .iter()
        .enumerate()
        .fold(Section::new(name, promote, relegate), |s, (i, &strength)| {
            s.with_band(Band::new(format!("{name} {}", i + 1), strength))
        })
}

fn params(trials: u64, workers: usize) -> SimulationParams {
    SimulationParams {
        trials,
        seed: Some(2026),
        workers,
        batch_size: 5_000,
        ..SimulationParams::default()
    }
}

fn equal_four() -> GradingTable {
    GradingTable::new("Equal").with_section(section("Fourth", 1, 1, &[0.0; 4]))
}

#[test]
fn four_equal_bands_match_quota_shares() {
    let report = run(&equal_four(), &params(100_000, 4)).unwrap();
    assert_eq!(report.trials, 100_000);
    for band in &report.bands {
        assert!((band.probability(&OutcomeLabel::Promoted) - 0.25).abs() < 0.01);
        assert!((band.probability(&OutcomeLabel::Stayed) - 0.50).abs() < 0.01);
        assert!((band.probability(&OutcomeLabel::Relegated) - 0.25).abs() < 0.01);
    }
}

#[test]
fn probabilities_sum_to_one() {
    let table = GradingTable::new("Linked")
        .with_section(section("Championship", 0, 2, &[1.0, 0.5, 0.0, -0.5]))
        .with_section(
            section("First", 2, 1, &[0.3, 0.2, 0.1, 0.0, -0.1])
                .with_linkage("cap")
                .with_linkage("national"),
        )
        .with_rule(
            "cap",
            LinkageRule::PromotionCap {
                into: "Championship".into(),
            },
        )
        .with_rule(
            "national",
            LinkageRule::QualifyingPath {
                places: 3,
                label: "national".into(),
            },
        );
    let report = run(&table, &params(10_000, 2)).unwrap();
    assert_eq!(report.labels.len(), 4);
    for band in &report.bands {
        let sum: f64 = band.outcomes.iter().map(|e| e.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9, "{} sums to {sum}", band.name);
        for e in &band.outcomes {
            assert!((0.0..=1.0).contains(&e.probability));
        }
        let by_place: u64 = band.positions.iter().map(|p| p.trials).sum();
        assert_eq!(by_place, report.trials);
    }
}

#[test]
fn report_identical_across_worker_counts() {
    let table = GradingTable::new("Repro")
        .with_section(section("Second", 2, 2, &[0.4, 0.1, 0.0, -0.2, -0.6, 0.9]))
        .with_section(section("Third", 1, 1, &[0.0, 0.2, -0.2]));
    let serial = run(&table, &params(20_000, 1)).unwrap();
    let parallel = run(&table, &params(20_000, 4)).unwrap();
    let mut rebatched = params(20_000, 3);
    rebatched.batch_size = 777;
    let rebatched = run(&table, &rebatched).unwrap();

    let json = |r: &ProbabilityReport| serde_json::to_string(r).unwrap();
    assert_eq!(json(&serial), json(&parallel));
    assert_eq!(json(&serial), json(&rebatched));
}

#[test]
fn promoting_everyone_is_certain() {
    let table = GradingTable::new("All").with_section(section("Fourth", 3, 0, &[2.0, 0.0, -2.0]));
    let report = run(&table, &params(2_000, 1)).unwrap();
    for band in &report.bands {
        assert_eq!(band.probability(&OutcomeLabel::Promoted), 1.0);
    }
}

#[test]
fn dominant_band_is_almost_always_promoted() {
    let table = GradingTable::new("Dominant")
        .with_section(section("Third", 1, 1, &[20.0, 0.0, 0.0, 0.0, 0.0]));
    let report = run(&table, &params(20_000, 2)).unwrap();
    assert!(report.bands[0].probability(&OutcomeLabel::Promoted) > 0.999);
}

#[test]
fn promotion_rises_with_strength() {
    let table = GradingTable::new("Ladder")
        .with_section(section("Second", 2, 2, &[1.0, 0.5, 0.0, -0.5, -1.0]));
    let report = run(&table, &params(50_000, 2)).unwrap();
    let promoted: Vec<f64> = report
        .bands
        .iter()
        .map(|b| b.probability(&OutcomeLabel::Promoted))
        .collect();
    for pair in promoted.windows(2) {
        assert!(pair[0] > pair[1], "not monotone: {promoted:?}");
    }
}

#[test]
fn oversized_quota_is_a_config_error() {
    let table = GradingTable::new("Bad").with_section(section("Fourth", 3, 2, &[0.0; 4]));
    let err = run(&table, &params(100, 1)).unwrap_err();
    assert!(matches!(
        err,
        SimError::Config(ConfigError::QuotaExceedsSection {
            promote: 3,
            relegate: 2,
            size: 4,
            ..
        })
    ));
}

#[test]
fn convergence_stops_before_cap() {
    let mut p = params(1_000_000, 2);
    p.batch_size = 1_000;
    p.convergence = Some(Convergence {
        threshold: 0.01,
        min_trials: 1_000,
    });
    let report = run(&equal_four(), &p).unwrap();
    assert_eq!(report.converged, Some(true));
    assert!(report.trials < 1_000_000);
    assert!(report.max_std_error < 0.01);
    for band in &report.bands {
        for e in &band.outcomes {
            assert!(e.std_error <= 0.01);
        }
    }
    assert!(report.warnings.is_empty());
}

#[test]
fn unmet_convergence_warns() {
    let mut p = params(2_000, 1);
    p.batch_size = 1_000;
    p.convergence = Some(Convergence::with_threshold(0.001));
    let report = run(&equal_four(), &p).unwrap();
    assert_eq!(report.trials, 2_000);
    assert_eq!(report.converged, Some(false));
    assert!(matches!(
        report.warnings.as_slice(),
        [ReportWarning::NonConvergence { trials: 2_000, .. }]
    ));
}

#[test]
fn non_finite_strength_names_section_and_trial() {
    let table = GradingTable::new("Broken")
        .with_section(section("Second", 1, 1, &[0.0, 0.0, 0.0]))
        .with_section(section("Third", 1, 1, &[0.0, f64::NAN, 0.0]));
    for workers in [1, 4] {
        match run(&table, &params(10_000, workers)).unwrap_err() {
            SimError::Sampling {
                section,
                band,
                trial,
                source,
            } => {
                assert_eq!(section, "Third");
                assert_eq!(band.as_deref(), Some("Third 2"));
                assert_eq!(trial, 0);
                assert!(matches!(source, SamplingError::NonFiniteStrength { index: 1, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

fn section_with_absent_lead(strengths: [f64; 4], lead_absent: bool) -> Section {
    ["A", "B", "C", "D"]
        .iter()
        .zip(strengths)
        .enumerate()
        .fold(Section::new("Third", 1, 1), |s, (i, (name, strength))| {
            let band = Band::new(*name, strength);
            s.with_band(if i == 0 && lead_absent { band.mark_absent() } else { band })
        })
}

#[test]
fn non_finite_strength_after_absent_band_names_that_band() {
    let table = GradingTable::new("Gaps")
        .with_section(section_with_absent_lead([0.0, 0.0, f64::NAN, 0.0], true));
    for workers in [1, 4] {
        match run(&table, &params(10_000, workers)).unwrap_err() {
            SimError::Sampling {
                section,
                band,
                trial,
                source,
            } => {
                assert_eq!(section, "Third");
                assert_eq!(band.as_deref(), Some("C"));
                assert_eq!(trial, 0);
                assert!(matches!(source, SamplingError::NonFiniteStrength { index: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn non_finite_strength_on_absent_band_fails() {
    let table = GradingTable::new("Gaps")
        .with_section(section_with_absent_lead([f64::NAN, 0.0, 0.0, 0.0], true));
    for sampler in [SamplerKind::PlackettLuce, SamplerKind::Uniform] {
        let mut p = params(1_000, 1);
        p.sampler = sampler;
        match run(&table, &p).unwrap_err() {
            SimError::Sampling { band, trial, .. } => {
                assert_eq!(band.as_deref(), Some("A"));
                assert_eq!(trial, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn raising_one_band_never_hurts_it() {
    let base = [0.5, 0.2, 0.0, -0.2, -0.5];
    let k = 2;
    let mut raised = base;
    raised[k] = 1.5;

    let before = run(
        &GradingTable::new("Before").with_section(section("Second", 2, 2, &base)),
        &params(40_000, 2),
    )
    .unwrap();
    let after = run(
        &GradingTable::new("After").with_section(section("Second", 2, 2, &raised)),
        &params(40_000, 2),
    )
    .unwrap();

    let band = |r: &ProbabilityReport| r.bands[k].clone();
    let (before, after) = (band(&before), band(&after));
    assert!(
        after.probability(&OutcomeLabel::Promoted) >= before.probability(&OutcomeLabel::Promoted),
        "promotion dropped"
    );
    assert!(
        after.probability(&OutcomeLabel::Relegated) <= before.probability(&OutcomeLabel::Relegated),
        "relegation rose"
    );
}

#[test]
fn absent_band_is_always_last_and_relegated() {
    let table = GradingTable::new("Absence").with_section(
        section("Fourth", 1, 1, &[0.0, 0.0, 0.0])
            .with_band(Band::new("No Show", 5.0).mark_absent()),
    );
    let report = run(&table, &params(5_000, 1)).unwrap();
    let absent = report.band("No Show").unwrap();
    assert!(absent.absent);
    assert_eq!(absent.probability(&OutcomeLabel::Relegated), 1.0);
    assert_eq!(absent.positions.len(), 1);
    assert_eq!(absent.positions[0].place, 4);
    assert!(absent.positions[0].absent);
    for band in report.bands.iter().filter(|b| !b.absent) {
        assert_eq!(band.probability(&OutcomeLabel::Relegated), 0.0);
    }
}

#[test]
fn grading_points_history_fixes_extremes() {
    let records = read_history("A, 1, 1\nB, 10, 10\nC, 5, 5\nD, 6, 6\n".as_bytes()).unwrap();
    assert_eq!(
        records[1],
        HistoryRecord {
            name: "B".into(),
            two_years_ago: 10,
            last_year: 10
        }
    );
    let table = grading_table_from_history("Fourth", &records, 1, 1, &[]).unwrap();
    let mut p = params(4_000, 1);
    p.sampler = SamplerKind::Uniform;
    let report = run(&table, &p).unwrap();
    assert_eq!(report.probability("A", &OutcomeLabel::Promoted), Some(1.0));
    assert_eq!(report.probability("B", &OutcomeLabel::Relegated), Some(1.0));
    assert_eq!(report.probability("C", &OutcomeLabel::Stayed), Some(1.0));
}
