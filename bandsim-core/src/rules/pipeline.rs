//! Compiled pipeline steps and their label transformations.
//!
//! Each step takes the current label vector by value and returns the revised
//! one. Steps never consume randomness.

use crate::domain::{GradingTable, OutcomeLabel};
use crate::error::ConfigError;
use crate::sampler::SectionRanking;

use super::layout::SectionLayout;
use super::linkage::LinkageRule;

/// A linkage rule resolved against one section of one table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    GradingPoints {
        section: usize,
    },
    PromotionCap {
        section: usize,
        into: usize,
    },
    MergedPromotionPool {
        /// Referencing section first, then `with`, sorted into table order.
        sections: Vec<usize>,
        feed: usize,
        places: usize,
    },
    QualifyingPath {
        section: usize,
        places: usize,
        label: OutcomeLabel,
    },
}

/// One named entry of the compiled pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub rule: String,
    pub section: String,
    pub(crate) step: Step,
}

/// Read-only view of one trial handed to every step.
pub(crate) struct TrialView<'a> {
    pub layouts: &'a [SectionLayout],
    pub rankings: &'a [SectionRanking],
}

impl Step {
    /// Resolve `rule`, referenced from the section at `section`, to indices.
    ///
    /// The table must already be validated.
    pub(crate) fn compile(
        rule_name: &str,
        rule: &LinkageRule,
        section: usize,
        table: &GradingTable,
    ) -> Result<Self, ConfigError> {
        let index_of = |name: &str| {
            table
                .section_index(name)
                .ok_or_else(|| ConfigError::UnknownSection {
                    rule: rule_name.to_string(),
                    section: name.to_string(),
                })
        };

        Ok(match rule {
            LinkageRule::GradingPoints => Step::GradingPoints { section },
            LinkageRule::PromotionCap { into } => Step::PromotionCap {
                section,
                into: index_of(into)?,
            },
            LinkageRule::MergedPromotionPool { with, feed, places } => {
                let mut sections = vec![section];
                for other in with {
                    sections.push(index_of(other)?);
                }
                sections.sort_unstable();
                Step::MergedPromotionPool {
                    sections,
                    feed: *feed,
                    places: *places,
                }
            }
            LinkageRule::QualifyingPath { places, label } => Step::QualifyingPath {
                section,
                places: *places,
                label: OutcomeLabel::Qualified(label.clone()),
            },
        })
    }

    pub(crate) fn apply(&self, view: &TrialView<'_>, labels: Vec<OutcomeLabel>) -> Vec<OutcomeLabel> {
        match self {
            Step::GradingPoints { section } => grading_points(view, *section, labels),
            Step::PromotionCap { section, into } => promotion_cap(view, *section, *into, labels),
            Step::MergedPromotionPool {
                sections,
                feed,
                places,
            } => merged_pool(view, sections, *feed, *places, labels),
            Step::QualifyingPath {
                section,
                places,
                label,
            } => qualifying_path(view, *section, *places, label, labels),
        }
    }
}

/// Base rule: top `promote` by rank are promoted, bottom `relegate` relegated.
pub(crate) fn base_labels(layout: &SectionLayout, ranking: &SectionRanking, labels: &mut [OutcomeLabel]) {
    let relegation_start = layout.size - layout.relegate;
    for (rank, &band) in ranking.order.iter().enumerate() {
        labels[layout.offset + band] = if rank < layout.promote {
            OutcomeLabel::Promoted
        } else if rank >= relegation_start {
            OutcomeLabel::Relegated
        } else {
            OutcomeLabel::Stayed
        };
    }
}

/// Cumulative grading points: prior results plus this year's placing.
///
/// With totals sorted ascending, a band is promoted only when strictly below
/// the first non-promotion total, and relegated when at or above the first
/// relegation total. Ties at a boundary therefore miss promotion and suffer
/// relegation.
fn grading_points(view: &TrialView<'_>, section: usize, mut labels: Vec<OutcomeLabel>) -> Vec<OutcomeLabel> {
    let layout = &view.layouts[section];
    let placings = view.rankings[section].placings(layout.played());
    let totals: Vec<u64> = placings
        .iter()
        .zip(&layout.prior_points)
        .map(|(&place, &prior)| prior + u64::from(place))
        .collect();
    let mut sorted = totals.clone();
    sorted.sort_unstable();

    let n = layout.size;
    for (band, &total) in totals.iter().enumerate() {
        let promoted = layout.promote == n || (layout.promote < n && total < sorted[layout.promote]);
        let relegated = layout.relegate > 0 && total >= sorted[n - layout.relegate];
        labels[layout.offset + band] = if promoted {
            OutcomeLabel::Promoted
        } else if relegated {
            OutcomeLabel::Relegated
        } else {
            OutcomeLabel::Stayed
        };
    }
    labels
}

/// Promotions beyond the vacancies left by relegations out of `into` revert
/// to Stayed, lowest-ranked first.
fn promotion_cap(
    view: &TrialView<'_>,
    section: usize,
    into: usize,
    mut labels: Vec<OutcomeLabel>,
) -> Vec<OutcomeLabel> {
    let vacancies = view.layouts[into]
        .range()
        .filter(|&g| labels[g] == OutcomeLabel::Relegated)
        .count();

    let layout = &view.layouts[section];
    let mut kept = 0;
    for &band in &view.rankings[section].order {
        let g = layout.offset + band;
        if labels[g] == OutcomeLabel::Promoted {
            if kept < vacancies {
                kept += 1;
            } else {
                labels[g] = OutcomeLabel::Stayed;
            }
        }
    }
    labels
}

/// Replace per-section promotion in the pooled sections with one shared pool.
///
/// Pool order is rank position first, then section table order.
fn merged_pool(
    view: &TrialView<'_>,
    sections: &[usize],
    feed: usize,
    places: usize,
    mut labels: Vec<OutcomeLabel>,
) -> Vec<OutcomeLabel> {
    let mut pool: Vec<(usize, usize, usize)> = Vec::new();
    for &s in sections {
        let layout = &view.layouts[s];
        for g in layout.range() {
            if labels[g] == OutcomeLabel::Promoted {
                labels[g] = OutcomeLabel::Stayed;
            }
        }
        let take = feed.min(layout.played());
        for (rank, &band) in view.rankings[s].order.iter().take(take).enumerate() {
            pool.push((rank, s, layout.offset + band));
        }
    }
    pool.sort_unstable();
    for &(_, _, g) in pool.iter().take(places) {
        labels[g] = OutcomeLabel::Promoted;
    }
    labels
}

/// Top finishers still labelled Stayed take the qualifying label.
fn qualifying_path(
    view: &TrialView<'_>,
    section: usize,
    places: usize,
    label: &OutcomeLabel,
    mut labels: Vec<OutcomeLabel>,
) -> Vec<OutcomeLabel> {
    let layout = &view.layouts[section];
    let take = places.min(layout.played());
    for &band in view.rankings[section].order.iter().take(take) {
        let g = layout.offset + band;
        if labels[g] == OutcomeLabel::Stayed {
            labels[g] = label.clone();
        }
    }
    labels
}
