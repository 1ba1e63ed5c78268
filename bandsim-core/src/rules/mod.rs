//! Contest rule engine.
//!
//! Converts one trial's section rankings into one outcome label per band:
//!
//! 1. **Base rule**: per section, top `promote` by rank are Promoted,
//!    bottom `relegate` are Relegated, the rest Stayed.
//! 2. **Linkage pipeline**: named rule steps applied in order (sections in
//!    table order, each section's `linkage` in order). Each step takes the
//!    current labels and returns revised labels.
//!
//! Rankings are strict total orders, so quota boundaries never need
//! tie-breaking here. The only tie policy is the grading-points boundary
//! rule inside its own step.

pub mod layout;
pub mod linkage;
pub mod pipeline;

pub use layout::SectionLayout;
pub use linkage::LinkageRule;
pub use pipeline::PipelineStep;

use crate::domain::{GradingTable, LabelSet, OutcomeLabel};
use crate::error::{ConfigError, RuleError};
use crate::sampler::SectionRanking;
use pipeline::{base_labels, Step, TrialView};

/// Compiled, deterministic contest rule for one grading table.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    sections: Vec<SectionLayout>,
    pipeline: Vec<PipelineStep>,
    labels: LabelSet,
    band_count: usize,
}

impl RuleEngine {
    /// Validate `table` and compile its layout and rule pipeline.
    pub fn new(table: &GradingTable) -> Result<Self, ConfigError> {
        table.validate()?;

        let mut sections = Vec::with_capacity(table.sections.len());
        let mut offset = 0;
        for section in &table.sections {
            sections.push(SectionLayout::from_section(section, offset));
            offset += section.len();
        }

        let mut pipeline = Vec::new();
        let mut labels = LabelSet::base();
        for (index, section) in table.sections.iter().enumerate() {
            for rule_name in &section.linkage {
                let rule = table
                    .rules
                    .get(rule_name)
                    .ok_or_else(|| ConfigError::UnknownRule {
                        section: section.name.clone(),
                        rule: rule_name.clone(),
                    })?;
                if let Some(label) = rule.emitted_label() {
                    labels.insert(label);
                }
                pipeline.push(PipelineStep {
                    rule: rule_name.clone(),
                    section: section.name.clone(),
                    step: Step::compile(rule_name, rule, index, table)?,
                });
            }
        }

        Ok(Self {
            sections,
            pipeline,
            labels,
            band_count: offset,
        })
    }

    pub fn sections(&self) -> &[SectionLayout] {
        &self.sections
    }

    pub fn pipeline(&self) -> &[PipelineStep] {
        &self.pipeline
    }

    /// Every label `evaluate` can emit.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Apply the base rule and the pipeline to one trial's rankings.
    ///
    /// Returns labels in global band order (table order).
    pub fn evaluate(&self, rankings: &[SectionRanking]) -> Result<Vec<OutcomeLabel>, RuleError> {
        self.check_rankings(rankings)?;

        let mut labels = vec![OutcomeLabel::Stayed; self.band_count];
        for (layout, ranking) in self.sections.iter().zip(rankings) {
            base_labels(layout, ranking, &mut labels);
        }

        let view = TrialView {
            layouts: &self.sections,
            rankings,
        };
        Ok(self
            .pipeline
            .iter()
            .fold(labels, |labels, step| step.step.apply(&view, labels)))
    }

    fn check_rankings(&self, rankings: &[SectionRanking]) -> Result<(), RuleError> {
        if rankings.len() != self.sections.len() {
            return Err(RuleError::RankingCount {
                expected: self.sections.len(),
                got: rankings.len(),
            });
        }
        for (index, (layout, ranking)) in self.sections.iter().zip(rankings).enumerate() {
            let invalid = || RuleError::InvalidRanking {
                section: layout.name.clone(),
                size: layout.size,
            };
            if ranking.section != index || ranking.order.len() != layout.size {
                return Err(invalid());
            }
            let mut seen = vec![false; layout.size];
            for &band in &ranking.order {
                if band >= layout.size || seen[band] {
                    return Err(invalid());
                }
                seen[band] = true;
            }
        }
        Ok(())
    }
}
