use serde::{Deserialize, Serialize};
use std::fmt;

/// Labels a qualifying path may not reuse.
pub const RESERVED_LABELS: [&str; 3] = ["promoted", "stayed", "relegated"];

/// The result category assigned to a band in one trial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLabel {
    Promoted,
    Stayed,
    Relegated,
    /// A contest-specific category, e.g. qualification for a national final.
    Qualified(String),
}

impl OutcomeLabel {
    pub fn is_reserved(name: &str) -> bool {
        RESERVED_LABELS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeLabel::Promoted => write!(f, "promoted"),
            OutcomeLabel::Stayed => write!(f, "stayed"),
            OutcomeLabel::Relegated => write!(f, "relegated"),
            OutcomeLabel::Qualified(name) => write!(f, "{name}"),
        }
    }
}

/// Ordered set of every label a compiled rule pipeline can emit.
///
/// The three base labels always come first, in `Promoted, Stayed, Relegated`
/// order, followed by qualifying labels in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<OutcomeLabel>,
}

impl LabelSet {
    pub fn base() -> Self {
        Self {
            labels: vec![
                OutcomeLabel::Promoted,
                OutcomeLabel::Stayed,
                OutcomeLabel::Relegated,
            ],
        }
    }

    /// Append a label unless already present.
    pub fn insert(&mut self, label: OutcomeLabel) {
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
    }

    pub fn index_of(&self, label: &OutcomeLabel) -> Option<usize> {
        match label {
            OutcomeLabel::Promoted => Some(0),
            OutcomeLabel::Stayed => Some(1),
            OutcomeLabel::Relegated => Some(2),
            OutcomeLabel::Qualified(_) => self.labels.iter().position(|l| l == label),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutcomeLabel> {
        self.labels.iter()
    }

    pub fn as_slice(&self) -> &[OutcomeLabel] {
        &self.labels
    }
}
