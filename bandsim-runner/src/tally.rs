//! Outcome counters accumulated over trials.
//!
//! A tally counts, per band, how often each label occurred and how often each
//! (finishing position, label) pair occurred. Workers fill private tallies and
//! the runner merges them at batch boundaries; counts only ever grow.

use bandsim_core::RuleEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyTable {
    label_count: usize,
    trials: u64,
    /// Band-major: `outcomes[band * label_count + label]`.
    outcomes: Vec<u64>,
    /// Per band, position-major: `positions[band][position * label_count + label]`.
    positions: Vec<Vec<u64>>,
}

impl TallyTable {
    /// Empty tally for bands with the given number of position slots each.
    pub fn new(position_slots: &[usize], label_count: usize) -> Self {
        Self {
            label_count,
            trials: 0,
            outcomes: vec![0; position_slots.len() * label_count],
            positions: position_slots
                .iter()
                .map(|&slots| vec![0; slots * label_count])
                .collect(),
        }
    }

    /// Empty tally shaped for `engine`: one position slot per band in the
    /// band's section.
    pub fn for_engine(engine: &RuleEngine) -> Self {
        let slots: Vec<usize> = engine
            .sections()
            .iter()
            .flat_map(|layout| std::iter::repeat(layout.size).take(layout.size))
            .collect();
        Self::new(&slots, engine.labels().len())
    }

    /// Record one trial.
    ///
    /// `positions` and `labels` are indexed by global band and hold the
    /// position slot and label index of each band.
    pub fn record_trial(&mut self, positions: &[usize], labels: &[usize]) {
        debug_assert_eq!(positions.len(), self.band_count());
        debug_assert_eq!(labels.len(), self.band_count());
        for (band, (&position, &label)) in positions.iter().zip(labels).enumerate() {
            self.outcomes[band * self.label_count + label] += 1;
            self.positions[band][position * self.label_count + label] += 1;
        }
        self.trials += 1;
    }

    /// Add every count of `other` into `self`.
    pub fn merge(&mut self, other: &TallyTable) {
        debug_assert_eq!(self.label_count, other.label_count);
        debug_assert_eq!(self.outcomes.len(), other.outcomes.len());
        self.trials += other.trials;
        for (a, b) in self.outcomes.iter_mut().zip(&other.outcomes) {
            *a += b;
        }
        for (mine, theirs) in self.positions.iter_mut().zip(&other.positions) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn band_count(&self) -> usize {
        self.positions.len()
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }

    /// Number of position slots tracked for `band`.
    pub fn position_slots(&self, band: usize) -> usize {
        self.positions[band].len() / self.label_count.max(1)
    }

    pub fn count(&self, band: usize, label: usize) -> u64 {
        self.outcomes[band * self.label_count + label]
    }

    pub fn position_count(&self, band: usize, position: usize, label: usize) -> u64 {
        self.positions[band][position * self.label_count + label]
    }

    /// Trials in which `band` finished in `position`, over all labels.
    pub fn position_total(&self, band: usize, position: usize) -> u64 {
        let start = position * self.label_count;
        self.positions[band][start..start + self.label_count].iter().sum()
    }
}
