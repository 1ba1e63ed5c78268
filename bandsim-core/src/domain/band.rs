use serde::{Deserialize, Serialize};

/// A band entered in one section of a contest.
///
/// Immutable for the duration of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    /// Prior skill rating. Higher is stronger; only differences between bands matter.
    #[serde(default)]
    pub strength: f64,
    /// Earlier finishing places feeding the grading-points total.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_results: Vec<u32>,
    /// Entered but not playing: always placed after every band that played.
    #[serde(default, skip_serializing_if = "is_false")]
    pub absent: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Band {
    pub fn new(name: impl Into<String>, strength: f64) -> Self {
        Self {
            name: name.into(),
            strength,
            prior_results: Vec::new(),
            absent: false,
        }
    }

    pub fn with_prior_results(mut self, results: Vec<u32>) -> Self {
        self.prior_results = results;
        self
    }

    pub fn mark_absent(mut self) -> Self {
        self.absent = true;
        self
    }

    /// Sum of earlier finishing places.
    pub fn prior_points(&self) -> u64 {
        self.prior_results.iter().map(|&r| u64::from(r)).sum()
    }
}
