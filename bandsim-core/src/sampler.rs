//! Ranking samplers: draw one plausible finishing order per section.
//!
//! Two models:
//! - `PlackettLuce`: sequential weighted draw without replacement, weight
//!   `exp(strength)`. Stronger bands tend to place higher, but every order
//!   keeps non-zero probability.
//! - `UniformSampler`: every order equally likely, strengths ignored.
//!
//! Both consume randomness only from the generator passed in, so identical
//! generator state and inputs always give the identical ranking.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SamplingError;
use crate::rules::SectionLayout;

/// Draws a strict total order over a section's competing bands.
pub trait RankingSampler: Send + Sync {
    /// Model name (for logging/reporting).
    fn name(&self) -> &str;

    /// Return a permutation of `0..strengths.len()`, winner first.
    fn sample(&self, strengths: &[f64], rng: &mut StdRng) -> Result<Vec<usize>, SamplingError>;
}

/// Serializable choice of ranking model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[default]
    PlackettLuce,
    Uniform,
}

impl SamplerKind {
    pub fn sampler(self) -> &'static dyn RankingSampler {
        match self {
            SamplerKind::PlackettLuce => &PlackettLuce,
            SamplerKind::Uniform => &UniformSampler,
        }
    }
}

fn check_strengths(strengths: &[f64]) -> Result<(), SamplingError> {
    if strengths.is_empty() {
        return Err(SamplingError::EmptySection);
    }
    if let Some((index, &value)) = strengths.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(SamplingError::NonFiniteStrength { index, value });
    }
    Ok(())
}

/// Plackett–Luce finishing order with weight `exp(strength)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlackettLuce;

impl RankingSampler for PlackettLuce {
    fn name(&self) -> &str {
        "plackett_luce"
    }

    fn sample(&self, strengths: &[f64], rng: &mut StdRng) -> Result<Vec<usize>, SamplingError> {
        check_strengths(strengths)?;

        let n = strengths.len();
        if n == 1 {
            return Ok(vec![0]);
        }

        // Relative to the max so the strongest weight is exactly 1.
        let max = strengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut weights: Vec<f64> = strengths.iter().map(|s| (s - max).exp()).collect();
        let mut pool: Vec<usize> = (0..n).collect();
        let mut order = Vec::with_capacity(n);

        while !pool.is_empty() {
            let mut total: f64 = pool.iter().map(|&i| weights[i]).sum();
            if total <= 0.0 {
                // Everything left underflowed against the global max.
                let local_max = pool
                    .iter()
                    .map(|&i| strengths[i])
                    .fold(f64::NEG_INFINITY, f64::max);
                for &i in &pool {
                    weights[i] = (strengths[i] - local_max).exp();
                }
                total = pool.iter().map(|&i| weights[i]).sum();
            }
            let pos = weighted_position(rng, &pool, &weights, total);
            order.push(pool.remove(pos));
        }

        Ok(order)
    }
}

/// Pick a position in `pool` with probability proportional to its weight.
fn weighted_position(rng: &mut StdRng, pool: &[usize], weights: &[f64], total: f64) -> usize {
    let mut pick = rng.gen::<f64>() * total;
    for (pos, &i) in pool.iter().enumerate() {
        let w = weights[i];
        if pick < w {
            return pos;
        }
        pick -= w;
    }
    // Rounding left a sliver past the last weight.
    pool.iter()
        .rposition(|&i| weights[i] > 0.0)
        .unwrap_or(pool.len() - 1)
}

/// Every finishing order equally likely.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSampler;

impl RankingSampler for UniformSampler {
    fn name(&self) -> &str {
        "uniform"
    }

    fn sample(&self, strengths: &[f64], rng: &mut StdRng) -> Result<Vec<usize>, SamplingError> {
        check_strengths(strengths)?;
        let mut order: Vec<usize> = (0..strengths.len()).collect();
        order.shuffle(rng);
        Ok(order)
    }
}

/// One trial's total order of a section, as local band indices, winner first.
///
/// Bands that played come first in sampled order; absent bands follow in
/// table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRanking {
    pub section: usize,
    pub order: Vec<usize>,
}

impl SectionRanking {
    /// Draw a ranking for the section at `section` in the engine layout.
    ///
    /// Every band's strength must be finite, absent bands included. A
    /// `NonFiniteStrength` index is the local band index in table order.
    pub fn draw(
        section: usize,
        layout: &SectionLayout,
        sampler: &dyn RankingSampler,
        rng: &mut StdRng,
    ) -> Result<Self, SamplingError> {
        if let Some((index, &value)) = layout
            .band_strengths
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite())
        {
            return Err(SamplingError::NonFiniteStrength { index, value });
        }
        let drawn = sampler
            .sample(&layout.strengths, rng)
            .map_err(|err| match err {
                SamplingError::NonFiniteStrength { index, value } => {
                    SamplingError::NonFiniteStrength {
                        index: layout.present[index],
                        value,
                    }
                }
                other => other,
            })?;
        let order = drawn
            .into_iter()
            .map(|k| layout.present[k])
            .chain(layout.absent.iter().copied())
            .collect();
        Ok(Self { section, order })
    }

    /// Finishing place (1-based) per local band index.
    ///
    /// Bands past `played` are absent and share place `played + 1`.
    pub fn placings(&self, played: usize) -> Vec<u32> {
        let mut places = vec![0u32; self.order.len()];
        for (rank, &band) in self.order.iter().enumerate() {
            places[band] = (rank.min(played) + 1) as u32;
        }
        places
    }
}
