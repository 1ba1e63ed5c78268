use crate::domain::Section;

/// Compiled, index-based view of one section.
///
/// Built once per run by the rule engine and shared read-only by every
/// worker. Local band indices follow the section's table order.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionLayout {
    pub name: String,
    /// Global index of the section's first band.
    pub offset: usize,
    pub size: usize,
    pub promote: usize,
    pub relegate: usize,
    /// Local indices of bands that play, in table order.
    pub present: Vec<usize>,
    /// Local indices of absent bands, in table order.
    pub absent: Vec<usize>,
    /// Strengths of the bands in `present`, parallel to it.
    pub strengths: Vec<f64>,
    /// Name per local band.
    pub band_names: Vec<String>,
    /// Strength per local band, absent bands included.
    pub band_strengths: Vec<f64>,
    /// Sum of prior results per local band.
    pub prior_points: Vec<u64>,
}

impl SectionLayout {
    pub fn from_section(section: &Section, offset: usize) -> Self {
        let mut present = Vec::new();
        let mut absent = Vec::new();
        let mut strengths = Vec::new();
        for (i, band) in section.bands.iter().enumerate() {
            if band.absent {
                absent.push(i);
            } else {
                present.push(i);
                strengths.push(band.strength);
            }
        }
        Self {
            name: section.name.clone(),
            offset,
            size: section.len(),
            promote: section.promote,
            relegate: section.relegate,
            present,
            absent,
            strengths,
            band_names: section.bands.iter().map(|b| b.name.clone()).collect(),
            band_strengths: section.bands.iter().map(|b| b.strength).collect(),
            prior_points: section.bands.iter().map(|b| b.prior_points()).collect(),
        }
    }

    pub fn played(&self) -> usize {
        self.present.len()
    }

    /// Global band indices covered by this section.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}
