//! Domain types for contest grading tables.

pub mod band;
pub mod outcome;
pub mod section;
pub mod table;

pub use band::Band;
pub use outcome::{LabelSet, OutcomeLabel};
pub use section::Section;
pub use table::GradingTable;
