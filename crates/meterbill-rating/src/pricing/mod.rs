//! Pricing module
//!
//! Splits usage intervals at rate changes, evaluates component formulas and
//! aggregates the results into billable events.

pub mod aggregator;
pub mod formula;
pub mod splitter;

pub use aggregator::{apply_minimum_charge, price_interval};
pub use formula::{Formula, FormulaVariables};
pub use splitter::{split_usage_interval, RatingSubInterval, ResolvedComponent};
