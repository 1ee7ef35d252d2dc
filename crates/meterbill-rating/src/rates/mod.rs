//! Rate tables
//!
//! Time-versioned pricing plans, VAT rates and currency rates, resolved by
//! effective instant.

pub mod tables;
pub mod timeline;

pub use tables::RateTables;
pub use timeline::{RateTimeline, TimelineRecord};
