//! # MeterBill Rating
//!
//! Rates metered resource usage into billable events.
//!
//! ## Pipeline
//!
//! ```text
//! usage events ──► usage intervals ──► rating sub-intervals ──► priced components ──► billable event
//!   (metering)        (metering)          (pricing::splitter)     (pricing::formula)   (pricing::aggregator)
//! ```
//!
//! Where, per component and sub-interval:
//! - ExVAT: formula result × currency rate, raised to the minimum charge when positive and below it
//! - IncVAT: ExVAT × (1 + VAT rate)

pub mod config;
pub mod engine;
pub mod metering;
pub mod pricing;
pub mod rates;

pub use config::RatingConfig;
pub use engine::{BillableEventCursor, RatingEngine, RatingMetrics};
pub use metering::{build_usage_intervals, InMemoryEventStore, UsageEventSource, UsageInterval};
pub use pricing::{price_interval, split_usage_interval, Formula, RatingSubInterval};
pub use rates::{RateTables, RateTimeline};
