//! # MeterBill Common
//!
//! Shared types and errors for the MeterBill rating engine.
//!
//! ## Core Types
//!
//! - [`UsageEvent`]: STARTED/STOPPED fact about a resource with its billable configuration
//! - [`PricingPlan`], [`VatRate`], [`CurrencyRate`]: time-versioned rate records
//! - [`BillableEvent`]: one rated usage interval with an itemized [`Price`]
//! - [`EventFilter`]: query range and resource scoping

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{FormulaError, MeterbillError, RateError, Result, SequenceError};
pub use types::{
    billable_event::{BillableEvent, Price, PriceComponent},
    filter::EventFilter,
    rates::{CurrencyRate, PricingPlan, PricingPlanComponent, RateSnapshot, VatRate},
    timestamp::{format_timestamp, parse_timestamp},
    usage_event::{LifecycleState, ResourceIdentity, ResourceSnapshot, UsageEvent},
};

/// MeterBill version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VAT code applied to most charges
pub const STANDARD_VAT_CODE: &str = "Standard";

/// Formula variable bound to a sub-interval's duration
pub const TIME_IN_SECONDS: &str = "time_in_seconds";
