//! Metering module
//!
//! Turns raw usage events into constant-configuration usage intervals:
//! - Event sources (the [`UsageEventSource`] seam and an in-memory store)
//! - The STARTED/STOPPED interval state machine

pub mod intervals;
pub mod store;

pub use intervals::{build_usage_intervals, UsageInterval};
pub use store::{InMemoryEventStore, UsageEventSource};
