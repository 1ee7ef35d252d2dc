//! Core data types for MeterBill

pub mod billable_event;
pub mod filter;
pub mod rates;
pub mod timestamp;
pub mod usage_event;
