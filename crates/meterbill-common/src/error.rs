//! Error types for MeterBill
//!
//! Provides a unified error type and domain-specific error variants

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using MeterbillError
pub type Result<T> = std::result::Result<T, MeterbillError>;

/// Unified error type for MeterBill operations
#[derive(Debug, Error)]
pub enum MeterbillError {
    // Usage event state machine violations
    #[error("Malformed event sequence: {0}")]
    Sequence(#[from] SequenceError),

    // No applicable plan/VAT/currency record
    #[error("Rate resolution failed: {0}")]
    Rate(#[from] RateError),

    // Pricing formula errors
    #[error("Formula evaluation failed: {0}")]
    Formula(#[from] FormulaError),

    // Invalid query input or rate table content
    #[error("Invalid input: {0}")]
    Validation(String),

    // Failure while pricing one usage interval
    #[error("Rating failed for resource {resource_guid} in [{start}, {stop}): {source}")]
    Interval {
        resource_guid: Uuid,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        #[source]
        source: Box<MeterbillError>,
    },

    // Event source errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeterbillError {
    /// Attach the resource and interval being priced when this error occurred
    pub fn in_interval(
        self,
        resource_guid: Uuid,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Self {
        MeterbillError::Interval {
            resource_guid,
            start,
            stop,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through interval context
    pub fn root_cause(&self) -> &MeterbillError {
        match self {
            MeterbillError::Interval { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Violations of the STARTED/STOPPED state machine for one resource
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SequenceError {
    #[error("resource {resource_guid} stopped at {at} without being started (event {event_guid})")]
    StopWithoutStart {
        resource_guid: Uuid,
        event_guid: Uuid,
        at: DateTime<Utc>,
    },

    #[error("resource {resource_guid} started again at {at} with an unchanged configuration (event {event_guid})")]
    DuplicateStart {
        resource_guid: Uuid,
        event_guid: Uuid,
        at: DateTime<Utc>,
    },

    #[error("event {event_guid} for resource {resource_guid} at {at} is earlier than the previous event at {previous}")]
    OutOfOrder {
        resource_guid: Uuid,
        event_guid: Uuid,
        at: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// No effective rate record at a required instant
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RateError {
    #[error("no pricing plan {plan_guid} valid at {at}")]
    PlanNotFound { plan_guid: String, at: DateTime<Utc> },

    #[error("no VAT rate '{code}' valid at {at}")]
    VatRateNotFound { code: String, at: DateTime<Utc> },

    #[error("no currency rate '{code}' valid at {at}")]
    CurrencyRateNotFound { code: String, at: DateTime<Utc> },
}

/// Pricing formula parse and evaluation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    #[error("unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("unknown variable: ${0}")]
    UnknownVariable(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("formula produced a negative amount: {0}")]
    NegativeResult(Decimal),
}

impl From<serde_json::Error> for MeterbillError {
    fn from(err: serde_json::Error) -> Self {
        MeterbillError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for MeterbillError {
    fn from(err: std::io::Error) -> Self {
        MeterbillError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for MeterbillError {
    fn from(err: anyhow::Error) -> Self {
        MeterbillError::Internal(err.to_string())
    }
}
