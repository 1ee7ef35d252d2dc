//! Billable events - the rated output of one usage interval
//!
//! ```text
//! ExVAT  = formula($time_in_seconds) × currency_rate   (floored to one minor unit)
//! IncVAT = ExVAT × (1 + vat_rate)
//! Total  = Σ components
//! ```
//!
//! All amounts are exact decimals kept in normalized form, so they render
//! as `"0.012"` or `"34"` rather than `"0.0120"` or `"34.00"`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage_event::ResourceIdentity;
use crate::error::FormulaError;

/// One named charge for one rating sub-interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComponent {
    pub name: String,
    pub plan_name: String,
    #[serde(with = "crate::types::timestamp")]
    pub start: DateTime<Utc>,
    #[serde(with = "crate::types::timestamp")]
    pub stop: DateTime<Utc>,
    pub vat_rate: Decimal,
    pub vat_code: String,
    pub currency_code: String,
    pub currency_rate: Decimal,
    pub inc_vat: Decimal,
    pub ex_vat: Decimal,
}

/// Itemized price of a billable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub inc_vat: Decimal,
    pub ex_vat: Decimal,
    pub details: Vec<PriceComponent>,
}

impl Price {
    /// Sum components into a price; totals are never rounded
    pub fn from_components(details: Vec<PriceComponent>) -> Result<Self, FormulaError> {
        let mut inc_vat = Decimal::ZERO;
        let mut ex_vat = Decimal::ZERO;
        for component in &details {
            inc_vat = inc_vat
                .checked_add(component.inc_vat)
                .ok_or(FormulaError::Overflow)?;
            ex_vat = ex_vat
                .checked_add(component.ex_vat)
                .ok_or(FormulaError::Overflow)?;
        }

        Ok(Self {
            inc_vat: inc_vat.normalize(),
            ex_vat: ex_vat.normalize(),
            details,
        })
    }
}

/// Rated usage interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillableEvent {
    /// Id of the usage event that opened the interval
    pub event_guid: Uuid,
    #[serde(with = "crate::types::timestamp")]
    pub event_start: DateTime<Utc>,
    #[serde(with = "crate::types::timestamp")]
    pub event_stop: DateTime<Utc>,
    #[serde(flatten)]
    pub resource: ResourceIdentity,
    pub plan_guid: Uuid,
    pub number_of_nodes: u32,
    pub memory_in_mb: u64,
    pub storage_in_mb: u64,
    pub price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn component(ex_vat: Decimal, inc_vat: Decimal) -> PriceComponent {
        PriceComponent {
            name: "compute".to_string(),
            plan_name: "PLAN1".to_string(),
            start: Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap(),
            stop: Utc.with_ymd_and_hms(2017, 2, 1, 0, 0, 0).unwrap(),
            vat_rate: dec!(0.2),
            vat_code: "Standard".to_string(),
            currency_code: "GBP".to_string(),
            currency_rate: dec!(1),
            inc_vat,
            ex_vat,
        }
    }

    #[test]
    fn test_price_totals_are_exact_sums() {
        let price = Price::from_components(vec![
            component(dec!(1), dec!(1.2)),
            component(dec!(33), dec!(39.6)),
        ])
        .unwrap();

        assert_eq!(price.ex_vat.to_string(), "34");
        assert_eq!(price.inc_vat.to_string(), "40.8");
        assert_eq!(price.details.len(), 2);
    }

    #[test]
    fn test_price_serializes_minimal_strings() {
        let price = Price::from_components(vec![component(dec!(0.010), dec!(0.0120))]).unwrap();
        let json = serde_json::to_value(&price).unwrap();

        assert_eq!(json["ex_vat"], "0.01");
        assert_eq!(json["inc_vat"], "0.012");
        assert_eq!(json["details"][0]["start"], "2017-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_empty_price_is_zero() {
        let price = Price::from_components(Vec::new()).unwrap();
        assert_eq!(price.ex_vat.to_string(), "0");
    }

    #[test]
    fn test_total_overflow_is_error() {
        let result = Price::from_components(vec![
            component(Decimal::MAX, Decimal::MAX),
            component(Decimal::MAX, Decimal::MAX),
        ]);

        assert_eq!(result, Err(FormulaError::Overflow));
    }
}
