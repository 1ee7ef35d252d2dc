//! The three rate axes bundled for one rating query

use chrono::{DateTime, Utc};
use meterbill_common::{
    CurrencyRate, MeterbillError, PricingPlan, RateError, RateSnapshot, Result, VatRate,
};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::timeline::RateTimeline;

/// Immutable plan, VAT and currency timelines
///
/// Built once from a full [`RateSnapshot`] and shared read-only between
/// rating tasks.
#[derive(Debug, Clone)]
pub struct RateTables {
    pub plans: RateTimeline<PricingPlan>,
    pub vat_rates: RateTimeline<VatRate>,
    pub currency_rates: RateTimeline<CurrencyRate>,
}

impl RateTables {
    /// Validate a snapshot and index it by key and `valid_from`
    pub fn new(snapshot: RateSnapshot) -> Result<Self> {
        if let Some(vat) = snapshot.vat_rates.iter().find(|v| v.rate < Decimal::ZERO) {
            return Err(MeterbillError::Validation(format!(
                "VAT rate '{}' valid from {} is negative: {}",
                vat.code, vat.valid_from, vat.rate
            )));
        }
        if let Some(currency) = snapshot
            .currency_rates
            .iter()
            .find(|c| c.rate <= Decimal::ZERO)
        {
            return Err(MeterbillError::Validation(format!(
                "currency rate '{}' valid from {} must be positive: {}",
                currency.code, currency.valid_from, currency.rate
            )));
        }

        let tables = Self {
            plans: RateTimeline::from_records(snapshot.pricing_plans)?,
            vat_rates: RateTimeline::from_records(snapshot.vat_rates)?,
            currency_rates: RateTimeline::from_records(snapshot.currency_rates)?,
        };

        debug!(
            plans = tables.plans.len(),
            vat_codes = tables.vat_rates.len(),
            currency_codes = tables.currency_rates.len(),
            "Rate tables loaded"
        );

        Ok(tables)
    }

    pub fn resolve_plan(
        &self,
        plan_guid: &Uuid,
        at: DateTime<Utc>,
    ) -> std::result::Result<&PricingPlan, RateError> {
        self.plans.resolve(plan_guid, at)
    }

    pub fn resolve_vat(&self, code: &str, at: DateTime<Utc>) -> std::result::Result<&VatRate, RateError> {
        self.vat_rates.resolve(code, at)
    }

    pub fn resolve_currency(
        &self,
        code: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<&CurrencyRate, RateError> {
        self.currency_rates.resolve(code, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use meterbill_common::PricingPlanComponent;
    use rust_decimal_macros::dec;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
    }

    fn plan(plan_guid: Uuid) -> PricingPlan {
        PricingPlan {
            plan_guid,
            valid_from: Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap(),
            name: "PLAN1".to_string(),
            components: vec![PricingPlanComponent {
                name: "compute".to_string(),
                formula: "1".to_string(),
                currency_code: "GBP".to_string(),
                vat_code: "Standard".to_string(),
            }],
        }
    }

    #[test]
    fn test_resolve_each_axis() {
        let plan_guid = Uuid::new_v4();
        let tables = RateTables::new(
            RateSnapshot::new()
                .with_plan(plan(plan_guid))
                .with_vat_rate("Standard", epoch(), dec!(0.2))
                .with_currency_rate("GBP", epoch(), dec!(1)),
        )
        .unwrap();

        let at = Utc.with_ymd_and_hms(2017, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(tables.resolve_plan(&plan_guid, at).unwrap().name, "PLAN1");
        assert_eq!(tables.resolve_vat("Standard", at).unwrap().rate, dec!(0.2));
        assert_eq!(tables.resolve_currency("GBP", at).unwrap().rate, dec!(1));

        let before_plan = Utc.with_ymd_and_hms(2016, 6, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            tables.resolve_plan(&plan_guid, before_plan),
            Err(RateError::PlanNotFound { .. })
        ));
        assert!(matches!(
            tables.resolve_currency("USD", at),
            Err(RateError::CurrencyRateNotFound { .. })
        ));
    }

    #[test]
    fn test_negative_vat_rejected() {
        let result = RateTables::new(RateSnapshot::new().with_vat_rate("Standard", epoch(), dec!(-0.1)));
        assert!(matches!(result, Err(MeterbillError::Validation(_))));
    }

    #[test]
    fn test_zero_currency_rate_rejected() {
        let result = RateTables::new(RateSnapshot::new().with_currency_rate("USD", epoch(), dec!(0)));
        assert!(matches!(result, Err(MeterbillError::Validation(_))));
    }
}
