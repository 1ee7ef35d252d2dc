//! Rate table records
//!
//! Pricing plans, VAT rates and currency rates all change over time. Each
//! record is valid from its `valid_from` instant until the next record with
//! the same key takes over.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One named, formula-driven charge within a pricing plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPlanComponent {
    pub name: String,
    /// Arithmetic over `$time_in_seconds`, e.g. `ceil($time_in_seconds/3600) * 0.01`
    pub formula: String,
    pub currency_code: String,
    pub vat_code: String,
}

/// A version of a pricing plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPlan {
    pub plan_guid: Uuid,
    #[serde(with = "crate::types::timestamp")]
    pub valid_from: DateTime<Utc>,
    pub name: String,
    pub components: Vec<PricingPlanComponent>,
}

/// A VAT rate version, e.g. `Standard` = 0.2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatRate {
    pub code: String,
    #[serde(with = "crate::types::timestamp")]
    pub valid_from: DateTime<Utc>,
    pub rate: Decimal,
}

/// A currency conversion multiplier version, e.g. `USD` = 0.8
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub code: String,
    #[serde(with = "crate::types::timestamp")]
    pub valid_from: DateTime<Utc>,
    pub rate: Decimal,
}

/// Full snapshot of all three rate tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    #[serde(default)]
    pub pricing_plans: Vec<PricingPlan>,
    #[serde(default)]
    pub vat_rates: Vec<VatRate>,
    #[serde(default)]
    pub currency_rates: Vec<CurrencyRate>,
}

impl RateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pricing plan version
    pub fn with_plan(mut self, plan: PricingPlan) -> Self {
        self.pricing_plans.push(plan);
        self
    }

    /// Add a VAT rate version
    pub fn with_vat_rate(mut self, code: impl Into<String>, valid_from: DateTime<Utc>, rate: Decimal) -> Self {
        self.vat_rates.push(VatRate {
            code: code.into(),
            valid_from,
            rate,
        });
        self
    }

    /// Add a currency rate version
    pub fn with_currency_rate(
        mut self,
        code: impl Into<String>,
        valid_from: DateTime<Utc>,
        rate: Decimal,
    ) -> Self {
        self.currency_rates.push(CurrencyRate {
            code: code.into(),
            valid_from,
            rate,
        });
        self
    }
}
