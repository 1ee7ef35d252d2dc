//! Rating configuration

use meterbill_common::{MeterbillError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable overriding [`RatingConfig::minimum_charge`]
pub const MINIMUM_CHARGE_ENV: &str = "METERBILL_MINIMUM_CHARGE";
/// Environment variable overriding [`RatingConfig::max_concurrency`]
pub const MAX_CONCURRENCY_ENV: &str = "METERBILL_MAX_CONCURRENCY";

/// Rating engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// One minor currency unit; positive component charges below it are raised to it
    pub minimum_charge: Decimal,
    /// Resources rated in parallel by `rate_concurrently`
    pub max_concurrency: usize,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            minimum_charge: dec!(0.01),
            max_concurrency: 4,
        }
    }
}

impl RatingConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load configuration from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MeterbillError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            MeterbillError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(val) = lookup(MINIMUM_CHARGE_ENV) {
            self.minimum_charge = Decimal::from_str(val.trim()).map_err(|e| {
                MeterbillError::Config(format!("{}={:?}: {}", MINIMUM_CHARGE_ENV, val, e))
            })?;
        }
        if let Some(val) = lookup(MAX_CONCURRENCY_ENV) {
            self.max_concurrency = val.trim().parse().map_err(|e| {
                MeterbillError::Config(format!("{}={:?}: {}", MAX_CONCURRENCY_ENV, val, e))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.minimum_charge < Decimal::ZERO {
            return Err(MeterbillError::Config(format!(
                "minimum_charge cannot be negative: {}",
                self.minimum_charge
            )));
        }
        if self.max_concurrency == 0 {
            return Err(MeterbillError::Config(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
