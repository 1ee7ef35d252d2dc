//! Price aggregation
//!
//! Prices every (sub-interval, component) pair of a usage interval and sums
//! them into one billable event:
//!
//! ```text
//! ex_vat  = formula($time_in_seconds) × currency_rate
//! ex_vat  = minimum_charge   if 0 < ex_vat < minimum_charge
//! inc_vat = ex_vat × (1 + vat_rate)
//! ```
//!
//! Nothing is rounded along the way.

use chrono::{DateTime, Utc};
use meterbill_common::{
    BillableEvent, FormulaError, MeterbillError, Price, PriceComponent, Result,
};
use rust_decimal::Decimal;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use super::formula::{Formula, FormulaVariables};
use super::splitter::{split_usage_interval, RatingSubInterval, ResolvedComponent};
use crate::config::RatingConfig;
use crate::metering::UsageInterval;
use crate::rates::RateTables;

/// Raise a positive amount below one minor unit to exactly one minor unit
pub fn apply_minimum_charge(ex_vat: Decimal, minimum_charge: Decimal) -> Decimal {
    if ex_vat > Decimal::ZERO && ex_vat < minimum_charge {
        minimum_charge
    } else {
        ex_vat
    }
}

/// Price one usage interval
///
/// Rate and formula failures are reported with the resource and interval
/// they occurred in.
pub fn price_interval(
    interval: &UsageInterval,
    tables: &RateTables,
    config: &RatingConfig,
) -> Result<BillableEvent> {
    let in_interval =
        |err: MeterbillError| err.in_interval(interval.resource_guid(), interval.start, interval.stop);

    let sub_intervals =
        split_usage_interval(interval, tables).map_err(|e| in_interval(e.into()))?;

    // Parsed once per plan version and component
    let mut formulas: HashMap<(DateTime<Utc>, usize), Formula> = HashMap::new();

    let mut details = Vec::new();
    for sub in &sub_intervals {
        for (idx, resolved) in sub.components.iter().enumerate() {
            let formula = match formulas.entry((sub.plan.valid_from, idx)) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let parsed: Formula = resolved
                        .component
                        .formula
                        .parse()
                        .map_err(|e: FormulaError| in_interval(e.into()))?;
                    entry.insert(parsed)
                }
            };
            let component = price_component(sub, resolved, formula, config)
                .map_err(|e| in_interval(e.into()))?;
            details.push(component);
        }
    }

    let price = Price::from_components(details).map_err(|e| in_interval(e.into()))?;

    debug!(
        resource_guid = %interval.resource_guid(),
        event_guid = %interval.event_guid,
        components = price.details.len(),
        ex_vat = %price.ex_vat,
        "Usage interval priced"
    );

    Ok(BillableEvent {
        event_guid: interval.event_guid,
        event_start: interval.start,
        event_stop: interval.stop,
        resource: interval.resource.clone(),
        plan_guid: interval.snapshot.plan_guid,
        number_of_nodes: interval.snapshot.number_of_nodes,
        memory_in_mb: interval.snapshot.memory_in_mb,
        storage_in_mb: interval.snapshot.storage_in_mb,
        price,
    })
}

fn price_component(
    sub: &RatingSubInterval<'_>,
    resolved: &ResolvedComponent<'_>,
    formula: &Formula,
    config: &RatingConfig,
) -> std::result::Result<PriceComponent, FormulaError> {
    let vars = FormulaVariables::for_duration(sub.duration())?;
    let amount = formula.evaluate(&vars)?;

    let ex_vat = amount
        .checked_mul(resolved.currency.rate)
        .ok_or(FormulaError::Overflow)?;
    let ex_vat = apply_minimum_charge(ex_vat, config.minimum_charge);
    let inc_vat = Decimal::ONE
        .checked_add(resolved.vat.rate)
        .and_then(|multiplier| multiplier.checked_mul(ex_vat))
        .ok_or(FormulaError::Overflow)?;

    Ok(PriceComponent {
        name: resolved.component.name.clone(),
        plan_name: sub.plan.name.clone(),
        start: sub.start,
        stop: sub.stop,
        vat_rate: resolved.vat.rate.normalize(),
        vat_code: resolved.vat.code.clone(),
        currency_code: resolved.currency.code.clone(),
        currency_rate: resolved.currency.rate.normalize(),
        inc_vat: inc_vat.normalize(),
        ex_vat: ex_vat.normalize(),
    })
}
