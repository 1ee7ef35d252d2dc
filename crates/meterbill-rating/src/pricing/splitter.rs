//! Boundary merger / interval splitter
//!
//! A usage interval is cut wherever its pricing plan, or a VAT or currency
//! rate used by one of the plan's components, changes. Every rate is then
//! resolved at the start of each resulting sub-interval.

use chrono::{DateTime, Duration, Utc};
use meterbill_common::{CurrencyRate, PricingPlan, PricingPlanComponent, RateError, VatRate};
use tracing::{debug, instrument};

use crate::metering::UsageInterval;
use crate::rates::RateTables;

/// A plan component with the rates in effect for one sub-interval
#[derive(Debug, Clone, Copy)]
pub struct ResolvedComponent<'a> {
    pub component: &'a PricingPlanComponent,
    pub vat: &'a VatRate,
    pub currency: &'a CurrencyRate,
}

/// Segment of a usage interval over which plan, VAT and currency are constant
#[derive(Debug, Clone)]
pub struct RatingSubInterval<'a> {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub plan: &'a PricingPlan,
    /// In plan component order
    pub components: Vec<ResolvedComponent<'a>>,
}

impl RatingSubInterval<'_> {
    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }
}

/// Split `interval` at every rate change strictly inside it
#[instrument(skip_all, fields(
    resource_guid = %interval.resource_guid(),
    start = %interval.start,
    stop = %interval.stop
))]
pub fn split_usage_interval<'a>(
    interval: &UsageInterval,
    tables: &'a RateTables,
) -> Result<Vec<RatingSubInterval<'a>>, RateError> {
    let plan_guid = &interval.snapshot.plan_guid;
    let (start, stop) = (interval.start, interval.stop);

    let mut plan_boundaries = vec![start];
    plan_boundaries.extend(tables.plans.changes_within(plan_guid, start, stop));
    plan_boundaries.push(stop);

    let mut boundaries = plan_boundaries.clone();

    // A code only splits the spans where a plan version referencing it is active
    for span in plan_boundaries.windows(2) {
        let (span_start, span_stop) = (span[0], span[1]);
        let plan = tables.resolve_plan(plan_guid, span_start)?;

        for component in &plan.components {
            boundaries.extend(
                tables
                    .vat_rates
                    .changes_within(component.vat_code.as_str(), span_start, span_stop),
            );
            boundaries.extend(
                tables
                    .currency_rates
                    .changes_within(component.currency_code.as_str(), span_start, span_stop),
            );
        }
    }

    boundaries.sort();
    boundaries.dedup();

    let sub_intervals = boundaries
        .windows(2)
        .map(|pair| resolve_sub_interval(tables, plan_guid, pair[0], pair[1]))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(sub_intervals = sub_intervals.len(), "Usage interval split");

    Ok(sub_intervals)
}

fn resolve_sub_interval<'a>(
    tables: &'a RateTables,
    plan_guid: &uuid::Uuid,
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
) -> Result<RatingSubInterval<'a>, RateError> {
    let plan = tables.resolve_plan(plan_guid, start)?;

    let components = plan
        .components
        .iter()
        .map(|component| {
            Ok(ResolvedComponent {
                component,
                vat: tables.resolve_vat(&component.vat_code, start)?,
                currency: tables.resolve_currency(&component.currency_code, start)?,
            })
        })
        .collect::<Result<Vec<_>, RateError>>()?;

    Ok(RatingSubInterval {
        start,
        stop,
        plan,
        components,
    })
}
