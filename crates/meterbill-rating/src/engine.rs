//! Rating orchestrator
//!
//! Drives interval construction and pricing for every resource matched by
//! a query. Output is produced lazily through [`BillableEventCursor`],
//! materialized with [`RatingEngine::rate_all`], or computed across
//! resources in parallel with [`RatingEngine::rate_concurrently`].

use chrono::{DateTime, SubsecRound, Utc};
use meterbill_common::{BillableEvent, EventFilter, MeterbillError, RateSnapshot, Result};
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::RatingConfig;
use crate::metering::{build_usage_intervals, UsageEventSource, UsageInterval};
use crate::pricing::price_interval;
use crate::rates::RateTables;

/// Rating metrics
#[derive(Debug, Default)]
pub struct RatingMetrics {
    pub resources_rated: AtomicU64,
    pub intervals_built: AtomicU64,
    pub events_emitted: AtomicU64,
    pub failures: AtomicU64,
}

/// Rates usage from an event source against one set of rate tables
#[derive(Clone)]
pub struct RatingEngine {
    source: Arc<dyn UsageEventSource>,
    tables: Arc<RateTables>,
    config: RatingConfig,
    metrics: Arc<RatingMetrics>,
}

impl RatingEngine {
    pub fn new(source: Arc<dyn UsageEventSource>, tables: Arc<RateTables>, config: RatingConfig) -> Self {
        Self {
            source,
            tables,
            config,
            metrics: Arc::new(RatingMetrics::default()),
        }
    }

    /// Build the rate tables from a snapshot and create an engine over them
    pub fn from_snapshot(
        source: Arc<dyn UsageEventSource>,
        snapshot: RateSnapshot,
        config: RatingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let tables = RateTables::new(snapshot)?;
        Ok(Self::new(source, Arc::new(tables), config))
    }

    pub fn tables(&self) -> &Arc<RateTables> {
        &self.tables
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RatingMetrics {
        &self.metrics
    }

    /// Stream the billable events matched by `filter`, closing open usage at the current time
    pub fn rate(&self, filter: &EventFilter) -> Result<BillableEventCursor<'_>> {
        self.rate_at(filter, current_time())
    }

    /// Stream the billable events matched by `filter` as seen at `now`
    #[instrument(skip(self, filter), fields(range_start = %filter.range_start, range_stop = %filter.range_stop))]
    pub fn rate_at(&self, filter: &EventFilter, now: DateTime<Utc>) -> Result<BillableEventCursor<'_>> {
        filter.validate()?;
        let resources = self.source.resources(filter)?;

        debug!(resources = resources.len(), "Rating started");

        Ok(BillableEventCursor {
            engine: self,
            filter: filter.clone(),
            now,
            resources: resources.into_iter(),
            intervals: Vec::new().into_iter(),
            finished: false,
            emitted: 0,
        })
    }

    /// Rate everything matched by `filter` into a list
    pub fn rate_all(&self, filter: &EventFilter) -> Result<Vec<BillableEvent>> {
        self.rate(filter)?.collect()
    }

    pub fn rate_all_at(&self, filter: &EventFilter, now: DateTime<Utc>) -> Result<Vec<BillableEvent>> {
        self.rate_at(filter, now)?.collect()
    }

    /// Rate resources in parallel on the blocking pool
    ///
    /// Output order and errors match [`RatingEngine::rate_all`].
    pub async fn rate_concurrently(&self, filter: &EventFilter) -> Result<Vec<BillableEvent>> {
        self.rate_concurrently_at(filter, current_time()).await
    }

    #[instrument(skip(self, filter), fields(range_start = %filter.range_start, range_stop = %filter.range_stop))]
    pub async fn rate_concurrently_at(
        &self,
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<BillableEvent>> {
        filter.validate()?;
        let resources = self.source.resources(filter)?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        // Output index of the first resource that failed; later ones are not rated
        let first_failure = Arc::new(AtomicUsize::new(usize::MAX));

        let mut handles = Vec::with_capacity(resources.len());
        for (index, resource_guid) in resources.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MeterbillError::Internal(format!("Rating semaphore closed: {}", e)))?;
            if first_failure.load(Ordering::Acquire) < index {
                break;
            }
            let engine = self.clone();
            let filter = filter.clone();
            let first_failure = first_failure.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if first_failure.load(Ordering::Acquire) < index {
                    return None;
                }
                let rated = engine.rate_resource(resource_guid, &filter, now);
                if rated.is_err() {
                    first_failure.fetch_min(index, Ordering::AcqRel);
                }
                Some(rated)
            }));
        }

        let mut events = Vec::new();
        let mut handles = handles.into_iter();
        while let Some(handle) = handles.next() {
            let rated = handle
                .await
                .map_err(|e| MeterbillError::Internal(format!("Rating task failed: {}", e)))?;
            match rated {
                Some(Ok(rated)) => {
                    self.metrics
                        .events_emitted
                        .fetch_add(rated.len() as u64, Ordering::Relaxed);
                    events.extend(rated);
                }
                Some(Err(e)) => {
                    handles.by_ref().for_each(|handle| handle.abort());
                    self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, emitted = events.len(), "Rating failed");
                    return Err(e);
                }
                // Skipped behind an earlier failure, which is returned first
                None => {}
            }
        }

        info!(events = events.len(), "Rating complete");
        Ok(events)
    }

    fn intervals_for(
        &self,
        resource_guid: Uuid,
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<UsageInterval>> {
        let events = self.source.events(&resource_guid, filter)?;
        let intervals = build_usage_intervals(&events, filter, now)?;

        self.metrics.resources_rated.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .intervals_built
            .fetch_add(intervals.len() as u64, Ordering::Relaxed);
        debug!(
            resource_guid = %resource_guid,
            events = events.len(),
            intervals = intervals.len(),
            "Usage intervals built"
        );

        Ok(intervals)
    }

    fn rate_resource(
        &self,
        resource_guid: Uuid,
        filter: &EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<BillableEvent>> {
        self.intervals_for(resource_guid, filter, now)?
            .iter()
            .map(|interval| price_interval(interval, &self.tables, &self.config))
            .collect()
    }
}

/// Current time at the whole-second precision reports are rendered with
fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Lazy stream of billable events, in resource then chronological order
///
/// A resource's intervals are built when the cursor reaches it and each
/// interval is priced when its event is requested. The first error is
/// yielded once and ends the stream.
pub struct BillableEventCursor<'a> {
    engine: &'a RatingEngine,
    filter: EventFilter,
    now: DateTime<Utc>,
    resources: std::vec::IntoIter<Uuid>,
    intervals: std::vec::IntoIter<UsageInterval>,
    finished: bool,
    emitted: u64,
}

impl BillableEventCursor<'_> {
    fn fail(&mut self, err: MeterbillError) -> MeterbillError {
        self.finished = true;
        self.engine.metrics.failures.fetch_add(1, Ordering::Relaxed);
        error!(error = %err, emitted = self.emitted, "Rating failed");
        err
    }
}

impl Iterator for BillableEventCursor<'_> {
    type Item = Result<BillableEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(interval) = self.intervals.next() {
                let priced = price_interval(&interval, &self.engine.tables, &self.engine.config);
                return Some(match priced {
                    Ok(event) => {
                        self.emitted += 1;
                        self.engine.metrics.events_emitted.fetch_add(1, Ordering::Relaxed);
                        Ok(event)
                    }
                    Err(e) => Err(self.fail(e)),
                });
            }

            let Some(resource_guid) = self.resources.next() else {
                self.finished = true;
                info!(events = self.emitted, "Rating complete");
                return None;
            };

            match self.engine.intervals_for(resource_guid, &self.filter, self.now) {
                Ok(intervals) => self.intervals = intervals.into_iter(),
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
    }
}

impl FusedIterator for BillableEventCursor<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering::InMemoryEventStore;
    use chrono::TimeZone;
    use meterbill_common::{
        PricingPlan, PricingPlanComponent, RateError, ResourceIdentity, ResourceSnapshot,
        UsageEvent,
    };
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2001, 1, day, 0, 0, 0).unwrap()
    }

    fn app(resource_guid: Uuid) -> ResourceIdentity {
        ResourceIdentity {
            resource_guid,
            resource_name: "APP1".to_string(),
            resource_type: "app".to_string(),
            org_guid: Uuid::nil(),
            space_guid: Uuid::nil(),
        }
    }

    fn engine(plan_guid: Uuid, events: Vec<UsageEvent>) -> RatingEngine {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let snapshot = RateSnapshot::new()
            .with_plan(PricingPlan {
                plan_guid,
                valid_from: epoch,
                name: "PLAN1".to_string(),
                components: vec![PricingPlanComponent {
                    name: "compute".to_string(),
                    formula: "1".to_string(),
                    currency_code: "GBP".to_string(),
                    vat_code: "Standard".to_string(),
                }],
            })
            .with_vat_rate("Standard", epoch, dec!(0.2))
            .with_currency_rate("GBP", epoch, dec!(1));

        let store: InMemoryEventStore = events.into_iter().collect();
        RatingEngine::from_snapshot(Arc::new(store), snapshot, RatingConfig::default()).unwrap()
    }

    fn started(resource_guid: Uuid, plan_guid: Uuid, day: u32) -> UsageEvent {
        UsageEvent::started(
            Uuid::new_v4(),
            at(day),
            app(resource_guid),
            ResourceSnapshot {
                plan_guid,
                number_of_nodes: 1,
                memory_in_mb: 64,
                storage_in_mb: 0,
            },
        )
    }

    #[test]
    fn test_invalid_range_rejected() {
        let engine = engine(Uuid::new_v4(), Vec::new());
        let filter = EventFilter::new(at(10), at(1));

        assert!(matches!(engine.rate(&filter), Err(MeterbillError::Validation(_))));
    }

    #[test]
    fn test_cursor_tracks_metrics() {
        let plan_guid = Uuid::new_v4();
        let engine = engine(
            plan_guid,
            vec![started(Uuid::new_v4(), plan_guid, 2), started(Uuid::new_v4(), plan_guid, 3)],
        );

        let events = engine.rate_all_at(&EventFilter::new(at(1), at(10)), at(20)).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(engine.metrics().resources_rated.load(Ordering::Relaxed), 2);
        assert_eq!(engine.metrics().events_emitted.load(Ordering::Relaxed), 2);
        assert_eq!(engine.metrics().failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_cursor_is_fused_after_error() {
        let plan_guid = Uuid::new_v4();
        let engine = engine(plan_guid, vec![started(Uuid::new_v4(), Uuid::new_v4(), 2)]);

        let mut cursor = engine.rate_at(&EventFilter::new(at(1), at(10)), at(20)).unwrap();

        assert!(matches!(cursor.next(), Some(Err(_))));
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
        assert_eq!(engine.metrics().failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_concurrent_single_permit() {
        let plan_guid = Uuid::new_v4();
        let mut engine = engine(
            plan_guid,
            (2..6).map(|day| started(Uuid::new_v4(), plan_guid, day)).collect(),
        );
        engine.config.max_concurrency = 1;

        let filter = EventFilter::new(at(1), at(10));
        let sequential = engine.rate_all_at(&filter, at(20)).unwrap();
        let concurrent = engine.rate_concurrently_at(&filter, at(20)).await.unwrap();

        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn test_concurrent_failure_stops_later_resources() {
        let plan_guid = Uuid::new_v4();
        let mut engine = engine(
            plan_guid,
            vec![
                started(Uuid::from_u128(1), Uuid::new_v4(), 2),
                started(Uuid::from_u128(2), plan_guid, 3),
                started(Uuid::from_u128(3), plan_guid, 4),
            ],
        );
        engine.config.max_concurrency = 1;

        let result = engine
            .rate_concurrently_at(&EventFilter::new(at(1), at(10)), at(20))
            .await;

        assert!(matches!(
            result.unwrap_err().root_cause(),
            MeterbillError::Rate(RateError::PlanNotFound { .. })
        ));
        assert_eq!(engine.metrics().resources_rated.load(Ordering::Relaxed), 1);
        assert_eq!(engine.metrics().events_emitted.load(Ordering::Relaxed), 0);
        assert_eq!(engine.metrics().failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_open_usage_closes_on_a_whole_second() {
        let plan_guid = Uuid::new_v4();
        let engine = engine(plan_guid, vec![started(Uuid::new_v4(), plan_guid, 2)]);
        let far_future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();

        let events = engine
            .rate_all(&EventFilter::new(at(1), far_future))
            .unwrap();
        let json = serde_json::to_value(&events[0]).unwrap();
        let event_stop = json["event_stop"].as_str().unwrap();

        assert!(!event_stop.contains('.'), "fractional seconds in {}", event_stop);
        assert_eq!(events[0].event_stop.timestamp_subsec_nanos(), 0);
    }
}
