//! Usage interval builder
//!
//! Walks one resource's events in order and emits maximal half-open
//! `[start, stop)` spans over which the billable configuration is constant.
//!
//! ```text
//! Closed --STARTED--> Open
//! Open   --STARTED (new config)--> Open   (previous interval closed)
//! Open   --STOPPED--> Closed              (interval closed)
//! ```

use chrono::{DateTime, Duration, Utc};
use meterbill_common::{
    EventFilter, LifecycleState, ResourceIdentity, ResourceSnapshot, SequenceError, UsageEvent,
};
use uuid::Uuid;

/// A span of constant billable configuration for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct UsageInterval {
    /// Id of the event that opened the interval
    pub event_guid: Uuid,
    pub resource: ResourceIdentity,
    pub snapshot: ResourceSnapshot,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl UsageInterval {
    pub fn resource_guid(&self) -> Uuid {
        self.resource.resource_guid
    }

    pub fn duration(&self) -> Duration {
        self.stop - self.start
    }
}

/// An interval whose stop is not yet known
#[derive(Debug)]
struct OpenInterval {
    event_guid: Uuid,
    resource: ResourceIdentity,
    snapshot: ResourceSnapshot,
    start: DateTime<Utc>,
}

impl OpenInterval {
    fn opened_by(event: &UsageEvent) -> Self {
        Self {
            event_guid: event.event_guid,
            resource: event.resource.clone(),
            snapshot: event.snapshot.clone(),
            start: event.timestamp,
        }
    }

    /// Close at `stop`, clipped to the query range; `None` if nothing is left
    fn close(self, stop: DateTime<Utc>, range: &EventFilter) -> Option<UsageInterval> {
        let start = self.start.max(range.range_start);
        let stop = stop.min(range.range_stop);
        if stop <= start {
            return None;
        }

        Some(UsageInterval {
            event_guid: self.event_guid,
            resource: self.resource,
            snapshot: self.snapshot,
            start,
            stop,
        })
    }
}

#[derive(Debug)]
enum IntervalState {
    Closed,
    Open(OpenInterval),
}

/// Build the usage intervals of one resource within `range`
///
/// `events` must belong to a single resource and be ordered by timestamp.
/// An interval still open after the last event is closed at
/// `min(range_stop, now)`.
pub fn build_usage_intervals(
    events: &[UsageEvent],
    range: &EventFilter,
    now: DateTime<Utc>,
) -> Result<Vec<UsageInterval>, SequenceError> {
    let mut intervals = Vec::new();
    let mut state = IntervalState::Closed;
    let mut previous: Option<DateTime<Utc>> = None;

    for event in events {
        if let Some(previous) = previous.filter(|p| event.timestamp < *p) {
            return Err(SequenceError::OutOfOrder {
                resource_guid: event.resource_guid(),
                event_guid: event.event_guid,
                at: event.timestamp,
                previous,
            });
        }
        previous = Some(event.timestamp);

        // Nothing at or past the range end can change the clipped result
        if event.timestamp >= range.range_stop {
            break;
        }

        state = match (state, event.state) {
            (IntervalState::Closed, LifecycleState::Started) => {
                IntervalState::Open(OpenInterval::opened_by(event))
            }
            (IntervalState::Closed, LifecycleState::Stopped) => {
                return Err(SequenceError::StopWithoutStart {
                    resource_guid: event.resource_guid(),
                    event_guid: event.event_guid,
                    at: event.timestamp,
                });
            }
            (IntervalState::Open(open), LifecycleState::Started) => {
                if open.snapshot == event.snapshot {
                    return Err(SequenceError::DuplicateStart {
                        resource_guid: event.resource_guid(),
                        event_guid: event.event_guid,
                        at: event.timestamp,
                    });
                }
                intervals.extend(open.close(event.timestamp, range));
                IntervalState::Open(OpenInterval::opened_by(event))
            }
            (IntervalState::Open(open), LifecycleState::Stopped) => {
                intervals.extend(open.close(event.timestamp, range));
                IntervalState::Closed
            }
        };
    }

    if let IntervalState::Open(open) = state {
        intervals.extend(open.close(range.range_stop.min(now), range));
    }

    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2001, month, day, 0, 0, 0).unwrap()
    }

    fn resource() -> ResourceIdentity {
        ResourceIdentity {
            resource_guid: Uuid::new_v4(),
            resource_name: "APP1".to_string(),
            resource_type: "app".to_string(),
            org_guid: Uuid::new_v4(),
            space_guid: Uuid::new_v4(),
        }
    }

    fn snapshot(number_of_nodes: u32) -> ResourceSnapshot {
        ResourceSnapshot {
            plan_guid: Uuid::nil(),
            number_of_nodes,
            memory_in_mb: 1024,
            storage_in_mb: 0,
        }
    }

    fn started(resource: &ResourceIdentity, when: DateTime<Utc>, nodes: u32) -> UsageEvent {
        UsageEvent::started(Uuid::new_v4(), when, resource.clone(), snapshot(nodes))
    }

    fn stopped(resource: &ResourceIdentity, when: DateTime<Utc>) -> UsageEvent {
        UsageEvent::stopped(Uuid::new_v4(), when, resource.clone(), snapshot(1))
    }

    fn january() -> EventFilter {
        EventFilter::new(at(1, 1), at(2, 1))
    }

    #[test]
    fn test_start_stop_single_interval() {
        let app = resource();
        let events = vec![started(&app, at(1, 5), 1), stopped(&app, at(1, 10))];

        let intervals = build_usage_intervals(&events, &january(), at(3, 1)).unwrap();

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].event_guid, events[0].event_guid);
        assert_eq!(intervals[0].start, at(1, 5));
        assert_eq!(intervals[0].stop, at(1, 10));
        assert_eq!(intervals[0].duration(), Duration::days(5));
    }

    #[test]
    fn test_scale_splits_contiguously() {
        let app = resource();
        let events = vec![
            started(&app, at(1, 5), 1),
            started(&app, at(1, 7), 2),
            stopped(&app, at(1, 10)),
        ];

        let intervals = build_usage_intervals(&events, &january(), at(3, 1)).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].stop, intervals[1].start);
        assert_eq!(intervals[1].event_guid, events[1].event_guid);
        assert_eq!(intervals[1].snapshot.number_of_nodes, 2);
    }

    #[test]
    fn test_unterminated_closes_at_now() {
        let app = resource();
        let events = vec![started(&app, at(1, 5), 1)];

        let intervals = build_usage_intervals(&events, &january(), at(1, 20)).unwrap();
        assert_eq!(intervals[0].stop, at(1, 20));

        let intervals = build_usage_intervals(&events, &january(), at(6, 1)).unwrap();
        assert_eq!(intervals[0].stop, at(2, 1));
    }

    #[test]
    fn test_clipped_to_range() {
        let app = resource();
        let events = vec![
            started(&app, Utc.with_ymd_and_hms(2000, 12, 1, 0, 0, 0).unwrap(), 1),
            stopped(&app, at(3, 1)),
        ];

        let intervals = build_usage_intervals(&events, &january(), at(6, 1)).unwrap();

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, at(1, 1));
        assert_eq!(intervals[0].stop, at(2, 1));
        assert_eq!(intervals[0].event_guid, events[0].event_guid);
    }

    #[test]
    fn test_intervals_outside_range_dropped() {
        let app = resource();
        let events = vec![
            started(&app, Utc.with_ymd_and_hms(2000, 11, 1, 0, 0, 0).unwrap(), 1),
            stopped(&app, Utc.with_ymd_and_hms(2000, 12, 1, 0, 0, 0).unwrap()),
            started(&app, at(2, 5), 1),
        ];

        let intervals = build_usage_intervals(&events, &january(), at(6, 1)).unwrap();
        assert!(intervals.is_empty());
    }

    #[test]
    fn test_zero_length_interval_dropped() {
        let app = resource();
        let events = vec![started(&app, at(1, 5), 1), stopped(&app, at(1, 5))];

        let intervals = build_usage_intervals(&events, &january(), at(6, 1)).unwrap();
        assert!(intervals.is_empty());
    }

    #[test]
    fn test_stop_without_start() {
        let app = resource();
        let events = vec![stopped(&app, at(1, 5))];

        let err = build_usage_intervals(&events, &january(), at(6, 1)).unwrap_err();
        assert!(matches!(err, SequenceError::StopWithoutStart { .. }));
    }

    #[test]
    fn test_duplicate_start() {
        let app = resource();
        let events = vec![started(&app, at(1, 5), 1), started(&app, at(1, 6), 1)];

        let err = build_usage_intervals(&events, &january(), at(6, 1)).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::DuplicateStart { event_guid, .. } if event_guid == events[1].event_guid
        ));
    }

    #[test]
    fn test_out_of_order() {
        let app = resource();
        let events = vec![started(&app, at(1, 5), 1), stopped(&app, at(1, 3))];

        let err = build_usage_intervals(&events, &january(), at(6, 1)).unwrap_err();
        assert!(matches!(err, SequenceError::OutOfOrder { previous, .. } if previous == at(1, 5)));
    }
}
