//! Usage event sources
//!
//! The rating engine pulls events through [`UsageEventSource`]. Durable
//! storage lives outside this crate; [`InMemoryEventStore`] backs tests,
//! benches and the command-line tool.

use meterbill_common::{EventFilter, Result, UsageEvent};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Read access to decoded usage events
pub trait UsageEventSource: Send + Sync {
    /// Resources with usage relevant to `filter`, in a stable order
    fn resources(&self, filter: &EventFilter) -> Result<Vec<Uuid>>;

    /// Events of one resource, ordered by timestamp (ties in ingestion order)
    fn events(&self, resource_guid: &Uuid, filter: &EventFilter) -> Result<Vec<UsageEvent>>;
}

/// In-memory event storage keyed by resource
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    by_resource: RwLock<BTreeMap<Uuid, Vec<UsageEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event after any already stored with the same or earlier timestamp
    pub fn insert(&self, event: UsageEvent) {
        let mut by_resource = self.by_resource.write();
        let events = by_resource.entry(event.resource_guid()).or_default();
        let idx = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(idx, event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = UsageEvent>) {
        for event in events {
            self.insert(event);
        }
    }

    /// Total number of stored events
    pub fn len(&self) -> usize {
        self.by_resource.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.read().is_empty()
    }
}

impl FromIterator<UsageEvent> for InMemoryEventStore {
    fn from_iter<I: IntoIterator<Item = UsageEvent>>(iter: I) -> Self {
        let store = Self::new();
        store.extend(iter);
        store
    }
}

impl UsageEventSource for InMemoryEventStore {
    fn resources(&self, filter: &EventFilter) -> Result<Vec<Uuid>> {
        let by_resource = self.by_resource.read();
        Ok(by_resource
            .iter()
            .filter(|(_, events)| {
                events
                    .first()
                    .map_or(false, |e| e.timestamp < filter.range_stop && filter.matches(&e.resource))
            })
            .map(|(guid, _)| *guid)
            .collect())
    }

    fn events(&self, resource_guid: &Uuid, filter: &EventFilter) -> Result<Vec<UsageEvent>> {
        let by_resource = self.by_resource.read();
        Ok(by_resource
            .get(resource_guid)
            .map(|events| {
                events
                    .iter()
                    .take_while(|e| e.timestamp < filter.range_stop)
                    .filter(|e| filter.matches(&e.resource))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
