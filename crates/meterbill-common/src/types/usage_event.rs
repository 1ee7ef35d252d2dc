//! Usage events - lifecycle and configuration facts about a resource
//!
//! Each event records that a resource was STARTED (or re-configured while
//! running) or STOPPED, together with the billable configuration in effect
//! from that moment on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state reported by a usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Started => write!(f, "STARTED"),
            LifecycleState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Who and where a resource is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub resource_guid: Uuid,
    pub resource_name: String,
    /// Resource kind, e.g. "app" or "service"
    pub resource_type: String,
    pub org_guid: Uuid,
    pub space_guid: Uuid,
}

/// Billable configuration of a resource
///
/// Any difference between two snapshots is a configuration change and
/// starts a new usage interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Pricing plan the resource is billed against
    pub plan_guid: Uuid,
    /// Instance count
    pub number_of_nodes: u32,
    pub memory_in_mb: u64,
    #[serde(default)]
    pub storage_in_mb: u64,
}

/// One immutable usage fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub event_guid: Uuid,
    #[serde(with = "crate::types::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub resource: ResourceIdentity,
    pub state: LifecycleState,
    #[serde(flatten)]
    pub snapshot: ResourceSnapshot,
}

impl UsageEvent {
    /// Create a STARTED event
    pub fn started(
        event_guid: Uuid,
        timestamp: DateTime<Utc>,
        resource: ResourceIdentity,
        snapshot: ResourceSnapshot,
    ) -> Self {
        Self {
            event_guid,
            timestamp,
            resource,
            state: LifecycleState::Started,
            snapshot,
        }
    }

    /// Create a STOPPED event
    pub fn stopped(
        event_guid: Uuid,
        timestamp: DateTime<Utc>,
        resource: ResourceIdentity,
        snapshot: ResourceSnapshot,
    ) -> Self {
        Self {
            event_guid,
            timestamp,
            resource,
            state: LifecycleState::Stopped,
            snapshot,
        }
    }

    pub fn resource_guid(&self) -> Uuid {
        self.resource.resource_guid
    }
}
