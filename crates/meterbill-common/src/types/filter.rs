//! Query filter for rating

use crate::error::{MeterbillError, Result};
use crate::types::timestamp::parse_timestamp;
use crate::types::usage_event::ResourceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which resources and which half-open time range `[range_start, range_stop)` to rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(with = "crate::types::timestamp")]
    pub range_start: DateTime<Utc>,
    #[serde(with = "crate::types::timestamp")]
    pub range_stop: DateTime<Utc>,
    /// Restrict to these resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_guids: Option<Vec<Uuid>>,
    /// Restrict to resources owned by these orgs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_guids: Option<Vec<Uuid>>,
}

impl EventFilter {
    pub fn new(range_start: DateTime<Utc>, range_stop: DateTime<Utc>) -> Self {
        Self {
            range_start,
            range_stop,
            resource_guids: None,
            org_guids: None,
        }
    }

    /// Build a filter from textual range bounds
    pub fn parse(range_start: &str, range_stop: &str) -> Result<Self> {
        Ok(Self::new(
            parse_timestamp(range_start)?,
            parse_timestamp(range_stop)?,
        ))
    }

    pub fn with_resources(mut self, resource_guids: Vec<Uuid>) -> Self {
        self.resource_guids = Some(resource_guids);
        self
    }

    pub fn with_orgs(mut self, org_guids: Vec<Uuid>) -> Self {
        self.org_guids = Some(org_guids);
        self
    }

    /// Reject empty or inverted ranges
    pub fn validate(&self) -> Result<()> {
        if self.range_stop <= self.range_start {
            return Err(MeterbillError::Validation(format!(
                "range_stop {} must be after range_start {}",
                self.range_stop, self.range_start
            )));
        }
        Ok(())
    }

    /// Whether a resource passes the resource and org restrictions
    pub fn matches(&self, resource: &ResourceIdentity) -> bool {
        let resource_ok = self
            .resource_guids
            .as_ref()
            .map_or(true, |guids| guids.contains(&resource.resource_guid));
        let org_ok = self
            .org_guids
            .as_ref()
            .map_or(true, |guids| guids.contains(&resource.org_guid));

        resource_ok && org_ok
    }
}
