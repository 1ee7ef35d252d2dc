//! Time-versioned rate lookup
//!
//! Every axis (plans, VAT rates, currency rates) is a map from key to a
//! `Vec` of versions sorted by `valid_from`. The version effective at an
//! instant T is the last one with `valid_from <= T`, found by bisection.

use chrono::{DateTime, Utc};
use meterbill_common::{CurrencyRate, MeterbillError, PricingPlan, RateError, Result, VatRate};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// A record that belongs on a rate timeline
pub trait TimelineRecord {
    type Key: Eq + Hash + Clone + fmt::Display;

    /// Axis name used in diagnostics
    const AXIS: &'static str;

    fn key(&self) -> &Self::Key;

    fn valid_from(&self) -> DateTime<Utc>;

    /// Error reported when no version of `key` is effective at `at`
    fn not_found(key: String, at: DateTime<Utc>) -> RateError;
}

impl TimelineRecord for PricingPlan {
    type Key = Uuid;
    const AXIS: &'static str = "pricing plan";

    fn key(&self) -> &Uuid {
        &self.plan_guid
    }

    fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    fn not_found(plan_guid: String, at: DateTime<Utc>) -> RateError {
        RateError::PlanNotFound { plan_guid, at }
    }
}

impl TimelineRecord for VatRate {
    type Key = String;
    const AXIS: &'static str = "VAT rate";

    fn key(&self) -> &String {
        &self.code
    }

    fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    fn not_found(code: String, at: DateTime<Utc>) -> RateError {
        RateError::VatRateNotFound { code, at }
    }
}

impl TimelineRecord for CurrencyRate {
    type Key = String;
    const AXIS: &'static str = "currency rate";

    fn key(&self) -> &String {
        &self.code
    }

    fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    fn not_found(code: String, at: DateTime<Utc>) -> RateError {
        RateError::CurrencyRateNotFound { code, at }
    }
}

/// Sorted versions of every key on one rate axis
#[derive(Debug, Clone)]
pub struct RateTimeline<R: TimelineRecord> {
    versions: HashMap<R::Key, Vec<R>>,
}

impl<R: TimelineRecord> RateTimeline<R> {
    /// Build a timeline; two versions of one key may not share a `valid_from`
    pub fn from_records(records: impl IntoIterator<Item = R>) -> Result<Self> {
        let mut versions: HashMap<R::Key, Vec<R>> = HashMap::new();
        for record in records {
            versions.entry(record.key().clone()).or_default().push(record);
        }

        for (key, records) in versions.iter_mut() {
            records.sort_by_key(|r| r.valid_from());

            if let Some(pair) = records
                .windows(2)
                .find(|pair| pair[0].valid_from() == pair[1].valid_from())
            {
                return Err(MeterbillError::Validation(format!(
                    "{} '{}' has two versions valid from {}",
                    R::AXIS,
                    key,
                    pair[0].valid_from()
                )));
            }
        }

        Ok(Self { versions })
    }

    /// Version of `key` effective at `at`
    pub fn resolve<Q>(&self, key: &Q, at: DateTime<Utc>) -> std::result::Result<&R, RateError>
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        let versions = self.versions(key);
        let idx = versions.partition_point(|r| r.valid_from() <= at);
        if idx == 0 {
            return Err(R::not_found(key.to_string(), at));
        }
        Ok(&versions[idx - 1])
    }

    /// `valid_from` instants of `key` strictly inside `(start, stop)`, ascending
    pub fn changes_within<'a, Q>(
        &'a self,
        key: &Q,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> impl Iterator<Item = DateTime<Utc>> + 'a
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let versions = self.versions(key);
        let first = versions.partition_point(|r| r.valid_from() <= start);
        let last = versions.partition_point(|r| r.valid_from() < stop).max(first);
        versions[first..last].iter().map(|r| r.valid_from())
    }

    /// All versions of `key`, oldest first
    pub fn versions<Q>(&self, key: &Q) -> &[R]
    where
        R::Key: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.versions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
