//! Journey records and the immutable table they are loaded into.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

/// One scheduled stop event of an intercity train, as read from the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyRecord {
    pub date: NaiveDate,
    pub line: String,
    pub trip_id: String,
    pub stop_name: String,
    pub arrival: NaiveTime,
    pub delay_min: i64,
    pub cancelled: bool,
}

/// A [`JourneyRecord`] with its derived columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Journey {
    #[serde(flatten)]
    pub record: JourneyRecord,
    pub is_failure: bool,
    pub hour: u32,
    pub month: u32,
}

impl Journey {
    /// Computes the derived columns. Depends on nothing but the row itself and
    /// the failure threshold (inclusive).
    pub fn derive(record: JourneyRecord, failure_threshold_min: i64) -> Self {
        let is_failure = record.cancelled || record.delay_min >= failure_threshold_min;
        let hour = record.arrival.hour();
        let month = record.date.month();
        Self {
            record,
            is_failure,
            hour,
            month,
        }
    }
}

/// Immutable snapshot of one load. Cloning shares the rows.
#[derive(Debug, Clone, Default)]
pub struct JourneyTable {
    rows: Arc<[Journey]>,
}

impl JourneyTable {
    pub fn from_records(records: Vec<JourneyRecord>, failure_threshold_min: i64) -> Self {
        let rows: Vec<Journey> = records
            .into_iter()
            .map(|r| Journey::derive(r, failure_threshold_min))
            .collect();
        Self { rows: rows.into() }
    }

    pub fn rows(&self) -> &[Journey] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted unique line identifiers with their row counts.
    pub fn line_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for j in self.rows.iter() {
            *counts.entry(j.record.line.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted unique line identifiers.
    pub fn lines(&self) -> Vec<String> {
        self.line_counts().into_keys().collect()
    }
}
