use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::MetricsConfig;
use crate::filter::FilteredView;

/// One bucket of a grouped series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint<K> {
    pub key: K,
    pub total: usize,
    pub failures: usize,
    /// Failure rate in percent.
    pub rate: f64,
}

/// A row of the worst-offenders table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorstJourney {
    pub date: NaiveDate,
    pub line: String,
    pub trip_id: String,
    pub stop_name: String,
    pub delay_min: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total: usize,
    pub failures: usize,
    pub failure_rate: f64,
    /// Passenger-hours heuristic: delay hours × capacity × load factor.
    pub estimated_hours_lost: f64,
    pub neutralized: bool,
    pub daily: Vec<SeriesPoint<NaiveDate>>,
    pub hourly: Vec<SeriesPoint<u32>>,
    pub worst: Vec<WorstJourney>,
}

/// `part / total` in percent, 0 when `total` is 0.
pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

fn series<K: Ord + Copy>(keyed: impl Iterator<Item = (K, bool)>) -> Vec<SeriesPoint<K>> {
    let mut buckets: BTreeMap<K, (usize, usize)> = BTreeMap::new();
    for (key, failed) in keyed {
        let (total, failures) = buckets.entry(key).or_default();
        *total += 1;
        if failed {
            *failures += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(key, (total, failures))| SeriesPoint {
            key,
            total,
            failures,
            rate: pct(failures, total),
        })
        .collect()
}

impl Report {
    pub fn compute(view: &FilteredView<'_>, config: &MetricsConfig) -> Self {
        let rows = view.rows();
        let total = rows.len();
        let failures = rows.iter().filter(|j| j.is_failure).count();
        let delay_sum: i64 = rows.iter().map(|j| j.record.delay_min).sum();
        let estimated_hours_lost =
            (delay_sum as f64 / 60.0) * config.train_capacity * config.load_factor;

        let daily = series(rows.iter().map(|j| (j.record.date, j.is_failure)));
        let hourly = series(rows.iter().map(|j| (j.hour, j.is_failure)));

        let mut worst: Vec<WorstJourney> = rows
            .iter()
            .filter(|j| j.record.delay_min > config.worst_threshold_min)
            .map(|j| WorstJourney {
                date: j.record.date,
                line: j.record.line.clone(),
                trip_id: j.record.trip_id.clone(),
                stop_name: j.record.stop_name.clone(),
                delay_min: j.record.delay_min,
            })
            .collect();
        worst.sort_by(|a, b| {
            b.delay_min
                .cmp(&a.delay_min)
                .then_with(|| a.date.cmp(&b.date))
                .then_with(|| a.line.cmp(&b.line))
                .then_with(|| a.trip_id.cmp(&b.trip_id))
        });
        worst.truncate(config.worst_limit);

        Self {
            total,
            failures,
            failure_rate: pct(failures, total),
            estimated_hours_lost,
            neutralized: view.neutralized,
            daily,
            hourly,
            worst,
        }
    }

    /// Label of the dataset-status KPI.
    pub fn status(&self) -> &'static str {
        if self.neutralized {
            "Neutralized"
        } else {
            "Raw reality"
        }
    }
}
