//! Dashboard configuration.
//!
//! Loaded once at start-up from an optional JSON file and passed explicitly
//! into the filter and metrics stages. Every field is optional:
//! ```json
//! {
//!   "blacklist": ["2025-01-18", "2025-06-28"],
//!   "failure_threshold_min": 10,
//!   "columns": { "line": "LINIEN_TEXT" }
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

/// Planned-works days of 2025 on which the network was structurally broken.
const CONSTRUCTION_DAYS: &[(i32, u32, u32)] = &[
    (2025, 1, 18),
    (2025, 1, 19),
    (2025, 1, 25),
    (2025, 1, 26),
    (2025, 2, 1),
    (2025, 2, 2),
    (2025, 2, 8),
    (2025, 2, 9),
    (2025, 6, 28),
    (2025, 9, 13),
    (2025, 9, 14),
    (2025, 11, 23),
];

/// Names of the input columns holding each journey attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub date: String,
    pub line: String,
    pub trip_id: String,
    pub stop_name: String,
    pub arrival: String,
    pub delay_min: String,
    pub cancelled: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            date: "BETRIEBSTAG".to_string(),
            line: "LINIEN_TEXT".to_string(),
            trip_id: "FAHRT_BEZEICHNER".to_string(),
            stop_name: "HALTESTELLEN_NAME".to_string(),
            arrival: "ANKUNFTSZEIT".to_string(),
            delay_min: "DELAY_MIN".to_string(),
            cancelled: "IS_CANCELLED".to_string(),
        }
    }
}

impl ColumnMapping {
    /// All column names, in record order.
    pub fn names(&self) -> [&str; 7] {
        [
            &self.date,
            &self.line,
            &self.trip_id,
            &self.stop_name,
            &self.arrival,
            &self.delay_min,
            &self.cancelled,
        ]
    }
}

/// Fixed set of dates excluded when neutralization is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blacklist(BTreeSet<NaiveDate>);

impl Blacklist {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self(dates.into_iter().collect())
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.0.contains(date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(
            CONSTRUCTION_DAYS
                .iter()
                .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub columns: ColumnMapping,
    pub blacklist: Blacklist,
    /// A journey delayed by at least this many minutes counts as failed.
    pub failure_threshold_min: i64,
    /// Only journeys delayed by strictly more than this enter the worst list.
    pub worst_threshold_min: i64,
    pub worst_limit: usize,
    /// Reference line drawn on the daily chart, in percent.
    pub chaos_threshold_pct: f64,
    /// Impact heuristic inputs. Placeholders, not measured values.
    pub train_capacity: f64,
    pub load_factor: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            blacklist: Blacklist::default(),
            failure_threshold_min: 10,
            worst_threshold_min: 30,
            worst_limit: 10,
            chaos_threshold_pct: 20.0,
            train_capacity: 600.0,
            load_factor: 0.4,
        }
    }
}

impl DashboardConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DashboardError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DashboardError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worst_limit == 0 {
            return Err(DashboardError::Config("worst_limit must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.load_factor) {
            return Err(DashboardError::Config(format!(
                "load_factor must be within [0, 1], got {}",
                self.load_factor
            )));
        }
        if self.train_capacity < 0.0 {
            return Err(DashboardError::Config("train_capacity must not be negative".into()));
        }
        Ok(())
    }

    pub fn filter_rules(&self) -> FilterRules {
        FilterRules {
            blacklist: self.blacklist.clone(),
        }
    }

    pub fn metrics(&self) -> MetricsConfig {
        MetricsConfig {
            worst_threshold_min: self.worst_threshold_min,
            worst_limit: self.worst_limit,
            train_capacity: self.train_capacity,
            load_factor: self.load_factor,
        }
    }
}

/// Inputs of the neutralization filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub blacklist: Blacklist,
}

/// Inputs of the metrics stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    pub worst_threshold_min: i64,
    pub worst_limit: usize,
    pub train_capacity: f64,
    pub load_factor: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        DashboardConfig::default().metrics()
    }
}
