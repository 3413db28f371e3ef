//! Line selection and neutralization.

use std::collections::BTreeSet;

use chrono::{Datelike, Weekday};

use crate::config::FilterRules;
use crate::error::{DashboardError, Result};
use crate::record::{Journey, JourneyTable};

/// What the user asked to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub lines: BTreeSet<String>,
    /// Drop blacklisted dates and weekends.
    pub neutralize: bool,
}

impl Selection {
    pub fn new(lines: impl IntoIterator<Item = String>, neutralize: bool) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            neutralize,
        }
    }

    /// Every line present in `table`.
    pub fn all(table: &JourneyTable, neutralize: bool) -> Self {
        Self::new(table.lines(), neutralize)
    }

    fn keeps(&self, journey: &Journey, rules: &FilterRules) -> bool {
        let r = &journey.record;
        if !self.lines.contains(&r.line) {
            return false;
        }
        if self.neutralize {
            return !rules.blacklist.contains(&r.date) && !is_weekend(r.date.weekday());
        }
        true
    }
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Borrowed, read-only view of the rows that passed the filter.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    rows: Vec<&'a Journey>,
    pub neutralized: bool,
}

impl<'a> FilteredView<'a> {
    pub fn rows(&self) -> &[&'a Journey] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Restricts `table` to the selection.
///
/// An empty line selection is a user error: there is nothing to render.
pub fn apply<'a>(
    table: &'a JourneyTable,
    selection: &Selection,
    rules: &FilterRules,
) -> Result<FilteredView<'a>> {
    if selection.lines.is_empty() {
        return Err(DashboardError::EmptySelection);
    }
    let rows = table
        .rows()
        .iter()
        .filter(|j| selection.keeps(j, rules))
        .collect();
    Ok(FilteredView {
        rows,
        neutralized: selection.neutralize,
    })
}
