//! Output formatting and persistence for reports.
//!
//! Supports terminal tables, JSON serialization, and CSV export of the
//! worst-offenders list.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table};
use csv::WriterBuilder;
use tracing::{debug, info};

use crate::stats::Report;

/// Formats an integer with `,` thousands separators.
pub fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// The four headline figures as (label, value) pairs.
pub fn kpis(report: &Report) -> [(&'static str, String); 4] {
    [
        ("Total trains", thousands(report.total as i64)),
        ("Failure rate (>10m)", format!("{:.1}%", report.failure_rate)),
        (
            "Est. human hours lost",
            thousands(report.estimated_hours_lost.trunc() as i64),
        ),
        ("Dataset status", report.status().to_string()),
    ]
}

pub fn kpi_table(report: &Report) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let (labels, values): (Vec<_>, Vec<_>) = kpis(report).into_iter().unzip();
    table.set_header(labels);
    table.add_row(values);
    table
}

pub fn worst_table(report: &Report) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Date", "Line", "Trip", "Stop", "Delay (min)"]);
    for w in &report.worst {
        table.add_row(vec![
            w.date.to_string(),
            w.line.clone(),
            w.trip_id.clone(),
            w.stop_name.clone(),
            w.delay_min.to_string(),
        ]);
    }
    table
}

/// Row counts per line, as listed by `lines`.
pub fn lines_table(counts: &BTreeMap<String, usize>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Line", "Journeys"]);
    for (line, n) in counts {
        table.add_row(vec![line.clone(), thousands(*n as i64)]);
    }
    table
}

/// Renders the whole terminal view of a report.
pub fn render_text(report: &Report) -> String {
    let mut out = format!(
        "Analysis of {} intercity journeys.\n\n{}\n\nTop {} worst journeys\n",
        thousands(report.total as i64),
        kpi_table(report),
        report.worst.len()
    );
    if report.worst.is_empty() {
        out.push_str("(no journey above the delay threshold)\n");
    } else {
        out.push_str(&worst_table(report).to_string());
        out.push('\n');
    }
    out
}

/// Logs a report using Rust's debug pretty-print format.
pub fn print_pretty(report: &Report) {
    debug!("{:#?}", report);
}

/// Logs a report as pretty-printed JSON.
pub fn print_json(report: &Report) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Writes a report as pretty-printed JSON to `path`.
pub fn write_json(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    debug!(path = %path.display(), "JSON report written");
    Ok(())
}

/// Writes the worst-offenders list to a CSV file, header included.
pub fn write_worst_csv(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    if report.worst.is_empty() {
        writer.write_record(["date", "line", "trip_id", "stop_name", "delay_min"])?;
    }
    for row in &report.worst {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = report.worst.len(), "Worst offenders written");
    Ok(())
}
