//! SVG charts of the daily and hourly failure rates.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeDelta};
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::debug;

use crate::stats::{Report, SeriesPoint};

const SIZE: (u32, u32) = (1280, 720);
const LINE_COLOR: RGBColor = RGBColor(31, 119, 180);
// Ends of the white-to-red scale used for the hourly bars.
const LOW_RED: (u8, u8, u8) = (254, 229, 217);
const HIGH_RED: (u8, u8, u8) = (103, 0, 13);

/// Files written by [`render_charts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPaths {
    pub daily: PathBuf,
    pub hourly: PathBuf,
}

/// Writes `daily_failure_rate.svg` and `hourly_failure_rate.svg` into `out_dir`.
#[tracing::instrument(skip(report), fields(out_dir = %out_dir.display()))]
pub fn render_charts(
    report: &Report,
    out_dir: &Path,
    chaos_threshold_pct: f64,
) -> Result<ChartPaths> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;
    let paths = ChartPaths {
        daily: out_dir.join("daily_failure_rate.svg"),
        hourly: out_dir.join("hourly_failure_rate.svg"),
    };

    {
        let root = SVGBackend::new(&paths.daily, SIZE).into_drawing_area();
        draw_daily(&root, &report.daily, chaos_threshold_pct)?;
        root.present()?;
    }
    {
        let root = SVGBackend::new(&paths.hourly, SIZE).into_drawing_area();
        draw_hourly(&root, &report.hourly)?;
        root.present()?;
    }

    debug!(daily = %paths.daily.display(), hourly = %paths.hourly.display(), "Charts written");
    Ok(paths)
}

/// Maps `t` in [0, 1] onto the red scale.
pub fn red_scale(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(
        mix(LOW_RED.0, HIGH_RED.0),
        mix(LOW_RED.1, HIGH_RED.1),
        mix(LOW_RED.2, HIGH_RED.2),
    )
}

fn y_ceiling(rates: impl Iterator<Item = f64>, floor: f64) -> f64 {
    (rates.fold(floor, f64::max) * 1.1).clamp(1.0, 110.0)
}

fn draw_daily<DB>(
    root: &DrawingArea<DB, Shift>,
    daily: &[SeriesPoint<NaiveDate>],
    threshold: f64,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let first = daily.first().map(|p| p.key);
    let points: Vec<(f64, f64)> = match first {
        Some(start) => daily
            .iter()
            .map(|p| ((p.key - start).num_days() as f64, p.rate))
            .collect(),
        None => Vec::new(),
    };
    let x_max = points.last().map_or(0.0, |(x, _)| *x).max(1.0);
    let y_max = y_ceiling(daily.iter().map(|p| p.rate), threshold);

    let mut chart = ChartBuilder::on(root)
        .caption("Daily failure rate (%)", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;

    let date_label = |x: &f64| {
        first
            .map(|d| (d + TimeDelta::days(x.round() as i64)).format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_desc("Operating day")
        .y_desc("Failure rate (%)")
        .x_label_formatter(&date_label)
        .y_label_formatter(&|y| format!("{y:.0}"))
        .draw()?;

    chart.draw_series(LineSeries::new(points, LINE_COLOR.stroke_width(2)))?;

    chart.draw_series(DashedLineSeries::new(
        [(0.0, threshold), (x_max, threshold)],
        4,
        6,
        RED.stroke_width(2),
    ))?;
    chart.draw_series(std::iter::once(Text::new(
        format!("Chaos threshold ({threshold}%)"),
        (x_max * 0.01, threshold + y_max * 0.015),
        ("sans-serif", 16).into_font().color(&RED),
    )))?;

    Ok(())
}

fn draw_hourly<DB>(root: &DrawingArea<DB, Shift>, hourly: &[SeriesPoint<u32>]) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let y_max = y_ceiling(hourly.iter().map(|p| p.rate), 0.0);
    let lo = hourly.iter().map(|p| p.rate).fold(f64::INFINITY, f64::min);
    let hi = hourly.iter().map(|p| p.rate).fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;

    let mut chart = ChartBuilder::on(root)
        .caption("Failure probability by hour", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..24f64, 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(24)
        .x_desc("Hour of day")
        .y_desc("Failure rate (%)")
        .x_label_formatter(&|x| format!("{x:.0}"))
        .y_label_formatter(&|y| format!("{y:.0}"))
        .draw()?;

    chart.draw_series(hourly.iter().map(|p| {
        let x = p.key as f64;
        let t = if span > 0.0 { (p.rate - lo) / span } else { 1.0 };
        Rectangle::new([(x + 0.1, 0.0), (x + 0.9, p.rate)], red_scale(t).filled())
    }))?;

    Ok(())
}
