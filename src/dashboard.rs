//! One configured pipeline: source, cache, and configuration.
//!
//! Every render pass starts from the cached table and re-runs filtering and
//! aggregation from scratch.

use tracing::{info, instrument};

use crate::cache::TableCache;
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::filter::{self, Selection};
use crate::parser::ScanRequest;
use crate::record::JourneyTable;
use crate::source::TableSource;
use crate::stats::Report;

/// Filters `table` and computes its report. Pure; touches no I/O.
pub fn compute(
    table: &JourneyTable,
    selection: &Selection,
    config: &DashboardConfig,
) -> Result<Report> {
    let view = filter::apply(table, selection, &config.filter_rules())?;
    Ok(Report::compute(&view, &config.metrics()))
}

pub struct Dashboard {
    source: Box<dyn TableSource>,
    cache: TableCache,
    config: DashboardConfig,
    scan: ScanRequest,
}

impl Dashboard {
    /// `pushdown` restricts what is read from the source to those lines.
    pub fn new(
        source: Box<dyn TableSource>,
        config: DashboardConfig,
        pushdown: Option<Vec<String>>,
    ) -> Self {
        let mut scan = ScanRequest::new(config.columns.clone());
        if let Some(lines) = pushdown {
            scan = scan.with_lines(lines);
        }
        Self {
            cache: TableCache::new(config.failure_threshold_min),
            source,
            config,
            scan,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// The current snapshot, loaded on first use.
    pub async fn table(&mut self) -> Result<JourneyTable> {
        self.cache.get_or_load(self.source.as_ref(), &self.scan).await
    }

    /// Forgets the cached table; the next pass refetches it.
    pub fn reload(&mut self) -> Result<()> {
        info!(source = %self.source.describe(), "Reload requested");
        self.cache.clear();
        self.source.refresh()
    }

    #[instrument(
        skip(self, selection),
        fields(lines = selection.lines.len(), neutralize = selection.neutralize)
    )]
    pub async fn report(&mut self, selection: &Selection) -> Result<Report> {
        let table = self.table().await?;
        let report = compute(&table, selection, &self.config)?;
        info!(
            total = report.total,
            failures = report.failures,
            failure_rate = report.failure_rate,
            "Render pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DashboardError;
    use crate::parser::Decoded;
    use crate::record::JourneyRecord;
    use crate::record::tests::record;
    use crate::source::SourceKey;
    use async_trait::async_trait;

    pub(crate) struct MemorySource(pub(crate) Vec<JourneyRecord>);

    #[async_trait]
    impl TableSource for MemorySource {
        fn describe(&self) -> String {
            "memory".into()
        }

        fn key(&self) -> SourceKey {
            SourceKey::new("memory", "rows", None)
        }

        async fn load(&self, scan: &ScanRequest) -> Result<Decoded> {
            let records = self
                .0
                .iter()
                .filter(|r| scan.lines.as_ref().is_none_or(|l| l.contains(&r.line)))
                .cloned()
                .collect();
            Ok(Decoded {
                records,
                dropped: 0,
            })
        }
    }

    pub(crate) fn sample_rows() -> Vec<JourneyRecord> {
        vec![
            record("2025-01-16", "IC 1", 15, false),
            record("2025-01-16", "IC 1", 2, false),
            record("2025-01-18", "IC 1", 45, false),
            record("2025-01-17", "IC 5", 0, true),
            record("2025-01-17", "IC 5", 33, false),
        ]
    }

    #[tokio::test]
    async fn test_report_over_all_lines() {
        let mut dash = Dashboard::new(
            Box::new(MemorySource(sample_rows())),
            DashboardConfig::default(),
            None,
        );
        let table = dash.table().await.unwrap();
        let report = dash.report(&Selection::all(&table, false)).await.unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.failures, 4);
        assert_eq!(report.worst.len(), 2);
        assert_eq!(report.worst[0].delay_min, 45);
    }

    #[tokio::test]
    async fn test_neutralized_report_drops_closure_saturday() {
        let mut dash = Dashboard::new(
            Box::new(MemorySource(sample_rows())),
            DashboardConfig::default(),
            None,
        );
        let selection = Selection::new(["IC 1".to_string()], true);
        let report = dash.report(&selection).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.failure_rate, 50.0);
    }

    #[tokio::test]
    async fn test_pushdown_limits_table() {
        let mut dash = Dashboard::new(
            Box::new(MemorySource(sample_rows())),
            DashboardConfig::default(),
            Some(vec!["IC 5".to_string()]),
        );
        assert_eq!(dash.table().await.unwrap().lines(), vec!["IC 5".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_selection_is_reported() {
        let mut dash = Dashboard::new(
            Box::new(MemorySource(sample_rows())),
            DashboardConfig::default(),
            None,
        );
        let err = dash.report(&Selection::default()).await.unwrap_err();
        assert!(matches!(err, DashboardError::EmptySelection));
    }
}
