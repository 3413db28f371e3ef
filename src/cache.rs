//! In-process cache of loaded tables.
//!
//! Keyed by the source fingerprint narrowed to the scan, so a different file,
//! token, column mapping or pushed-down line set never reuses a stale table.
//! Entries live until explicitly invalidated.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::parser::ScanRequest;
use crate::record::JourneyTable;
use crate::source::{SourceKey, TableSource};

#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<SourceKey, JourneyTable>,
    failure_threshold_min: i64,
}

impl TableCache {
    /// `failure_threshold_min` feeds the one-time derivation of each loaded table.
    pub fn new(failure_threshold_min: i64) -> Self {
        Self {
            tables: HashMap::new(),
            failure_threshold_min,
        }
    }

    /// Returns the cached table for `source` and `scan`, loading it on a miss.
    pub async fn get_or_load(
        &mut self,
        source: &dyn TableSource,
        scan: &ScanRequest,
    ) -> Result<JourneyTable> {
        let key = source.key().scoped(scan);
        if let Some(table) = self.tables.get(&key) {
            debug!(key = %key, rows = table.len(), "Table cache hit");
            return Ok(table.clone());
        }

        debug!(key = %key, source = %source.describe(), "Table cache miss");
        let decoded = source.load(scan).await?;
        if decoded.dropped > 0 {
            warn!(
                dropped = decoded.dropped,
                "Rows without date, line or arrival time were skipped"
            );
        }
        let table = JourneyTable::from_records(decoded.records, self.failure_threshold_min);
        info!(key = %key, rows = table.len(), "Table loaded");

        self.tables.insert(key, table.clone());
        Ok(table)
    }

    pub fn contains(&self, source: &dyn TableSource, scan: &ScanRequest) -> bool {
        self.tables.contains_key(&source.key().scoped(scan))
    }

    /// Drops the entry for one source and scan.
    pub fn invalidate(&mut self, source: &dyn TableSource, scan: &ScanRequest) -> bool {
        self.tables.remove(&source.key().scoped(scan)).is_some()
    }

    /// Drops every entry, e.g. after the configuration changed.
    pub fn clear(&mut self) {
        debug!(entries = self.tables.len(), "Table cache cleared");
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Decoded;
    use crate::record::tests::record;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl TableSource for Counting {
        fn describe(&self) -> String {
            "memory".into()
        }

        fn key(&self) -> SourceKey {
            SourceKey::new("memory", "counting", None)
        }

        async fn load(&self, _scan: &ScanRequest) -> Result<Decoded> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Decoded {
                records: vec![
                    record("2025-01-02", "IC 1", 12, false),
                    record("2025-01-02", "IC 5", 0, false),
                ],
                dropped: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let source = Counting {
            loads: AtomicUsize::new(0),
        };
        let scan = ScanRequest::default();
        let mut cache = TableCache::new(10);

        let first = cache.get_or_load(&source, &scan).await.unwrap();
        let second = cache.get_or_load(&source, &scan).await.unwrap();

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), 2);
        assert!(std::ptr::eq(first.rows().as_ptr(), second.rows().as_ptr()));
        assert!(first.rows()[0].is_failure);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_force_reload() {
        let source = Counting {
            loads: AtomicUsize::new(0),
        };
        let scan = ScanRequest::default();
        let mut cache = TableCache::new(10);

        cache.get_or_load(&source, &scan).await.unwrap();
        assert!(cache.invalidate(&source, &scan));
        assert!(!cache.contains(&source, &scan));
        cache.get_or_load(&source, &scan).await.unwrap();
        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_load(&source, &scan).await.unwrap();

        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_different_pushdown_is_a_different_entry() {
        let source = Counting {
            loads: AtomicUsize::new(0),
        };
        let mut cache = TableCache::new(10);

        cache.get_or_load(&source, &ScanRequest::default()).await.unwrap();
        let narrowed = ScanRequest::default().with_lines(["IC 1".to_string()]);
        cache.get_or_load(&source, &narrowed).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
