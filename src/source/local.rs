use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{SourceKey, TableSource};
use crate::error::{DashboardError, Result};
use crate::parser::{self, Decoded, FileFormat, ScanRequest};

/// A Parquet or CSV file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(path: PathBuf, scan: ScanRequest) -> Result<Decoded> {
        let name = path.display().to_string();
        let format = FileFormat::detect(&name)?;
        let file = File::open(&path).map_err(|e| DashboardError::acquisition(&name, e))?;
        debug!(path = %name, ?format, "Reading local file");

        match format {
            FileFormat::Parquet => parser::read_parquet(file, &scan),
            FileFormat::Csv => parser::read_csv(BufReader::new(file), &scan),
            FileFormat::CsvGz => parser::read_csv_gz(BufReader::new(file), &scan),
        }
    }
}

#[async_trait]
impl TableSource for LocalFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn key(&self) -> SourceKey {
        let location = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        SourceKey::new("local", &location.display().to_string(), None)
    }

    #[tracing::instrument(skip(self, scan), fields(path = %self.path.display()))]
    async fn load(&self, scan: &ScanRequest) -> Result<Decoded> {
        let path = self.path.clone();
        let scan = scan.clone();
        let decoded = tokio::task::spawn_blocking(move || Self::read(path, scan))
            .await
            .map_err(|e| DashboardError::acquisition(self.describe(), e))??;

        info!(
            rows = decoded.records.len(),
            dropped = decoded.dropped,
            "Local file loaded"
        );
        Ok(decoded)
    }
}
