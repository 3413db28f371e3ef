use std::sync::Arc;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::http::HttpBuilder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore};
use parquet::arrow::async_reader::{ParquetObjectReader, ParquetRecordBatchStreamBuilder};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, info};

use super::{SourceKey, TableSource};
use crate::error::{DashboardError, Result};
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, fetch_bytes};
use crate::parser::{self, Decoded, FileFormat, ScanRequest};

/// A file read straight from an HTTP(S) URL, without touching the disk.
///
/// Parquet is scanned lazily: the footer is read first, then only the mapped
/// columns of the row groups are requested, with the line predicate applied
/// inside the reader. CSV has no such layout and is fetched whole.
pub struct RemoteScan {
    url: Url,
    token: Option<String>,
}

impl RemoteScan {
    pub fn new(url: &str, token: Option<String>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| DashboardError::acquisition(url, e))?;
        Ok(Self { url, token })
    }

    /// A store rooted at the file itself, so the query string (e.g. a URL
    /// signature) rides along on every HEAD and range request.
    fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        let mut options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(10))
            .with_timeout(Duration::from_secs(120))
            .with_allow_http(self.url.scheme() == "http");
        if let Some(token) = &self.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| DashboardError::acquisition(self.describe(), e))?;
            value.set_sensitive(true);
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            options = options.with_default_headers(headers);
        }

        let store = HttpBuilder::new()
            .with_url(self.url.as_str())
            .with_client_options(options)
            .build()
            .map_err(|e| DashboardError::acquisition(self.describe(), e))?;
        Ok(Arc::new(store))
    }

    async fn scan_parquet(&self, scan: &ScanRequest) -> Result<Decoded> {
        let store = self.store()?;
        let location = Path::default();

        let meta = store
            .head(&location)
            .await
            .map_err(|e| DashboardError::acquisition(self.describe(), e))?;
        debug!(size = meta.size, "Remote parquet found");

        let reader = ParquetObjectReader::new(store, location);
        let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;
        debug!(
            row_groups = builder.metadata().num_row_groups(),
            rows = builder.metadata().file_metadata().num_rows(),
            "Remote parquet footer read"
        );

        let stream = parser::configure_reader(builder, scan)?.build()?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut decoded = Decoded::default();
        for batch in &batches {
            let part = parser::decode_batch(batch, scan)?;
            decoded.records.extend(part.records);
            decoded.dropped += part.dropped;
        }
        Ok(decoded)
    }

    async fn fetch_csv(&self, scan: &ScanRequest, gzipped: bool) -> Result<Decoded> {
        let acquisition = |e: anyhow::Error| DashboardError::acquisition(self.describe(), e);
        let base = BasicClient::new().map_err(acquisition)?;
        let body = match &self.token {
            Some(token) => {
                let client = ApiKey::bearer(base, token).map_err(acquisition)?;
                fetch_bytes(&client, self.url.as_str()).await
            }
            None => fetch_bytes(&base, self.url.as_str()).await,
        }
        .map_err(acquisition)?;

        if gzipped {
            parser::read_csv_gz(body.as_slice(), scan)
        } else {
            parser::read_csv(body.as_slice(), scan)
        }
    }
}

#[async_trait]
impl TableSource for RemoteScan {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    fn key(&self) -> SourceKey {
        SourceKey::new("remote", self.url.as_str(), self.token.as_deref())
    }

    #[tracing::instrument(skip(self, scan), fields(url = %self.url))]
    async fn load(&self, scan: &ScanRequest) -> Result<Decoded> {
        let decoded = match FileFormat::detect(self.url.path())? {
            FileFormat::Parquet => self.scan_parquet(scan).await?,
            FileFormat::Csv => self.fetch_csv(scan, false).await?,
            FileFormat::CsvGz => self.fetch_csv(scan, true).await?,
        };
        info!(
            rows = decoded.records.len(),
            dropped = decoded.dropped,
            "Remote scan complete"
        );
        Ok(decoded)
    }
}
