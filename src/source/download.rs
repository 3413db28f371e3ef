use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info};

use super::{LocalFile, SourceKey, TableSource};
use crate::error::{DashboardError, Result};
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, download_to_file};
use crate::parser::{Decoded, ScanRequest};

/// A remote file downloaded once into `<cache_dir>/<key>/<file name>`.
///
/// Later loads, in this process or the next, read the cached copy. Deleting
/// the directory (or calling [`CachedDownload::evict`]) forces a refetch.
pub struct CachedDownload {
    url: Url,
    token: Option<String>,
    target: PathBuf,
}

impl CachedDownload {
    pub fn new(url: &str, token: Option<String>, cache_dir: &Path) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| DashboardError::acquisition(url, e))?;
        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DashboardError::acquisition(url, "URL does not name a file"))?
            .to_string();

        let key = SourceKey::new("download", parsed.as_str(), token.as_deref());
        let target = cache_dir.join(key.short()).join(file_name);
        Ok(Self {
            url: parsed,
            token,
            target,
        })
    }

    /// Location of the cached copy.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_cached(&self) -> bool {
        self.target.is_file()
    }

    /// Removes the cached copy so the next load downloads again.
    pub fn evict(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.target) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn download(&self) -> Result<()> {
        let acquisition = |e: anyhow::Error| DashboardError::acquisition(self.describe(), e);
        let base = BasicClient::new().map_err(acquisition)?;
        let written = match &self.token {
            Some(token) => {
                let client = ApiKey::bearer(base, token).map_err(acquisition)?;
                download_to_file(&client, self.url.as_str(), &self.target).await
            }
            None => download_to_file(&base, self.url.as_str(), &self.target).await,
        }
        .map_err(acquisition)?;

        info!(bytes = written, path = %self.target.display(), "Dataset cached");
        Ok(())
    }
}

#[async_trait]
impl TableSource for CachedDownload {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    fn key(&self) -> SourceKey {
        SourceKey::new("download", self.url.as_str(), self.token.as_deref())
    }

    #[tracing::instrument(skip(self, scan), fields(url = %self.url))]
    async fn load(&self, scan: &ScanRequest) -> Result<Decoded> {
        if self.is_cached() {
            debug!(path = %self.target.display(), "Using cached download");
        } else {
            self.download().await?;
        }
        LocalFile::new(&self.target).load(scan).await
    }

    fn refresh(&self) -> Result<()> {
        self.evict()
            .map_err(|e| DashboardError::acquisition(self.describe(), e))?;
        debug!(path = %self.target.display(), "Cached download evicted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::parquet_fixture;
    use crate::source::loopback::FileServer;

    #[test]
    fn test_target_is_keyed_per_url_and_token() {
        let dir = Path::new("/tmp/cache");
        let a = CachedDownload::new("https://h.example/d/sbb.parquet", None, dir).unwrap();
        let b = CachedDownload::new("https://h.example/d/sbb.parquet", Some("t".into()), dir)
            .unwrap();

        assert!(a.target().ends_with("sbb.parquet"));
        assert!(a.target().starts_with(dir));
        assert_ne!(a.target(), b.target());
    }

    #[test]
    fn test_url_without_file_name_is_rejected() {
        assert!(CachedDownload::new("https://h.example/", None, Path::new("/tmp")).is_err());
    }

    #[tokio::test]
    async fn test_first_load_downloads_then_reuses_cache() {
        let server = FileServer::start(parquet_fixture(), Some("hf_secret")).await;
        let dir = tempfile::tempdir().unwrap();
        let source = CachedDownload::new(
            &server.url("/data/journeys.parquet"),
            Some("hf_secret".into()),
            dir.path(),
        )
        .unwrap();
        assert!(!source.is_cached());

        let first = source.load(&ScanRequest::default()).await.unwrap();
        assert_eq!(first.records.len(), 3);
        assert!(source.is_cached());
        assert_eq!(std::fs::read(source.target()).unwrap(), parquet_fixture());
        assert_eq!(server.requests().len(), 1);

        let again = source.load(&ScanRequest::default()).await.unwrap();
        assert_eq!(again.records, first.records);
        assert_eq!(server.requests().len(), 1);

        source.refresh().unwrap();
        source.load(&ScanRequest::default()).await.unwrap();
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_token_is_acquisition_error() {
        let server = FileServer::start(parquet_fixture(), Some("hf_secret")).await;
        let dir = tempfile::tempdir().unwrap();
        let source = CachedDownload::new(
            &server.url("/data/journeys.parquet"),
            Some("hf_wrong".into()),
            dir.path(),
        )
        .unwrap();

        let err = source.load(&ScanRequest::default()).await.unwrap_err();
        assert!(matches!(err, DashboardError::Acquisition { .. }));
        assert!(err.to_string().contains("401"), "{err}");
        assert!(!source.is_cached());
    }

    #[tokio::test]
    async fn test_cached_copy_is_read_without_network() {
        let dir = tempfile::tempdir().unwrap();
        // Unroutable host: any network access would fail the test.
        let source =
            CachedDownload::new("https://invalid.example/data/journeys.parquet", None, dir.path())
                .unwrap();
        std::fs::create_dir_all(source.target().parent().unwrap()).unwrap();
        std::fs::write(source.target(), parquet_fixture()).unwrap();

        let decoded = source.load(&ScanRequest::default()).await.unwrap();
        assert_eq!(decoded.records.len(), 3);

        source.evict().unwrap();
        assert!(!source.is_cached());
        source.refresh().unwrap();
    }
}
