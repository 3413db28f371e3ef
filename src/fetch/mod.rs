mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

async fn get<C: HttpClient>(client: &C, url: &str) -> Result<reqwest::Response> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().with_context(|| format!("invalid URL '{url}'"))?,
    );

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let hint = match status.as_u16() {
            401 | 403 => " (access token missing or rejected)",
            404 => " (file not found)",
            _ => "",
        };
        bail!("HTTP {status}{hint}: {}", body.chars().take(200).collect::<String>());
    }
    Ok(resp)
}

/// GETs `url` and returns the body, failing on any non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let resp = get(client, url).await?;
    Ok(resp.bytes().await?.to_vec())
}

/// Downloads `url` into `dest`.
///
/// The body is written to a sibling `.part` file and renamed once complete, so
/// an interrupted transfer never leaves a file that looks cached.
#[tracing::instrument(skip(client), fields(dest = %dest.display()))]
pub async fn download_to_file<C: HttpClient>(client: &C, url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = dest.with_extension("part");

    let mut resp = get(client, url).await?;
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("cannot create {}", partial.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);
    debug!(bytes = written, "Download complete, moving into place");

    tokio::fs::rename(&partial, dest).await?;
    info!(bytes = written, "Dataset downloaded");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Canned {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for Canned {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(resp.into())
        }
    }

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let client = Canned { status: 200, body: "hello" };
        let bytes = fetch_bytes(&client, "https://example.org/x.csv").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_fetch_bytes_reports_auth_rejection() {
        let client = Canned { status: 401, body: "unauthorized" };
        let err = fetch_bytes(&client, "https://example.org/x.csv").await.unwrap_err();
        assert!(err.to_string().contains("access token"));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_bad_url() {
        let client = Canned { status: 200, body: "" };
        assert!(fetch_bytes(&client, "not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_download_to_file_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/data.csv");
        let client = Canned { status: 200, body: "a,b\n1,2\n" };

        let written = download_to_file(&client, "https://example.org/data.csv", &dest)
            .await
            .unwrap();

        assert_eq!(written, 8);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a,b\n1,2\n");
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.csv");
        let client = Canned { status: 404, body: "missing" };

        assert!(download_to_file(&client, "https://example.org/data.csv", &dest).await.is_err());
        assert!(!dest.exists());
    }
}
