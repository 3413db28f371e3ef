//! Table sources.
//!
//! Every way of reaching the journey table sits behind [`TableSource`]:
//! [`LocalFile`] reads from disk, [`RemoteScan`] scans a remote Parquet file
//! lazily over HTTP, and [`CachedDownload`] fetches a file once into a cache
//! directory and reads it locally afterwards. [`SourceConfig`] picks one.

mod download;
mod local;
#[cfg(test)]
mod loopback;
mod remote;

pub use download::CachedDownload;
pub use local::LocalFile;
pub use remote::RemoteScan;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::parser::{Decoded, ScanRequest};

const HUB_BASE_URL: &str = "https://huggingface.co/datasets";

/// Fingerprint of a source descriptor. Tokens only enter it hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(kind: &str, location: &str, token: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0]);
        hasher.update(location.as_bytes());
        hasher.update([0]);
        if let Some(token) = token {
            hasher.update(Sha256::digest(token.as_bytes()));
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Narrows the key to one scan, so pushed-down reads are cached apart.
    pub fn scoped(&self, scan: &ScanRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        for name in scan.columns.names() {
            hasher.update([0]);
            hasher.update(name.as_bytes());
        }
        if let Some(lines) = &scan.lines {
            let mut lines: Vec<&String> = lines.iter().collect();
            lines.sort();
            hasher.update(b"\x01lines");
            for line in lines {
                hasher.update([0]);
                hasher.update(line.as_bytes());
            }
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Short form used for cache directory names and logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Anything that can produce journey records.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Human-readable location, never containing credentials.
    fn describe(&self) -> String;

    fn key(&self) -> SourceKey;

    async fn load(&self, scan: &ScanRequest) -> Result<Decoded>;

    /// Discards anything persisted outside the process so the next load refetches.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Which source to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Local {
        path: PathBuf,
    },
    Remote {
        url: String,
        download: bool,
    },
    /// A file inside a dataset repository on the hub.
    Hub {
        repo: String,
        file: String,
        revision: String,
        download: bool,
    },
}

impl SourceConfig {
    /// URLs become remote sources, anything else a local path.
    pub fn from_location(location: &str, download: bool) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Remote {
                url: location.to_string(),
                download,
            }
        } else {
            Self::Local {
                path: PathBuf::from(location),
            }
        }
    }

    pub fn hub_url(repo: &str, file: &str, revision: &str) -> String {
        format!(
            "{HUB_BASE_URL}/{}/resolve/{}/{}",
            repo.trim_matches('/'),
            revision,
            file.trim_start_matches('/')
        )
    }

    /// Whether reaching this source may need an access token.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local { .. })
    }

    pub fn build(&self, token: Option<String>, cache_dir: &Path) -> Result<Box<dyn TableSource>> {
        Ok(match self {
            Self::Local { path } => Box::new(LocalFile::new(path.clone())),
            Self::Remote { url, download: false } => Box::new(RemoteScan::new(url, token)?),
            Self::Remote { url, download: true } => {
                Box::new(CachedDownload::new(url, token, cache_dir)?)
            }
            Self::Hub {
                repo,
                file,
                revision,
                download,
            } => {
                let url = Self::hub_url(repo, file, revision);
                if *download {
                    Box::new(CachedDownload::new(&url, token, cache_dir)?)
                } else {
                    Box::new(RemoteScan::new(&url, token)?)
                }
            }
        })
    }
}
