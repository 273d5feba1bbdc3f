use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::download::{collect_body, Transport};
use super::error::FetchError;
use super::installed;
use super::platform::Platform;
use super::version::VersionRequest;

pub const INDEX_PATH: &str = "index.json";

/// Default total budget for fetching the release index.
pub const INDEX_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lts {
    Codename(String),
    Flag(bool),
}

impl Lts {
    pub fn codename(&self) -> Option<&str> {
        match self {
            Lts::Codename(name) => Some(name),
            Lts::Flag(_) => None,
        }
    }
}

impl Default for Lts {
    fn default() -> Self {
        Lts::Flag(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub version: String,
    #[serde(default)]
    pub npm: Option<String>,
    #[serde(default)]
    pub lts: Lts,
    pub date: String,
    #[serde(default)]
    pub v8: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

impl ReleaseRecord {
    pub fn semver(&self) -> Option<Version> {
        Version::parse(self.version.trim_start_matches('v')).ok()
    }

    /// Version without the leading `v`, as used for install directories.
    pub fn bare_version(&self) -> &str {
        self.version.trim_start_matches('v')
    }

    /// Whether a prebuilt artifact exists for a `files` tag such as
    /// `linux-x64` or `win-x64-zip`.
    pub fn supports(&self, tag: &str) -> bool {
        self.files.iter().any(|file| file == tag)
    }
}

/// Every published release, newest first, in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseIndex(Vec<ReleaseRecord>);

impl ReleaseIndex {
    pub fn new(records: Vec<ReleaseRecord>) -> Self {
        Self(records)
    }

    pub fn records(&self) -> &[ReleaseRecord] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&ReleaseRecord> {
        self.0.first()
    }

    pub fn latest_lts(&self) -> Option<&ReleaseRecord> {
        self.0.iter().find(|record| record.lts.codename().is_some())
    }

    pub fn find(&self, version: &Version) -> Option<&ReleaseRecord> {
        self.0
            .iter()
            .find(|record| record.semver().as_ref() == Some(version))
    }

    /// Newest record satisfying `request`.
    pub fn resolve(&self, request: &VersionRequest) -> Option<&ReleaseRecord> {
        match request {
            VersionRequest::Latest => self.latest(),
            VersionRequest::Lts => self.latest_lts(),
            VersionRequest::Exact(version) => self.find(version),
            VersionRequest::Range(req) => self
                .0
                .iter()
                .find(|record| record.semver().map_or(false, |v| req.matches(&v))),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to fetch the Node.js release index: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse the Node.js release index: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owner of the release index and installed-version caches.
///
/// Built once at startup and shared by reference; nothing here is global.
pub struct VersionCache {
    transport: Arc<dyn Transport>,
    index_path: PathBuf,
    install_root: PathBuf,
    platform: Platform,
    index: Mutex<Option<Arc<ReleaseIndex>>>,
    fetches: AtomicU64,
    installed: Mutex<Option<Vec<String>>>,
}

impl VersionCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        index_path: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        platform: Platform,
    ) -> Self {
        Self {
            transport,
            index_path: index_path.into(),
            install_root: install_root.into(),
            platform,
            index: Mutex::new(None),
            fetches: AtomicU64::new(0),
            installed: Mutex::new(None),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Returns the release index.
    ///
    /// Without `force_fetch` any cached copy is trusted, however old. With it,
    /// or when nothing is cached, the index is downloaded and replaces the
    /// persisted copy. Callers waiting behind an in-flight download reuse its
    /// result instead of issuing their own.
    pub async fn list(&self, force_fetch: bool) -> Result<Arc<ReleaseIndex>, IndexError> {
        let seen = self.fetches.load(Ordering::SeqCst);
        let mut memory = self.index.lock().await;

        let fetched_while_waiting = self.fetches.load(Ordering::SeqCst) != seen;
        if let Some(index) = memory.as_ref() {
            if !force_fetch || fetched_while_waiting {
                return Ok(Arc::clone(index));
            }
        }

        if !force_fetch {
            if let Some(index) = self.get_cache().await? {
                debug!("Loaded release index from {}", self.index_path.display());
                let index = Arc::new(index);
                *memory = Some(Arc::clone(&index));
                return Ok(index);
            }
        }

        let index = Arc::new(self.fetch().await?);
        *memory = Some(Arc::clone(&index));
        self.fetches.fetch_add(1, Ordering::SeqCst);

        Ok(index)
    }

    async fn fetch(&self) -> Result<ReleaseIndex, IndexError> {
        info!(
            "Fetching release index from {}",
            self.transport.mirror()
        );

        let response = self
            .transport
            .fetch(INDEX_PATH, &CancellationToken::new())
            .await?;
        let content = collect_body(response.body).await?;

        let index: ReleaseIndex = serde_json::from_slice(&content)?;
        self.set_cache(&content).await?;

        debug!("Release index has {} releases", index.len());
        Ok(index)
    }

    /// Reads the persisted index, if there is one.
    pub async fn get_cache(&self) -> Result<Option<ReleaseIndex>, IndexError> {
        let content = match fs::read(&self.index_path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IndexError::Io {
                    path: self.index_path.clone(),
                    source,
                })
            }
        };

        Ok(Some(serde_json::from_slice(&content)?))
    }

    /// Replaces the persisted index with `content`, byte for byte.
    ///
    /// The new content goes to a uniquely named file next to the old one and
    /// is renamed over it, so readers see either the previous or the new
    /// index and concurrent writers never share a staging file.
    pub async fn set_cache(&self, content: &[u8]) -> Result<(), IndexError> {
        let index_path = self.index_path.clone();
        let content = content.to_vec();

        tokio::task::spawn_blocking(move || persist_index(&index_path, &content))
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
            .and_then(|written| written)
            .map_err(|source| IndexError::Io {
                path: self.index_path.clone(),
                source,
            })
    }

    /// Versions installed under the install root, scanned at most once until
    /// `refresh` is requested.
    pub async fn installed(&self, refresh: bool) -> Result<Vec<String>, IndexError> {
        let mut memory = self.installed.lock().await;
        if let Some(versions) = memory.as_ref() {
            if !refresh {
                return Ok(versions.clone());
            }
        }

        let versions = installed::scan(&self.install_root, &self.platform)
            .await
            .map_err(|source| IndexError::Io {
                path: self.install_root.clone(),
                source,
            })?;
        *memory = Some(versions.clone());

        Ok(versions)
    }

    /// Drops both in-memory caches; the persisted index is kept.
    pub async fn invalidate(&self) {
        *self.index.lock().await = None;
        *self.installed.lock().await = None;
    }
}

fn persist_index(index_path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = index_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut staging = tempfile::NamedTempFile::new_in(parent)?;
    staging.write_all(content)?;
    staging.as_file().sync_all()?;
    staging.persist(index_path).map_err(|err| err.error)?;

    Ok(())
}
