mod gz;
mod raw;
mod zip;

pub use self::gz::GzipTar;
pub use self::raw::Raw;
pub use self::zip::{has_zip_archive, Zip};

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use semver::Version;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinError;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::checksum::{self, PendingChecksum};
use super::download::Transport;
use super::error::{FetchError, InstallError};
use super::platform::{Arch, Platform};
use super::progress::{Progress, ProgressThrottle};

pub type ArtifactReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    GzipTar,
    Zip,
    Raw,
}

/// The release being installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub version: Version,
    pub platform: Platform,
    pub arch: Arch,
}

impl Target {
    pub fn arch_name(&self) -> &'static str {
        self.arch.artifact_name(&self.platform)
    }

    pub fn version_dir(&self) -> String {
        self.version.to_string()
    }
}

/// One way of turning a release artifact into an installed layout.
#[async_trait]
pub trait ArchiveStrategy: Send + Sync {
    fn kind(&self) -> ArchiveKind;

    /// Artifact path below `v{version}/`, which is also its name in the
    /// checksum manifest.
    fn artifact(&self, target: &Target) -> String;

    /// Consumes the artifact and leaves the installed layout in
    /// `dest/{version}`.
    async fn unpack(&self, source: ArtifactReader, target: &Target, dest: &Path)
        -> io::Result<()>;
}

/// Picks the strategy for a platform, and on Windows for a version.
pub fn select_strategy(
    platform: &Platform,
    version: &Version,
) -> Result<Box<dyn ArchiveStrategy>, InstallError> {
    match platform {
        Platform::Windows if has_zip_archive(version) => Ok(Box::new(Zip)),
        Platform::Windows => Ok(Box::new(Raw)),
        Platform::Linux | Platform::Darwin | Platform::Aix | Platform::SunOs => {
            Ok(Box::new(GzipTar))
        }
        Platform::Other(name) => Err(InstallError::UnsupportedPlatform(name.clone())),
    }
}

#[derive(Debug)]
pub enum UnpackError {
    Fetch(FetchError),
    Io(io::Error),
}

/// Fetches the artifact for `target` and unpacks it into `dest`.
///
/// A transport failure takes precedence over whatever error the unpacker
/// reports when the body breaks underneath it. The returned checksum is
/// still pending and must be consulted by the caller.
pub async fn download_runtime(
    strategy: &dyn ArchiveStrategy,
    transport: Arc<dyn Transport>,
    target: &Target,
    dest: &Path,
    cancel: &CancellationToken,
    progress: Option<UnboundedSender<Progress>>,
) -> Result<PendingChecksum, UnpackError> {
    let artifact = strategy.artifact(target);
    let version = target.version_dir();
    debug!("Using {:?} archive {}", strategy.kind(), artifact);

    let fetched = transport
        .fetch(&format!("v{}/{}", version, artifact), cancel)
        .await
        .map_err(UnpackError::Fetch)?;
    let total = fetched.total.unwrap_or(0);

    let (body, pending) =
        checksum::verify(Arc::clone(&transport), &version, &artifact, fetched.body, cancel);

    let throttle = Arc::new(Mutex::new(progress.map(ProgressThrottle::new)));
    let fault: Arc<Mutex<Option<FetchError>>> = Arc::new(Mutex::new(None));

    let body = {
        let throttle = Arc::clone(&throttle);
        let fault = Arc::clone(&fault);
        let mut transferred = 0u64;

        body.map(move |chunk| match chunk {
            Ok(chunk) => {
                transferred += chunk.len() as u64;
                if let Ok(mut throttle) = throttle.lock() {
                    if let Some(throttle) = throttle.as_mut() {
                        throttle.tick(Progress { transferred, total });
                    }
                }
                Ok(chunk)
            }
            Err(err) => {
                if let Ok(mut fault) = fault.lock() {
                    fault.get_or_insert_with(|| err.clone());
                }
                Err(io::Error::new(io::ErrorKind::Other, err))
            }
        })
        .boxed()
    };

    let unpacked = strategy.unpack(StreamReader::new(body), target, dest).await;

    if let Err(err) = unpacked {
        let fault = fault.lock().ok().and_then(|mut fault| fault.take());
        return Err(match fault {
            Some(fetch) => UnpackError::Fetch(fetch),
            None => UnpackError::Io(err),
        });
    }

    if let Ok(mut throttle) = throttle.lock() {
        if let Some(throttle) = throttle.as_mut() {
            throttle.flush();
        }
    }

    Ok(pending)
}

pub(crate) fn join_error(err: JoinError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}
