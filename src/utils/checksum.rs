//! SHA-256 verification of release artifacts against `SHASUMS256.txt`.
//!
//! The digest is computed while the artifact streams to its consumer, and
//! the manifest is fetched concurrently. The outcome is only looked at once
//! the artifact has been unpacked, so a network or platform error raised
//! during the transfer is always the one the user sees.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::download::{collect_body, ByteStream, Transport};
use super::error::FetchError;

pub const MANIFEST_NAME: &str = "SHASUMS256.txt";

/// Parses `<hex-digest>  <filename>` lines into `(digest, filename)` pairs.
pub fn parse_manifest(manifest: &str) -> Vec<(String, String)> {
    manifest
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let digest = parts.next()?;
            let filename = parts.next()?;
            Some((digest.to_ascii_lowercase(), filename.to_string()))
        })
        .collect()
}

pub fn expected_digest(manifest: &str, filename: &str) -> Option<String> {
    parse_manifest(manifest)
        .into_iter()
        .find(|(_, name)| name == filename)
        .map(|(digest, _)| digest)
}

/// Passes chunks through unchanged while hashing them.
///
/// The digest is delivered once the inner stream ends cleanly; if the stream
/// fails or is dropped early nothing is delivered.
struct HashingStream {
    inner: ByteStream,
    hasher: Sha256,
    digest: Option<oneshot::Sender<String>>,
}

impl Stream for HashingStream {
    type Item = Result<Bytes, FetchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = this.inner.as_mut().poll_next(cx);

        match &polled {
            Poll::Ready(Some(Ok(chunk))) => this.hasher.update(chunk),
            Poll::Ready(None) => {
                if let Some(sender) = this.digest.take() {
                    let digest = std::mem::take(&mut this.hasher).finalize();
                    let _ = sender.send(format!("{:x}", digest));
                }
            }
            _ => {}
        }

        polled
    }
}

/// Verification running in the background of a download.
pub struct PendingChecksum {
    task: Option<JoinHandle<Option<String>>>,
}

impl PendingChecksum {
    /// `None` when the digests match, otherwise a message describing why
    /// verification failed. Never fails itself.
    pub async fn outcome(mut self) -> Option<String> {
        let task = self.task.take()?;
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Some(format!("Checksum verification did not complete: {}", err)),
        }
    }
}

impl Drop for PendingChecksum {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Starts verifying `filename` of `version`.
///
/// Returns the artifact body to consume in place of `body`, and the pending
/// verification.
pub fn verify(
    transport: Arc<dyn Transport>,
    version: &str,
    filename: &str,
    body: ByteStream,
    cancel: &CancellationToken,
) -> (ByteStream, PendingChecksum) {
    let (sender, receiver) = oneshot::channel();
    let tapped = HashingStream {
        inner: body,
        hasher: Sha256::new(),
        digest: Some(sender),
    };

    let version = version.to_string();
    let filename = filename.to_string();
    let cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let (expected, actual) = tokio::join!(
            fetch_expected(transport.as_ref(), &version, &filename, &cancel),
            receiver
        );

        let expected = match expected {
            Ok(Some(expected)) => expected,
            Ok(None) => {
                return Some(format!(
                    "Could not download Node.js {} checksum: {} has no entry for {}",
                    version, MANIFEST_NAME, filename
                ))
            }
            Err(err) => {
                return Some(format!(
                    "Could not download Node.js {} checksum: {}",
                    version, err
                ))
            }
        };

        let Ok(actual) = actual else {
            return Some(format!(
                "Could not download Node.js {}: the download ended before it could be verified",
                version
            ));
        };

        if actual != expected {
            debug!("Checksum mismatch for {}: expected {}, got {}", filename, expected, actual);
            return Some(format!(
                "Could not download Node.js {}: checksum did not match",
                version
            ));
        }

        debug!("Checksum verified for {}", filename);
        None
    });

    let tapped: ByteStream = Box::pin(tapped);
    (tapped, PendingChecksum { task: Some(task) })
}

async fn fetch_expected(
    transport: &dyn Transport,
    version: &str,
    filename: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>, FetchError> {
    let response = transport
        .fetch(&format!("v{}/{}", version, MANIFEST_NAME), cancel)
        .await?;
    let manifest = collect_body(response.body).await?;
    Ok(expected_digest(&String::from_utf8_lossy(&manifest), filename))
}
