use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::FetchError;
use super::index::INDEX_TIMEOUT;
use super::mirror::resolve_mirror;

pub type ByteStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// A response whose body has not been consumed yet.
pub struct Fetched {
    pub url: String,
    pub total: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for Fetched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetched")
            .field("url", &self.url)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Separate budgets for receiving the response headers and for the whole
/// transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub response: Option<Duration>,
    pub request: Option<Duration>,
}

/// Budget for the mirror to start answering an artifact request.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

impl Timeouts {
    /// Artifacts can be large, so only the wait for headers is bounded.
    pub fn artifact() -> Self {
        Self {
            response: Some(RESPONSE_TIMEOUT),
            request: None,
        }
    }

    pub fn index() -> Self {
        Self {
            response: None,
            request: Some(INDEX_TIMEOUT),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub enabled: bool,
    pub ip: String,
    pub port: String,
}

impl Proxy {
    fn url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub mirror: Option<String>,
    pub proxy: Option<Proxy>,
    pub timeouts: Timeouts,
}

/// Single I/O primitive of the acquisition path: a streaming GET of a path
/// relative to the release mirror.
#[async_trait]
pub trait Transport: Send + Sync {
    fn mirror(&self) -> &str;

    async fn fetch(&self, path: &str, cancel: &CancellationToken) -> Result<Fetched, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    mirror: String,
    timeouts: Timeouts,
}

impl HttpTransport {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let mirror = resolve_mirror(options.mirror.as_deref());

        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

        if let Some(proxy) = options.proxy.as_ref().filter(|p| p.enabled) {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| FetchError::InvalidUrl(format!("proxy {}: {}", proxy.url(), e)))?;
            builder = builder.no_proxy().proxy(proxy);
        }

        if let Some(request) = options.timeouts.request {
            builder = builder.timeout(request);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            mirror,
            timeouts: options.timeouts,
        })
    }
}

impl HttpTransport {
    async fn send(&self, url: &Url) -> Result<reqwest::Response, FetchError> {
        let send = self.client.get(url.clone()).send();
        let sent = match self.timeouts.response {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| FetchError::Timeout { url: url.to_string() })?,
            None => send.await,
        };
        sent.map_err(|e| FetchError::from_reqwest(e, &self.mirror, url.as_str()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn mirror(&self) -> &str {
        &self.mirror
    }

    async fn fetch(&self, path: &str, cancel: &CancellationToken) -> Result<Fetched, FetchError> {
        let url = join_url(&self.mirror, path)?;
        debug!("GET {}", url);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.send(&url) => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url.as_str(), status.as_u16()));
        }

        let total = response.content_length();
        let mirror = self.mirror.clone();
        let error_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| FetchError::from_reqwest(e, &mirror, &error_url)));

        Ok(Fetched {
            url: url.to_string(),
            total,
            body: cancellable(body, cancel.clone()),
        })
    }
}

/// Joins a mirror-relative path onto the mirror.
///
/// A leading slash on `path` is dropped so it cannot replace the mirror's
/// own path component.
pub fn join_url(mirror: &str, path: &str) -> Result<Url, FetchError> {
    let joined = format!(
        "{}/{}",
        mirror.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", joined, e)))
}

/// Makes a body stream fail with [`FetchError::Cancelled`] as soon as the
/// token fires, even while it is waiting for the next chunk.
pub fn cancellable<S>(body: S, cancel: CancellationToken) -> ByteStream
where
    S: Stream<Item = Result<Bytes, FetchError>> + Send + 'static,
{
    let body = Box::pin(body);
    stream::unfold(Some((body, cancel)), |state| async move {
        let (mut body, cancel) = state?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(FetchError::Cancelled), None)),
            item = body.next() => item.map(|item| (item, Some((body, cancel)))),
        }
    })
    .boxed()
}

/// Reads a whole body into memory.
pub async fn collect_body(mut body: ByteStream) -> Result<Vec<u8>, FetchError> {
    let mut content = Vec::new();
    while let Some(chunk) = body.next().await {
        content.extend_from_slice(&chunk?);
    }
    Ok(content)
}
