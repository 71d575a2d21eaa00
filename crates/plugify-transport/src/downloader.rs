//! Asynchronous HTTP download queue.
//!
//! [`HttpDownloader`] accepts GET requests with completion callbacks and
//! guarantees each callback fires exactly once — on success, on an HTTP
//! error status, or on a transport failure (reported as
//! [`HTTP_STATUS_ERROR`]). Requests run concurrently with no ordering
//! between them; [`HttpDownloader::wait_for_all_requests`] blocks the
//! calling thread until every outstanding callback has returned.
//!
//! Callbacks run on downloader worker threads and may enqueue further
//! requests. They must not call `wait_for_all_requests` themselves.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Sentinel status for transport-level failures (DNS, connect, timeout,
/// truncated body). Distinct from every valid HTTP status code.
pub const HTTP_STATUS_ERROR: i32 = -1;

/// Plain HTTP 200.
pub const HTTP_STATUS_OK: i32 = 200;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("plugify/", env!("CARGO_PKG_VERSION"));

/// Errors creating the downloader. Failure here is the one process-fatal
/// condition of package-manager initialisation.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to create HTTP backend: {0}")]
    Backend(String),

    #[error("failed to start downloader runtime: {0}")]
    Runtime(String),
}

/// The result of one fetch, as delivered to completion callbacks.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// HTTP status, or [`HTTP_STATUS_ERROR`] for transport failures.
    pub status: i32,
    /// Value of the `Content-Type` header, or empty.
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Pluggable fetch implementation.
///
/// A backend performs one GET and never fails at the type level: transport
/// errors are folded into a [`FetchResponse`] carrying
/// [`HTTP_STATUS_ERROR`], so the exactly-once callback contract holds on
/// every path.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResponse;
}

// =============================================================================
// Default backend (reqwest)
// =============================================================================

/// The default backend: `reqwest` with a per-request timeout.
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DownloadError::Backend(e.to_string()))?;
        Ok(ReqwestBackend { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn fetch(&self, url: &str) -> FetchResponse {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Transport error");
                return FetchResponse {
                    status: HTTP_STATUS_ERROR,
                    ..Default::default()
                };
            }
        };

        let status = i32::from(response.status().as_u16());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();

        match response.bytes().await {
            Ok(body) => FetchResponse {
                status,
                content_type,
                body: body.to_vec(),
            },
            Err(e) => {
                warn!(url = %url, error = %e, "Failed reading response body");
                FetchResponse {
                    status: HTTP_STATUS_ERROR,
                    ..Default::default()
                }
            }
        }
    }
}

// =============================================================================
// Downloader
// =============================================================================

struct Inflight {
    count: Mutex<usize>,
    done: Condvar,
}

/// Decrements the in-flight counter when the request task finishes, whatever
/// the callback did.
struct InflightGuard(Arc<Inflight>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(|e| e.into_inner());
        *count -= 1;
        if *count == 0 {
            self.0.done.notify_all();
        }
    }
}

/// The download queue. See the [module docs](self) for the contract.
pub struct HttpDownloader {
    backend: Arc<dyn HttpBackend>,
    runtime: tokio::runtime::Runtime,
    inflight: Arc<Inflight>,
}

impl HttpDownloader {
    /// Creates a downloader over the default `reqwest` backend.
    pub fn create() -> Result<Self, DownloadError> {
        let backend = ReqwestBackend::new(DEFAULT_TIMEOUT)?;
        Self::with_backend(Arc::new(backend))
    }

    /// Creates a downloader over a caller-supplied backend.
    pub fn with_backend(backend: Arc<dyn HttpBackend>) -> Result<Self, DownloadError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("plugify-http")
            .enable_all()
            .build()
            .map_err(|e| DownloadError::Runtime(e.to_string()))?;

        Ok(HttpDownloader {
            backend,
            runtime,
            inflight: Arc::new(Inflight {
                count: Mutex::new(0),
                done: Condvar::new(),
            }),
        })
    }

    /// Enqueues a GET. The callback fires exactly once, on an arbitrary
    /// worker thread, with `(status, content_type, body)`.
    pub fn create_request<F>(&self, url: impl Into<String>, on_complete: F)
    where
        F: FnOnce(i32, &str, &[u8]) + Send + 'static,
    {
        let url = url.into();
        debug!(url = %url, "Enqueueing download");

        {
            let mut count = self
                .inflight
                .count
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *count += 1;
        }

        let backend = Arc::clone(&self.backend);
        let guard = InflightGuard(Arc::clone(&self.inflight));
        self.runtime.spawn(async move {
            let _guard = guard;
            let response = backend.fetch(&url).await;
            debug!(url = %url, status = response.status, bytes = response.body.len(), "Download complete");
            on_complete(response.status, &response.content_type, &response.body);
        });
    }

    /// Blocks until every outstanding request's callback has returned.
    ///
    /// Requests enqueued by callbacks while this waits are covered too.
    pub fn wait_for_all_requests(&self) {
        let mut count = self
            .inflight
            .count
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = self
                .inflight
                .done
                .wait(count)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}
