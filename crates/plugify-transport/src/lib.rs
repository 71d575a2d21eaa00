//! # Plugify Transport
//!
//! The two I/O workers behind the package manager:
//!
//! - [`HttpDownloader`]: an asynchronous GET queue with completion
//!   callbacks and a wait-for-all barrier. The default backend rides
//!   `reqwest` on a private tokio runtime; any other implementation can be
//!   injected through the [`HttpBackend`] trait (tests use an in-memory
//!   one).
//! - [`extract`]: validates and unpacks a zip-format package bundle into a
//!   staging directory.
//!
//! Everything else in the workspace stays synchronous; this crate is the
//! only place worker threads exist.

pub mod downloader;
pub mod extractor;

pub use downloader::{
    DownloadError, FetchResponse, HttpBackend, HttpDownloader, ReqwestBackend, HTTP_STATUS_ERROR,
    HTTP_STATUS_OK,
};
pub use extractor::{extract, ExtractError};
