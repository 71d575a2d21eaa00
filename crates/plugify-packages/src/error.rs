//! Package-manager error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by package-manager entry points.
///
/// Per-package problems (bad descriptors, failed downloads, unsatisfiable
/// dependencies) are not errors at this level: they drop or mark the
/// affected package and are reported through the log and the
/// missed/conflicted sets.
#[derive(Debug, Error)]
pub enum PackageError {
    /// `initialize` was called twice.
    #[error("package manager already initialized")]
    AlreadyInitialized,

    /// The HTTP backend could not be created. This is the one fatal
    /// condition of package-manager initialisation.
    #[error(transparent)]
    Download(#[from] plugify_transport::DownloadError),

    /// A manifest path did not use the `.manifest` extension.
    #[error("package manifest '{0}' must use the *.manifest format")]
    ManifestExtension(PathBuf),

    /// Reading or writing a manifest file failed.
    #[error("failed accessing manifest '{path}': {source}")]
    ManifestIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A manifest file failed to parse.
    #[error("package manifest '{path}' has a JSON parsing error: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
