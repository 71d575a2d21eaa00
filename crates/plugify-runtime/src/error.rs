//! Runtime error types.

use thiserror::Error;

/// Errors surfaced by runtime entry points.
///
/// Lifecycle failures of individual modules and plugins are not errors at
/// this level: they transition the affected object to its `Error` state and
/// the rest of the graph continues loading.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `initialize` was called twice.
    #[error("runtime already initialized")]
    AlreadyInitialized,

    /// Package-manager initialisation failed (the one fatal condition).
    #[error(transparent)]
    Package(#[from] plugify_packages::PackageError),
}
