//! # Plugify Packages
//!
//! The package/dependency subsystem: reconciles plugin and language-module
//! bundles installed on disk with one or more remote manifests, computes
//! which packages are missing and which local plugins cannot be satisfied,
//! and performs install / update / uninstall / snapshot operations.
//!
//! The [`PackageManager`] is synchronous; downloads run through
//! `plugify_transport::HttpDownloader` and every mutating operation passes
//! through a request barrier that waits for all transfers and then re-runs
//! the local → remote → dependency reconciliation.

pub mod error;
pub mod manager;
pub mod verify;

pub use error::PackageError;
pub use manager::PackageManager;
pub use verify::VerifiedPackages;
