//! Runtime configuration.
//!
//! Parsing a configuration *file* is a front-end concern; this structure is
//! what every front-end must produce. It deserialises from the same JSON
//! shape the reference `plugify.pconfig` uses.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::log::Severity;

/// Settings consumed by the package and plugin managers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Root of the installation; everything lives beneath it.
    pub base_dir: PathBuf,
    /// Manifest URLs fetched on every reconciliation.
    #[serde(default)]
    pub repositories: BTreeSet<String>,
    /// Least severe level still forwarded to the log sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_severity: Option<Severity>,
    /// Bind a module library's own symbols first (isolate) instead of
    /// host-global (share).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_own_symbols: Option<bool>,
}

impl Config {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Config {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }
}
