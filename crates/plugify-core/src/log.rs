//! The injected logging capability.
//!
//! The runtime never writes to a concrete log target itself: everything a
//! plugin or language module reports goes through the [`LogSink`] handed to
//! [`Plugify`](https://docs.rs/plugify) at construction. The default
//! [`TracingSink`] forwards onto the `tracing` ecosystem so host
//! applications keep a single subscriber pipeline.

use serde::{Deserialize, Serialize};

/// Message severity, ordered from most to least severe.
///
/// `Config::log_severity` names the *least* severe level still forwarded;
/// e.g. `Info` forwards `Fatal..=Info` and drops `Debug`/`Verbose`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Logging disabled.
    #[default]
    None,
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Verbose,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Fatal => "Fatal",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
            Severity::Debug => "Debug",
            Severity::Verbose => "Verbose",
        }
    }
}

/// Capability that accepts a message and a severity.
///
/// Implementations must be cheap and non-blocking; they may be called from
/// any thread the downloader or a language module runs callbacks on.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str, severity: Severity);
}

/// Default sink: forwards onto `tracing` under the `plugify` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str, severity: Severity) {
        match severity {
            Severity::None => {}
            Severity::Fatal | Severity::Error => tracing::error!(target: "plugify", "{message}"),
            Severity::Warning => tracing::warn!(target: "plugify", "{message}"),
            Severity::Info => tracing::info!(target: "plugify", "{message}"),
            Severity::Debug => tracing::debug!(target: "plugify", "{message}"),
            Severity::Verbose => tracing::trace!(target: "plugify", "{message}"),
        }
    }
}
