//! Logging initialisation over `tracing-subscriber`.
//!
//! The runtime itself only emits `tracing` events; this module is the
//! convenience layer a host embeds to get formatted output.
//!
//! ```rust,ignore
//! use plugify_runtime::LoggingBuilder;
//! use plugify_core::Severity;
//!
//! LoggingBuilder::new()
//!     .severity(Severity::Debug)
//!     .directive("plugify_packages=trace")
//!     .init();
//! ```

use plugify_core::Severity;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// Builder for the global tracing subscriber.
#[derive(Default)]
pub struct LoggingBuilder {
    severity: Option<Severity>,
    directives: Vec<String>,
    format: LogFormat,
    with_target: bool,
    with_thread_ids: bool,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        LoggingBuilder {
            with_target: true,
            ..Default::default()
        }
    }

    /// Sets the base severity; maps onto a tracing level filter.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Adds a filter directive, e.g. `"plugify_runtime=debug"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        // RUST_LOG wins over the configured base severity.
        let base = severity_directive(self.severity.unwrap_or(Severity::Info));
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base));
        for directive in &self.directives {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
        filter
    }

    /// Installs the subscriber; does nothing if one is already set.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber, reporting a failure to do so.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        match self.format {
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .compact()
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids);
                tracing_subscriber::registry().with(layer).with(filter).try_init()
            }
            LogFormat::Full => {
                let layer = fmt::layer()
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids);
                tracing_subscriber::registry().with(layer).with(filter).try_init()
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids);
                tracing_subscriber::registry().with(layer).with(filter).try_init()
            }
        }
    }
}

/// The `tracing` filter directive equivalent to a [`Severity`].
fn severity_directive(severity: Severity) -> &'static str {
    match severity {
        Severity::None => "off",
        Severity::Fatal | Severity::Error => "error",
        Severity::Warning => "warn",
        Severity::Info => "info",
        Severity::Debug => "debug",
        Severity::Verbose => "trace",
    }
}
