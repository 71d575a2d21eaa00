//! # Plugify
//!
//! A runtime that discovers, validates, orders, loads, and supervises a
//! heterogeneous collection of plugins authored in multiple programming
//! languages.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     ┌──────────────────┐     ┌─────────────────────┐
//! │    Plugify    │────▶│  PackageManager  │────▶│ HttpDownloader/zip  │
//! │  (root object)│     │ (local ⇄ remote) │     │ (plugify-transport) │
//! │               │     └──────────────────┘     └─────────────────────┘
//! │               │     ┌──────────────────┐     ┌─────────────────────┐
//! │               │────▶│  PluginManager   │────▶│ LanguageModule libs │
//! └───────────────┘     │ (order + drive)  │     │ (libloading)        │
//!                       └──────────────────┘     └─────────────────────┘
//!                                 │
//!                                 ▼
//!                       ┌──────────────────┐
//!                       │ JitCallback/Call │  (plugify-jit)
//!                       └──────────────────┘
//! ```
//!
//! - **plugify-core**: descriptors, versions, packages, config, log sink.
//! - **plugify-transport**: async download queue + bundle extraction.
//! - **plugify-packages**: catalogue reconciliation and install/update.
//! - **plugify-jit**: native trampolines for inter-plugin calls.
//! - **plugify-runtime**: the plugin manager, provider facade, and root.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use plugify::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     LoggingBuilder::new().init();
//!
//!     let plugify = Plugify::new(Config::new("/srv/plugify"));
//!     plugify.initialize()?;
//!
//!     loop {
//!         plugify.update(std::time::Duration::from_millis(16));
//!     }
//! }
//! ```

pub use plugify_core as core;
pub use plugify_jit as jit;
pub use plugify_packages as packages;
pub use plugify_runtime as runtime;
pub use plugify_transport as transport;

/// Commonly used types for embedding the runtime.
///
/// ```rust,ignore
/// use plugify::prelude::*;
/// ```
pub mod prelude {
    // Root object and lifecycle.
    pub use plugify_runtime::{Plugify, PlugifyBuilder, RuntimeError};

    // Configuration and logging.
    pub use plugify_core::{Config, LogSink, Severity, TracingSink};
    pub use plugify_runtime::LoggingBuilder;

    // Descriptor and catalogue types.
    pub use plugify_core::{
        LanguageModuleDescriptor, LocalPackage, Manifest, Method, PluginDescriptor, Property,
        RemotePackage, ValueType, Version,
    };

    // Runtime views and the module-author surface.
    pub use plugify_runtime::{
        LanguageModule, LoadResult, MemAddr, MethodData, ModuleHandle, PluginHandle, PluginState,
        Provider,
    };

    // Inter-plugin call materialisation.
    pub use plugify_jit::{JitCall, JitCallback, JitRuntime};
}
