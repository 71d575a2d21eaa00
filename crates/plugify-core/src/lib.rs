//! # Plugify Core
//!
//! The foundational data model for the Plugify runtime.
//!
//! This crate defines everything the higher layers agree on but that is not
//! tied to any particular subsystem:
//!
//! - **Descriptors**: typed representations of the `.plugin` and `.module`
//!   JSON documents, including method signatures and dependency references.
//! - **Packages**: the local/remote package catalogue types and the
//!   `.manifest` wire format.
//! - **Versions & platforms**: integer version ordering and host platform
//!   applicability checks.
//! - **Logging**: the [`Severity`] scale and the injected [`LogSink`]
//!   capability the runtime forwards plugin messages through.
//! - **Configuration**: the [`Config`] structure consumed by the package
//!   and plugin managers.
//!
//! Subsystem crates (`plugify-transport`, `plugify-packages`, `plugify-jit`,
//! `plugify-runtime`) build on these types; the `plugify` facade re-exports
//! the public surface.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod log;
pub mod method;
pub mod package;
pub mod platform;
pub mod version;

pub use config::Config;
pub use descriptor::{
    remove_duplicates, LanguageModuleDescriptor, LanguageModuleInfo, PluginDescriptor,
    PluginReference,
};
pub use error::DescriptorError;
pub use log::{LogSink, Severity, TracingSink};
pub use method::{Method, Property, ValueType};
pub use package::{
    LocalPackage, Manifest, PackageDescriptor, PackageVersion, RemotePackage, MANIFEST_EXTENSION,
    MODULE_EXTENSION, PLUGIN_EXTENSION, PLUGIN_TYPE,
};
pub use platform::{host_platform, is_platform_supported};
pub use version::Version;
