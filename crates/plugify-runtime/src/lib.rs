//! # Plugify Runtime
//!
//! The plugin manager and everything it drives:
//!
//! - Runtime [`Module`] and [`Plugin`] objects with their state machines.
//! - The [`LanguageModule`] interface every module library implements, plus
//!   the [`ModuleLoader`] seam that resolves it from a native library (or
//!   from an in-process fake in tests).
//! - [`PluginManager`]: discovery over the package manager's local set,
//!   dependency-ordered loading, the update tick, and reverse-order
//!   termination.
//! - The [`Provider`] capability facade handed to each language module.
//! - [`Plugify`]: the root object tying configuration, the package manager,
//!   and the plugin manager together.
//! - [`logging`]: `tracing-subscriber` initialisation helpers.
//!
//! [`Module`]: module::Module
//! [`Plugin`]: plugin::Plugin

pub mod error;
pub mod language_module;
pub mod loader;
pub mod logging;
pub mod manager;
pub mod module;
pub mod plugify;
pub mod plugin;
pub mod provider;

pub use error::RuntimeError;
pub use language_module::{LanguageModule, LoadResult, MemAddr, MethodData, UniqueId};
pub use loader::{LibraryLoader, LoadedModule, ModuleLoader, MODULE_ENTRY_SYMBOL};
pub use logging::LoggingBuilder;
pub use manager::PluginManager;
pub use module::{ModuleHandle, ModuleState};
pub use plugify::{Plugify, PlugifyBuilder};
pub use plugin::{PluginHandle, PluginState};
pub use provider::Provider;
