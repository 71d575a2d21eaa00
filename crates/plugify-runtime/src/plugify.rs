//! The root runtime object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use plugify_core::{Config, LogSink, Severity, TracingSink};
use plugify_packages::PackageManager;
use plugify_transport::HttpDownloader;
use tracing::info;

use crate::error::RuntimeError;
use crate::loader::{LibraryLoader, ModuleLoader};
use crate::manager::PluginManager;
use crate::provider::Provider;

/// The Plugify runtime: configuration, log sink, package manager, and
/// plugin manager under one root.
///
/// ```rust,ignore
/// use plugify_runtime::Plugify;
/// use plugify_core::Config;
///
/// let plugify = Plugify::new(Config::new("/srv/plugify"));
/// plugify.initialize()?;
/// loop {
///     plugify.update(frame_time);
/// }
/// ```
pub struct Plugify {
    config: Arc<Config>,
    provider: Arc<Provider>,
    package_manager: Mutex<PackageManager>,
    plugin_manager: Arc<PluginManager>,
    inited: AtomicBool,
}

impl Plugify {
    /// Creates a runtime with the default sink, loader, and downloader.
    pub fn new(config: Config) -> Self {
        PlugifyBuilder::new(config).build()
    }

    /// Starts a builder for injecting a custom sink, module loader, or
    /// downloader.
    pub fn builder(config: Config) -> PlugifyBuilder {
        PlugifyBuilder::new(config)
    }

    /// Resolves the package catalogue, then discovers, orders, loads, and
    /// starts modules and plugins.
    pub fn initialize(&self) -> Result<(), RuntimeError> {
        if self.inited.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyInitialized);
        }
        info!(
            version = env!("CARGO_PKG_VERSION"),
            base_dir = %self.config.base_dir.display(),
            "Plugify initializing"
        );

        let locals = {
            let mut package_manager = self.package_manager.lock();
            if let Err(e) = package_manager.initialize() {
                self.inited.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
            package_manager.local_packages().to_vec()
        };

        if let Err(e) = self
            .plugin_manager
            .initialize(&locals, Arc::clone(&self.provider))
        {
            self.inited.store(false, Ordering::SeqCst);
            return Err(e);
        }

        info!("Plugify initialized");
        Ok(())
    }

    /// Ticks every running plugin in dependency order.
    pub fn update(&self, dt: Duration) {
        self.plugin_manager.update(dt);
    }

    /// Ends plugins and unloads modules in reverse order, then releases
    /// the package catalogue.
    pub fn terminate(&self) {
        if !self.inited.swap(false, Ordering::SeqCst) {
            return;
        }
        self.plugin_manager.terminate();
        self.package_manager.lock().terminate();
        info!("Plugify terminated");
    }

    pub fn is_initialized(&self) -> bool {
        self.inited.load(Ordering::SeqCst)
    }

    /// Forwards a message through the provider's severity gate to the
    /// configured sink.
    pub fn log(&self, message: &str, severity: Severity) {
        self.provider.log(message, severity);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn plugin_manager(&self) -> &Arc<PluginManager> {
        &self.plugin_manager
    }

    pub fn package_manager(&self) -> MutexGuard<'_, PackageManager> {
        self.package_manager.lock()
    }
}

impl Drop for Plugify {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Builder wiring custom collaborators into a [`Plugify`] runtime.
pub struct PlugifyBuilder {
    config: Config,
    sink: Option<Arc<dyn LogSink>>,
    loader: Option<Box<dyn ModuleLoader>>,
    downloader: Option<HttpDownloader>,
}

impl PlugifyBuilder {
    pub fn new(config: Config) -> Self {
        PlugifyBuilder {
            config,
            sink: None,
            loader: None,
            downloader: None,
        }
    }

    /// Injects the logging sink plugin messages are forwarded to.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Injects the module loader (tests use an in-process one).
    pub fn loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Injects the HTTP downloader (tests use an in-memory backend).
    pub fn downloader(mut self, downloader: HttpDownloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn build(self) -> Plugify {
        let config = Arc::new(self.config);
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let loader = self.loader.unwrap_or_else(|| Box::new(LibraryLoader));

        let plugin_manager = Arc::new(PluginManager::new(Arc::clone(&config), loader));
        let provider = Arc::new(Provider::new(
            Arc::downgrade(&plugin_manager),
            &config,
            sink,
        ));
        let package_manager = match self.downloader {
            Some(downloader) => PackageManager::with_downloader(Arc::clone(&config), downloader),
            None => PackageManager::new(Arc::clone(&config)),
        };

        Plugify {
            config,
            provider,
            package_manager: Mutex::new(package_manager),
            plugin_manager,
            inited: AtomicBool::new(false),
        }
    }
}
