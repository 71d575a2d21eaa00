//! Plugin lifecycle management.
//!
//! [`PluginManager`] owns every runtime [`Module`] and [`Plugin`]. It:
//!
//! - Discovers both from the package manager's resolved local set, assigning
//!   process-unique ids in discovery order.
//! - Loads every required language module before any plugin, initialising
//!   each through the [`Provider`] capability facade.
//! - Orders plugins with a stable depth-first topological sort; every
//!   participant of a dependency cycle is marked `Error` ("cyclic
//!   dependency") and the rest of the graph proceeds.
//! - Drives the plugin lifecycle (`load → start → update → end`) in
//!   dependency order, failing transitive dependants of a broken plugin
//!   with "dependency failed".
//! - Tears everything down in reverse order on [`terminate`].
//!
//! Lifecycle calls receive [`PluginHandle`] snapshots and run with no
//! registry lock held, so a language module may re-enter the provider from
//! inside any of them.
//!
//! [`Module`]: crate::module::Module
//! [`Plugin`]: crate::plugin::Plugin
//! [`terminate`]: PluginManager::terminate

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use plugify_core::{Config, LocalPackage, PackageDescriptor, PluginDescriptor, PluginReference};
use tracing::{debug, error, info};

use crate::error::RuntimeError;
use crate::language_module::{LoadResult, MemAddr, MethodData, UniqueId};
use crate::loader::{LoadedModule, ModuleLoader};
use crate::module::{Module, ModuleHandle, ModuleState};
use crate::plugin::{Plugin, PluginHandle, PluginState};
use crate::provider::Provider;

#[derive(Default)]
struct Registry {
    modules: Vec<Module>,
    plugins: Vec<Plugin>,
    /// Plugin indices in load order (dependencies first).
    load_order: Vec<usize>,
}

/// Central owner of runtime modules and plugins. See the
/// [module docs](self) for the lifecycle contract.
pub struct PluginManager {
    config: Arc<Config>,
    loader: Box<dyn ModuleLoader>,
    registry: RwLock<Registry>,
    inited: AtomicBool,
}

impl PluginManager {
    pub fn new(config: Arc<Config>, loader: Box<dyn ModuleLoader>) -> Self {
        PluginManager {
            config,
            loader,
            registry: RwLock::new(Registry::default()),
            inited: AtomicBool::new(false),
        }
    }

    /// Discovers `packages`, loads required language modules, then loads
    /// and starts every available plugin in dependency order.
    pub fn initialize(
        &self,
        packages: &[LocalPackage],
        provider: Arc<Provider>,
    ) -> Result<(), RuntimeError> {
        if self.inited.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyInitialized);
        }

        self.discover_all_modules_and_plugins(packages);
        self.load_required_language_modules(&provider);
        self.load_and_start_available_plugins();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inited.load(Ordering::SeqCst)
    }

    // ─── Discovery ───────────────────────────────────────────────────────────

    fn discover_all_modules_and_plugins(&self, packages: &[LocalPackage]) {
        let mut registry = self.registry.write();
        let mut next_id: UniqueId = 0;

        for package in packages {
            match &package.descriptor {
                PackageDescriptor::Module(descriptor) => {
                    registry
                        .modules
                        .push(Module::new(next_id, package, Arc::clone(descriptor)));
                }
                PackageDescriptor::Plugin(descriptor) => {
                    registry.plugins.push(Plugin::new(
                        next_id,
                        package,
                        Arc::clone(descriptor),
                        self.config.base_dir.clone(),
                    ));
                }
            }
            next_id += 1;
        }

        // Resolve the plugin → module back-references once, in discovery
        // order; a plugin without its module fails immediately.
        for plugin_index in 0..registry.plugins.len() {
            let language = registry.plugins[plugin_index]
                .descriptor
                .language_module
                .name
                .clone();
            match registry.modules.iter().position(|m| m.language == language) {
                Some(module_index) => {
                    registry.plugins[plugin_index].module = Some(module_index);
                    let id = registry.plugins[plugin_index].id;
                    registry.modules[module_index].loaded_plugins.push(id);
                }
                None => {
                    let plugin = &mut registry.plugins[plugin_index];
                    error!(
                        plugin = %plugin.name,
                        language = %language,
                        "Plugin requires a language module that is not installed"
                    );
                    plugin.set_error(format!("language module '{language}' is missing"));
                }
            }
        }

        debug!(
            modules = registry.modules.len(),
            plugins = registry.plugins.len(),
            "Discovery complete"
        );
    }

    // ─── Module loading ──────────────────────────────────────────────────────

    fn load_required_language_modules(&self, provider: &Arc<Provider>) {
        let prefer_own = self.config.prefer_own_symbols.unwrap_or(false);

        let targets: Vec<usize> = {
            let registry = self.registry.read();
            let required: HashSet<usize> = registry
                .plugins
                .iter()
                .filter(|p| p.state != PluginState::Error)
                .filter_map(|p| p.module)
                .collect();
            registry
                .modules
                .iter()
                .enumerate()
                .filter(|(index, module)| {
                    required.contains(index) || module.descriptor.force_load
                })
                .map(|(index, _)| index)
                .collect()
        };

        for index in targets {
            let (descriptor, file_path, name) = {
                let registry = self.registry.read();
                let module = &registry.modules[index];
                (
                    Arc::clone(&module.descriptor),
                    module.file_path.clone(),
                    module.name.clone(),
                )
            };

            match self.loader.load(&descriptor, &file_path, prefer_own) {
                Ok(mut loaded) => match loaded.iface.initialize(Arc::clone(provider)) {
                    Ok(()) => {
                        let mut registry = self.registry.write();
                        let module = &mut registry.modules[index];
                        module.loaded = Some(loaded);
                        module.state = ModuleState::Loaded;
                        info!(
                            module = %name,
                            language = %descriptor.language,
                            "Language module loaded"
                        );
                    }
                    Err(message) => {
                        error!(module = %name, error = %message, "Language module failed to initialize");
                        self.registry.write().modules[index].set_error(message);
                    }
                },
                Err(message) => {
                    error!(module = %name, error = %message, "Failed loading language module library");
                    self.registry.write().modules[index].set_error(message);
                }
            }
        }
    }

    // ─── Plugin loading ──────────────────────────────────────────────────────

    fn load_and_start_available_plugins(&self) {
        let (order, cyclic) = {
            let registry = self.registry.read();
            sort_by_dependencies(&registry.plugins)
        };
        {
            let mut registry = self.registry.write();
            for &index in &cyclic {
                let plugin = &mut registry.plugins[index];
                error!(plugin = %plugin.name, "Cyclic dependency detected");
                plugin.set_error("cyclic dependency".into());
            }
            registry.load_order = order.clone();
        }

        for index in order {
            match self.plan_load(index) {
                Action::Skip => {}
                Action::Fail(message) => {
                    let mut registry = self.registry.write();
                    let plugin = &mut registry.plugins[index];
                    error!(plugin = %plugin.name, error = %message, "Plugin cannot be loaded");
                    plugin.set_error(message);
                }
                Action::Load(module_index, handle) => {
                    self.load_and_start_one(index, module_index, handle);
                }
            }
        }
    }

    /// Decides what to do with one plugin before touching its module:
    /// already-failed plugins are skipped, plugins with a broken module or
    /// broken dependencies fail, the rest proceed to load.
    fn plan_load(&self, index: usize) -> Action {
        let registry = self.registry.read();
        let plugin = &registry.plugins[index];
        if plugin.state != PluginState::NotLoaded {
            return Action::Skip;
        }
        let Some(module_index) = plugin.module else {
            return Action::Skip;
        };

        let module = &registry.modules[module_index];
        if module.state != ModuleState::Loaded {
            return Action::Fail(format!(
                "language module '{}' is not loaded",
                module.language
            ));
        }

        for dependency in plugin
            .descriptor
            .dependencies
            .iter()
            .filter(|d| d.is_relevant())
        {
            match registry.plugins.iter().find(|p| p.name == dependency.name) {
                Some(dep) if matches!(dep.state, PluginState::Loaded | PluginState::Running) => {}
                Some(dep) => return Action::Fail(format!("dependency failed: {}", dep.name)),
                None => return Action::Fail(format!("missing dependency: {}", dependency.name)),
            }
        }

        Action::Load(module_index, plugin.handle())
    }

    fn load_and_start_one(&self, index: usize, module_index: usize, handle: PluginHandle) {
        let taken = self.registry.write().modules[module_index].loaded.take();
        let Some(mut loaded) = taken else {
            self.registry.write().plugins[index]
                .set_error("language module interface unavailable".into());
            return;
        };

        match loaded.iface.on_plugin_load(&handle) {
            LoadResult::Failure(message) => {
                error!(plugin = %handle.name, error = %message, "Language module failed loading plugin");
                self.fail_plugin(index, module_index, loaded, message);
            }
            LoadResult::Success { exports, imports } => {
                let methods = match bind_methods(&handle.descriptor, exports) {
                    Ok(methods) => methods,
                    Err(message) => {
                        error!(plugin = %handle.name, error = %message, "Export set does not match the descriptor");
                        self.fail_plugin(index, module_index, loaded, message);
                        return;
                    }
                };
                if let Err(message) = self.check_imports(&imports) {
                    error!(plugin = %handle.name, error = %message, "Unsatisfiable imports");
                    self.fail_plugin(index, module_index, loaded, message);
                    return;
                }

                let start_handle = {
                    let mut registry = self.registry.write();
                    let plugin = &mut registry.plugins[index];
                    plugin.methods = methods;
                    plugin.state = PluginState::Loaded;
                    info!(plugin = %plugin.name, "Plugin loaded");
                    plugin.handle()
                };

                loaded.iface.on_plugin_start(&start_handle);

                let mut registry = self.registry.write();
                registry.plugins[index].state = PluginState::Running;
                registry.modules[module_index].loaded = Some(loaded);
                info!(plugin = %start_handle.name, "Plugin running");
            }
        }
    }

    fn fail_plugin(
        &self,
        index: usize,
        module_index: usize,
        loaded: LoadedModule,
        message: String,
    ) {
        let mut registry = self.registry.write();
        registry.modules[module_index].loaded = Some(loaded);
        registry.plugins[index].set_error(message);
    }

    /// Every imported method must be exported by an already-loaded plugin.
    fn check_imports(&self, imports: &[MethodData]) -> Result<(), String> {
        let registry = self.registry.read();
        for import in imports {
            let satisfied = registry.plugins.iter().any(|p| {
                matches!(p.state, PluginState::Loaded | PluginState::Running)
                    && p.methods.iter().any(|m| m.method.name == import.method.name)
            });
            if !satisfied {
                return Err(format!(
                    "imported method '{}' is not exported by any loaded plugin",
                    import.method.name
                ));
            }
        }
        Ok(())
    }

    // ─── Update tick ─────────────────────────────────────────────────────────

    /// Ticks every running plugin in dependency order.
    pub fn update(&self, dt: Duration) {
        if !self.is_initialized() {
            return;
        }
        let order = self.registry.read().load_order.clone();
        for index in order {
            let target = {
                let registry = self.registry.read();
                let plugin = &registry.plugins[index];
                if plugin.state == PluginState::Running {
                    plugin.module.map(|m| (m, plugin.handle()))
                } else {
                    None
                }
            };
            let Some((module_index, handle)) = target else {
                continue;
            };
            let taken = self.registry.write().modules[module_index].loaded.take();
            let Some(mut loaded) = taken else {
                continue;
            };
            loaded.iface.on_plugin_update(&handle, dt);
            self.registry.write().modules[module_index].loaded = Some(loaded);
        }
    }

    // ─── Termination ─────────────────────────────────────────────────────────

    /// Ends every running plugin in reverse dependency order, then shuts
    /// down and unloads modules in reverse discovery order.
    pub fn terminate(&self) {
        if !self.inited.swap(false, Ordering::SeqCst) {
            return;
        }

        let reverse_order: Vec<usize> = {
            let registry = self.registry.read();
            registry.load_order.iter().rev().copied().collect()
        };
        for index in reverse_order {
            let target = {
                let mut registry = self.registry.write();
                let plugin = &mut registry.plugins[index];
                match plugin.state {
                    PluginState::Running => {
                        plugin.state = PluginState::Terminating;
                        plugin.module.map(|m| (m, plugin.handle()))
                    }
                    PluginState::Loaded => {
                        plugin.state = PluginState::NotLoaded;
                        None
                    }
                    _ => None,
                }
            };
            if let Some((module_index, handle)) = target {
                let taken = self.registry.write().modules[module_index].loaded.take();
                if let Some(mut loaded) = taken {
                    loaded.iface.on_plugin_end(&handle);
                    self.registry.write().modules[module_index].loaded = Some(loaded);
                }
                let mut registry = self.registry.write();
                registry.plugins[index].state = PluginState::NotLoaded;
                debug!(plugin = %handle.name, "Plugin unloaded");
            }
        }

        let module_count = self.registry.read().modules.len();
        for index in (0..module_count).rev() {
            let taken = self.registry.write().modules[index].loaded.take();
            if let Some(mut loaded) = taken {
                loaded.iface.shutdown();
                // The interface drops before the library that backs it.
                drop(loaded);
            }
            let mut registry = self.registry.write();
            let module = &mut registry.modules[index];
            if module.state == ModuleState::Loaded {
                debug!(module = %module.name, "Language module unloaded");
            }
            module.state = ModuleState::NotLoaded;
        }

        let mut registry = self.registry.write();
        registry.modules.clear();
        registry.plugins.clear();
        registry.load_order.clear();
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    pub fn find_plugin(&self, name: &str) -> Option<PluginHandle> {
        let registry = self.registry.read();
        registry
            .plugins
            .iter()
            .find(|p| p.name == name)
            .map(Plugin::handle)
    }

    pub fn find_plugin_from_id(&self, id: UniqueId) -> Option<PluginHandle> {
        let registry = self.registry.read();
        registry
            .plugins
            .iter()
            .find(|p| p.id == id)
            .map(Plugin::handle)
    }

    pub fn plugins(&self) -> Vec<PluginHandle> {
        self.registry.read().plugins.iter().map(Plugin::handle).collect()
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleHandle> {
        let registry = self.registry.read();
        registry
            .modules
            .iter()
            .find(|m| m.name == name)
            .map(Module::handle)
    }

    pub fn find_module_from_id(&self, id: UniqueId) -> Option<ModuleHandle> {
        let registry = self.registry.read();
        registry
            .modules
            .iter()
            .find(|m| m.id == id)
            .map(Module::handle)
    }

    pub fn find_module_from_lang(&self, language: &str) -> Option<ModuleHandle> {
        let registry = self.registry.read();
        registry
            .modules
            .iter()
            .find(|m| m.language == language)
            .map(Module::handle)
    }

    pub fn find_module_from_path(&self, path: &Path) -> Option<ModuleHandle> {
        let registry = self.registry.read();
        registry
            .modules
            .iter()
            .find(|m| m.file_path == path)
            .map(Module::handle)
    }

    /// Matches a dependency reference against the module list: the name
    /// must match, and the requested version when one is pinned.
    pub fn find_module_from_descriptor(&self, reference: &PluginReference) -> Option<ModuleHandle> {
        let registry = self.registry.read();
        registry
            .modules
            .iter()
            .find(|m| {
                m.name == reference.name
                    && reference
                        .requested_version
                        .map(|v| v == m.descriptor.version)
                        .unwrap_or(true)
            })
            .map(Module::handle)
    }

    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.registry.read().modules.iter().map(Module::handle).collect()
    }

    /// The declared dependencies of a plugin, by name.
    pub fn get_plugin_dependencies(&self, name: &str) -> Option<Vec<PluginReference>> {
        let registry = self.registry.read();
        registry
            .plugins
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.descriptor.dependencies.clone())
    }
}

enum Action {
    Skip,
    Fail(String),
    Load(usize, PluginHandle),
}

// =============================================================================
// Method binding
// =============================================================================

/// Pairs the addresses a language module reported with the descriptor's
/// exported methods. The two sets must match exactly.
fn bind_methods(
    descriptor: &PluginDescriptor,
    exports: Vec<(String, MemAddr)>,
) -> Result<Vec<MethodData>, String> {
    if exports.len() != descriptor.exported_methods.len() {
        return Err(format!(
            "language module returned {} exports, descriptor declares {}",
            exports.len(),
            descriptor.exported_methods.len()
        ));
    }

    let mut methods = Vec::with_capacity(descriptor.exported_methods.len());
    for method in &descriptor.exported_methods {
        match exports.iter().find(|(name, _)| name == &method.name) {
            Some((_, address)) if !address.is_null() => methods.push(MethodData {
                method: Arc::new(method.clone()),
                address: *address,
            }),
            Some(_) => {
                return Err(format!("exported method '{}' has a null address", method.name))
            }
            None => {
                return Err(format!(
                    "exported method '{}' was not returned by the language module",
                    method.name
                ))
            }
        }
    }
    Ok(methods)
}

// =============================================================================
// Topological sort
// =============================================================================

/// Stable depth-first topological sort over the plugin dependency graph.
///
/// Returns the load order (dependencies before dependants; independent
/// plugins keep discovery order) and the indices participating in cycles.
/// Dependencies that do not resolve to a known plugin are ignored here and
/// reported at load time.
fn sort_by_dependencies(plugins: &[Plugin]) -> (Vec<usize>, Vec<usize>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    fn visit(
        index: usize,
        plugins: &[Plugin],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
        cyclic: &mut HashSet<usize>,
    ) {
        marks[index] = Mark::Gray;
        stack.push(index);

        for dependency in plugins[index]
            .descriptor
            .dependencies
            .iter()
            .filter(|d| d.is_relevant())
        {
            let Some(dep_index) = plugins.iter().position(|p| p.name == dependency.name) else {
                continue;
            };
            match marks[dep_index] {
                Mark::White => visit(dep_index, plugins, marks, stack, order, cyclic),
                Mark::Gray => {
                    // Back edge: everything from the dependency up the
                    // current stack participates in the cycle.
                    if let Some(position) = stack.iter().position(|&i| i == dep_index) {
                        cyclic.extend(stack[position..].iter().copied());
                    }
                }
                Mark::Black => {}
            }
        }

        stack.pop();
        marks[index] = Mark::Black;
        if !cyclic.contains(&index) {
            order.push(index);
        }
    }

    let count = plugins.len();
    let mut marks = vec![Mark::White; count];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(count);
    let mut cyclic = HashSet::new();

    for index in 0..count {
        if marks[index] == Mark::White {
            visit(index, plugins, &mut marks, &mut stack, &mut order, &mut cyclic);
        }
    }

    let mut cyclic: Vec<usize> = cyclic.into_iter().collect();
    cyclic.sort_unstable();
    (order, cyclic)
}
