//! Runtime plugin objects.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use plugify_core::{LocalPackage, PluginDescriptor};

use crate::language_module::{MethodData, UniqueId};
use crate::module::find_resource;

/// States of a plugin.
///
/// If a plugin is `Loaded`, `Running`, or `Terminating`, its module is
/// `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    NotLoaded,
    Error,
    Loaded,
    Running,
    Terminating,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::NotLoaded => "NotLoaded",
            PluginState::Error => "Error",
            PluginState::Loaded => "Loaded",
            PluginState::Running => "Running",
            PluginState::Terminating => "Terminating",
        }
    }
}

/// A plugin known to the plugin manager. Owned exclusively by the manager;
/// language modules and callers see [`PluginHandle`] snapshots.
pub struct Plugin {
    pub(crate) id: UniqueId,
    pub(crate) name: String,
    /// Path of the descriptor file.
    pub(crate) file_path: PathBuf,
    /// The package directory (`<baseDir>/plugins/<name>`).
    pub(crate) base_dir: PathBuf,
    /// Root of the installation, for resource overrides.
    pub(crate) install_root: PathBuf,
    pub(crate) descriptor: Arc<PluginDescriptor>,
    pub(crate) state: PluginState,
    pub(crate) error: Option<String>,
    /// Index of the owning module in the manager's module list.
    pub(crate) module: Option<usize>,
    /// Bound exported methods, populated once the module loads the plugin.
    pub(crate) methods: Vec<MethodData>,
}

impl Plugin {
    pub(crate) fn new(
        id: UniqueId,
        package: &LocalPackage,
        descriptor: Arc<PluginDescriptor>,
        install_root: PathBuf,
    ) -> Self {
        let base_dir = package
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Plugin {
            id,
            name: package.name.clone(),
            file_path: package.path.clone(),
            base_dir,
            install_root,
            descriptor,
            state: PluginState::NotLoaded,
            error: None,
            module: None,
            methods: Vec::new(),
        }
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.state = PluginState::Error;
        self.error = Some(error);
    }

    pub(crate) fn handle(&self) -> PluginHandle {
        PluginHandle {
            id: self.id,
            name: self.name.clone(),
            file_path: self.file_path.clone(),
            base_dir: self.base_dir.clone(),
            install_root: self.install_root.clone(),
            descriptor: Arc::clone(&self.descriptor),
            state: self.state,
            error: self.error.clone(),
            methods: self.methods.clone(),
        }
    }
}

/// A read-only snapshot of a plugin's public surface.
///
/// This is what lifecycle calls receive: it stays valid (and stale) however
/// the registry changes, so a language module may re-enter the provider
/// from inside a lifecycle call.
#[derive(Debug, Clone)]
pub struct PluginHandle {
    pub id: UniqueId,
    pub name: String,
    pub file_path: PathBuf,
    pub base_dir: PathBuf,
    pub install_root: PathBuf,
    pub descriptor: Arc<PluginDescriptor>,
    pub state: PluginState,
    pub error: Option<String>,
    /// Bound exported methods; empty until the plugin is `Loaded`.
    pub methods: Vec<MethodData>,
}

impl PluginHandle {
    pub fn friendly_name(&self) -> &str {
        if self.descriptor.friendly_name.is_empty() {
            &self.name
        } else {
            &self.descriptor.friendly_name
        }
    }

    /// Resolves a resource file, preferring a user override under the
    /// installation root over the plugin's own copy.
    pub fn find_resource(&self, relative: &Path) -> Option<PathBuf> {
        find_resource(relative, &self.install_root, &self.base_dir)
    }

    /// The bound callable for an exported method, by name.
    pub fn find_method(&self, name: &str) -> Option<&MethodData> {
        self.methods.iter().find(|m| m.method.name == name)
    }
}
