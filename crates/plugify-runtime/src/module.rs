//! Runtime language-module objects.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plugify_core::{LanguageModuleDescriptor, LocalPackage};

use crate::language_module::UniqueId;
use crate::loader::LoadedModule;

/// States of a language module.
///
/// `NotLoaded → Loaded` on success, `NotLoaded → Error` on failure; either
/// terminal state returns to `NotLoaded` on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    NotLoaded,
    Error,
    Loaded,
}

impl ModuleState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::NotLoaded => "NotLoaded",
            ModuleState::Error => "Error",
            ModuleState::Loaded => "Loaded",
        }
    }
}

/// A language module known to the plugin manager. Owned exclusively by the
/// manager; the outside world sees [`ModuleHandle`] snapshots.
pub struct Module {
    pub(crate) id: UniqueId,
    pub(crate) name: String,
    pub(crate) language: String,
    /// Path of the module's native library.
    pub(crate) file_path: PathBuf,
    /// The package directory (`<baseDir>/modules/<name>`).
    pub(crate) base_dir: PathBuf,
    pub(crate) descriptor: Arc<LanguageModuleDescriptor>,
    pub(crate) state: ModuleState,
    pub(crate) error: Option<String>,
    pub(crate) loaded: Option<LoadedModule>,
    /// Ids of the plugins this module backs (non-owning back-references).
    pub(crate) loaded_plugins: Vec<UniqueId>,
}

impl Module {
    pub(crate) fn new(
        id: UniqueId,
        package: &LocalPackage,
        descriptor: Arc<LanguageModuleDescriptor>,
    ) -> Self {
        let base_dir = package
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let file_path = base_dir.join("bin").join(library_file_name(
            &package.name,
            &descriptor.entry_point,
        ));
        Module {
            id,
            name: package.name.clone(),
            language: descriptor.language.clone(),
            file_path,
            base_dir,
            descriptor,
            state: ModuleState::NotLoaded,
            error: None,
            loaded: None,
            loaded_plugins: Vec::new(),
        }
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.state = ModuleState::Error;
        self.error = Some(error);
    }

    pub(crate) fn handle(&self) -> ModuleHandle {
        ModuleHandle {
            id: self.id,
            name: self.name.clone(),
            language: self.language.clone(),
            file_path: self.file_path.clone(),
            base_dir: self.base_dir.clone(),
            descriptor: Arc::clone(&self.descriptor),
            state: self.state,
            error: self.error.clone(),
        }
    }
}

/// A read-only snapshot of a module's public surface.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    pub id: UniqueId,
    pub name: String,
    pub language: String,
    pub file_path: PathBuf,
    pub base_dir: PathBuf,
    pub descriptor: Arc<LanguageModuleDescriptor>,
    pub state: ModuleState,
    pub error: Option<String>,
}

impl ModuleHandle {
    pub fn friendly_name(&self) -> &str {
        if self.descriptor.friendly_name.is_empty() {
            &self.name
        } else {
            &self.descriptor.friendly_name
        }
    }

    /// Resolves a resource file, preferring a user override under the
    /// installation root over the module's own copy.
    pub fn find_resource(&self, relative: &Path, install_root: &Path) -> Option<PathBuf> {
        find_resource(relative, install_root, &self.base_dir)
    }
}

/// `<baseDir>/<rel>` when that file exists, else the package's own
/// `<rel>` when it exists, else absent.
pub(crate) fn find_resource(
    relative: &Path,
    install_root: &Path,
    package_dir: &Path,
) -> Option<PathBuf> {
    let overridden = install_root.join(relative);
    if overridden.is_file() {
        return Some(overridden);
    }
    let own = package_dir.join(relative);
    if own.is_file() {
        return Some(own);
    }
    None
}

/// The platform file name of a module's entry-point library. An explicit
/// entry point keeps its name (gaining the platform suffix when it has no
/// extension); an absent one defaults to the conventional library name of
/// the package.
fn library_file_name(package_name: &str, entry_point: &str) -> String {
    if entry_point.is_empty() {
        return format!("{DLL_PREFIX}{package_name}{DLL_SUFFIX}");
    }
    if Path::new(entry_point).extension().is_some() {
        entry_point.to_string()
    } else {
        format!("{entry_point}{DLL_SUFFIX}")
    }
}
