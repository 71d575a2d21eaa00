//! Native module-library loading.
//!
//! [`ModuleLoader`] is the seam between the plugin manager and the dynamic
//! linker: the default [`LibraryLoader`] resolves the factory symbol from a
//! shared library via `libloading`, while tests substitute an in-process
//! implementation.

use std::path::Path;

use libloading::Library;
use tracing::warn;

use plugify_core::LanguageModuleDescriptor;

use crate::language_module::LanguageModule;

/// Name of the factory symbol every module library must export.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"GetLanguageModule";

/// Signature of the factory symbol: returns a heap-allocated boxed trait
/// object (double-boxed so the symbol stays thin-pointer-sized).
pub type ModuleEntryFn = unsafe extern "C" fn() -> *mut Box<dyn LanguageModule>;

/// A successfully loaded module: the interface plus the library that backs
/// it. Field order matters: the interface must drop before the library
/// unmaps the code it points into.
pub struct LoadedModule {
    pub iface: Box<dyn LanguageModule>,
    /// `None` for in-process implementations.
    pub library: Option<Library>,
}

/// Resolves a language-module implementation for the plugin manager.
///
/// Errors are strings: they land verbatim on the module's `Error` state.
pub trait ModuleLoader: Send + Sync {
    fn load(
        &self,
        descriptor: &LanguageModuleDescriptor,
        file_path: &Path,
        prefer_own_symbols: bool,
    ) -> Result<LoadedModule, String>;
}

/// The default loader: `dlopen`/`LoadLibrary` through `libloading`.
#[derive(Debug, Default)]
pub struct LibraryLoader;

impl ModuleLoader for LibraryLoader {
    fn load(
        &self,
        descriptor: &LanguageModuleDescriptor,
        file_path: &Path,
        prefer_own_symbols: bool,
    ) -> Result<LoadedModule, String> {
        if !file_path.exists() {
            return Err(format!(
                "module library '{}' does not exist",
                file_path.display()
            ));
        }
        for dir in &descriptor.library_directories {
            let resolved = if dir.is_absolute() {
                dir.clone()
            } else {
                file_path.parent().unwrap_or(Path::new(".")).join(dir)
            };
            if !resolved.is_dir() {
                warn!(
                    module = %descriptor.language,
                    directory = %resolved.display(),
                    "Declared library directory does not exist"
                );
            }
        }

        let library = open_library(file_path, prefer_own_symbols)
            .map_err(|e| format!("failed loading '{}': {e}", file_path.display()))?;

        let iface = unsafe {
            let entry: libloading::Symbol<'_, ModuleEntryFn> = library
                .get(MODULE_ENTRY_SYMBOL)
                .map_err(|e| format!("failed resolving GetLanguageModule: {e}"))?;
            let raw = entry();
            if raw.is_null() {
                return Err("GetLanguageModule returned a null interface".into());
            }
            *Box::from_raw(raw)
        };

        Ok(LoadedModule {
            iface,
            library: Some(library),
        })
    }
}

/// Opens the library honouring the symbol-preference policy: with
/// `prefer_own_symbols` the module's symbols stay local to it (isolate);
/// otherwise they are made available process-global (share).
#[cfg(unix)]
fn open_library(path: &Path, prefer_own_symbols: bool) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_LOCAL, RTLD_NOW};

    let flags = RTLD_NOW | if prefer_own_symbols { RTLD_LOCAL } else { RTLD_GLOBAL };
    unsafe { UnixLibrary::open(Some(path), flags).map(Library::from) }
}

#[cfg(not(unix))]
fn open_library(path: &Path, _prefer_own_symbols: bool) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
