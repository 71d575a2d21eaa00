//! The interface every language module implements.
//!
//! A language module is a native library that knows how to instantiate and
//! drive plugins written in one language. The plugin manager talks to it
//! exclusively through the [`LanguageModule`] trait; the library exports a
//! single factory symbol returning the boxed implementation (see
//! [`export_language_module!`](crate::export_language_module)).

use std::ffi::c_void;
use std::sync::Arc;
use std::time::Duration;

use plugify_core::Method;

use crate::plugin::PluginHandle;
use crate::provider::Provider;

/// Process-unique identifier for modules and plugins, assigned in
/// discovery order.
pub type UniqueId = i64;

/// A native code address, pointer-width but `Send`-friendly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemAddr(pub usize);

impl MemAddr {
    pub fn from_ptr(ptr: *const c_void) -> Self {
        MemAddr(ptr as usize)
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// The executable callable for an exported method after the owning module
/// has bound it.
#[derive(Debug, Clone)]
pub struct MethodData {
    pub method: Arc<Method>,
    pub address: MemAddr,
}

/// What a language module reports back from
/// [`on_plugin_load`](LanguageModule::on_plugin_load).
pub enum LoadResult {
    Success {
        /// `(method name, native address)` for every method the plugin's
        /// descriptor exports. The manager cross-checks this set against
        /// the descriptor before the plugin becomes `Loaded`.
        exports: Vec<(String, MemAddr)>,
        /// Methods the plugin resolved from its dependencies, if the module
        /// tracks them. The manager verifies each is exported by an
        /// already-loaded plugin.
        imports: Vec<MethodData>,
    },
    Failure(String),
}

/// Capability set a language module exposes to the plugin manager.
///
/// Lifecycle calls arrive strictly sequentially on the runtime's thread.
/// The handles passed in are snapshots: a module may re-enter the
/// [`Provider`] (lookups, logging) from inside any of these calls.
pub trait LanguageModule: Send {
    /// Called once after the module library is loaded. A returned error
    /// string transitions the module to its `Error` state.
    fn initialize(&mut self, provider: Arc<Provider>) -> Result<(), String>;

    /// Called once during teardown, after every plugin backed by this
    /// module has been unloaded.
    fn shutdown(&mut self);

    fn on_plugin_load(&mut self, plugin: &PluginHandle) -> LoadResult;

    fn on_plugin_start(&mut self, plugin: &PluginHandle);

    fn on_plugin_update(&mut self, plugin: &PluginHandle, dt: Duration);

    fn on_plugin_end(&mut self, plugin: &PluginHandle);
}

/// Defines the `GetLanguageModule` factory symbol for a module library.
///
/// ```rust,ignore
/// use plugify_runtime::export_language_module;
///
/// #[derive(Default)]
/// struct PythonModule { /* … */ }
///
/// impl plugify_runtime::LanguageModule for PythonModule { /* … */ }
///
/// export_language_module!(PythonModule::default());
/// ```
#[macro_export]
macro_rules! export_language_module {
    ($ctor:expr) => {
        #[no_mangle]
        pub extern "C" fn GetLanguageModule(
        ) -> *mut ::std::boxed::Box<dyn $crate::LanguageModule> {
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(
                ::std::boxed::Box::new($ctor) as ::std::boxed::Box<dyn $crate::LanguageModule>,
            ))
        }
    };
}
