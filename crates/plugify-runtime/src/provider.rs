//! The capability facade handed to language modules.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use plugify_core::{Config, LogSink, Severity, Version};

use crate::manager::PluginManager;
use crate::module::{ModuleHandle, ModuleState};
use crate::plugin::{PluginHandle, PluginState};

/// Narrow capability handle passed to each language module at
/// `initialize`: logging, the base directory, the symbol-preference
/// policy, and read-only lookups against the plugin manager.
///
/// The provider holds only a weak back-reference to the manager, so a
/// module keeping the provider alive cannot keep the runtime alive past
/// teardown; queries against a torn-down runtime degrade to
/// `false`/`None`.
pub struct Provider {
    manager: Weak<PluginManager>,
    base_dir: PathBuf,
    prefer_own_symbols: bool,
    sink: Arc<dyn LogSink>,
    /// Least severe level still forwarded to the sink.
    gate: Severity,
}

impl Provider {
    pub fn new(manager: Weak<PluginManager>, config: &Config, sink: Arc<dyn LogSink>) -> Self {
        Provider {
            manager,
            base_dir: config.base_dir.clone(),
            prefer_own_symbols: config.prefer_own_symbols.unwrap_or(false),
            gate: config.log_severity.unwrap_or(Severity::Verbose),
            sink,
        }
    }

    /// Forwards a message to the host's logging sink, subject to the
    /// configured severity gate.
    pub fn log(&self, message: &str, severity: Severity) {
        if severity == Severity::None {
            return;
        }
        if severity <= self.gate {
            self.sink.log(message, severity);
        }
    }

    /// Root of the installation.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether module libraries bind their own symbols first.
    pub fn is_prefer_own_symbols(&self) -> bool {
        self.prefer_own_symbols
    }

    /// Whether a plugin with this name is currently `Loaded` or `Running`
    /// (a `Terminating` plugin does not count), optionally gated on its
    /// version (exact, or `minimum` for at-least).
    pub fn is_plugin_loaded(
        &self,
        name: &str,
        required_version: Option<Version>,
        minimum: bool,
    ) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        let Some(plugin) = manager.find_plugin(name) else {
            return false;
        };
        if !matches!(plugin.state, PluginState::Loaded | PluginState::Running) {
            return false;
        }
        match required_version {
            Some(required) if minimum => plugin.descriptor.version >= required,
            Some(required) => plugin.descriptor.version == required,
            None => true,
        }
    }

    /// Whether a module with this name is currently `Loaded`, optionally
    /// gated on its version.
    pub fn is_module_loaded(
        &self,
        name: &str,
        required_version: Option<Version>,
        minimum: bool,
    ) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        let Some(module) = manager.find_module(name) else {
            return false;
        };
        if module.state != ModuleState::Loaded {
            return false;
        }
        match required_version {
            Some(required) if minimum => module.descriptor.version >= required,
            Some(required) => module.descriptor.version == required,
            None => true,
        }
    }

    pub fn find_plugin(&self, name: &str) -> Option<PluginHandle> {
        self.manager.upgrade()?.find_plugin(name)
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleHandle> {
        self.manager.upgrade()?.find_module(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        messages: Mutex<Vec<(String, Severity)>>,
    }

    impl LogSink for CapturingSink {
        fn log(&self, message: &str, severity: Severity) {
            self.messages
                .lock()
                .unwrap()
                .push((message.to_string(), severity));
        }
    }

    fn provider_with_gate(gate: Option<Severity>) -> (Provider, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::default());
        let mut config = Config::new("/tmp/plugify");
        config.log_severity = gate;
        let provider = Provider::new(Weak::new(), &config, sink.clone());
        (provider, sink)
    }

    #[test]
    fn test_severity_gate_filters_less_severe_messages() {
        let (provider, sink) = provider_with_gate(Some(Severity::Info));
        provider.log("a fatal", Severity::Fatal);
        provider.log("an info", Severity::Info);
        provider.log("a debug", Severity::Debug);
        provider.log("a trace", Severity::Verbose);

        let messages = sink.messages.lock().unwrap();
        let texts: Vec<&str> = messages.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(texts, vec!["a fatal", "an info"]);
    }

    #[test]
    fn test_no_gate_forwards_everything_but_none() {
        let (provider, sink) = provider_with_gate(None);
        provider.log("v", Severity::Verbose);
        provider.log("ignored", Severity::None);
        assert_eq!(sink.messages.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dead_runtime_degrades_to_absent() {
        let (provider, _sink) = provider_with_gate(None);
        assert!(!provider.is_plugin_loaded("anything", None, false));
        assert!(!provider.is_module_loaded("anything", None, true));
        assert!(provider.find_plugin("anything").is_none());
        assert!(provider.find_module("anything").is_none());
    }
}
