//! Plugin manager lifecycle scenarios with an in-process module loader.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugify_core::{
    Config, LanguageModuleDescriptor, LanguageModuleInfo, LocalPackage, Method, PackageDescriptor,
    PluginDescriptor, PluginReference, Property, TracingSink, ValueType, Version, PLUGIN_TYPE,
};
use plugify_runtime::{
    LanguageModule, LoadResult, LoadedModule, MemAddr, ModuleLoader, ModuleState, PluginHandle,
    PluginManager, PluginState, Provider, RuntimeError,
};

type EventLog = Arc<Mutex<Vec<String>>>;

// ─── In-process language module ──────────────────────────────────────────────

struct FakeModule {
    language: String,
    events: EventLog,
    fail_plugins: HashSet<String>,
    swallow_exports: HashSet<String>,
    fail_init: bool,
}

impl FakeModule {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl LanguageModule for FakeModule {
    fn initialize(&mut self, _provider: Arc<Provider>) -> Result<(), String> {
        self.push(format!("init:{}", self.language));
        if self.fail_init {
            Err("interpreter unavailable".into())
        } else {
            Ok(())
        }
    }

    fn shutdown(&mut self) {
        self.push(format!("shutdown:{}", self.language));
    }

    fn on_plugin_load(&mut self, plugin: &PluginHandle) -> LoadResult {
        self.push(format!("load:{}", plugin.name));
        if self.fail_plugins.contains(&plugin.name) {
            return LoadResult::Failure("entry point crashed".into());
        }
        let exports = if self.swallow_exports.contains(&plugin.name) {
            Vec::new()
        } else {
            plugin
                .descriptor
                .exported_methods
                .iter()
                .map(|m| (m.name.clone(), MemAddr(0x1000)))
                .collect()
        };
        LoadResult::Success {
            exports,
            imports: Vec::new(),
        }
    }

    fn on_plugin_start(&mut self, plugin: &PluginHandle) {
        self.push(format!("start:{}", plugin.name));
    }

    fn on_plugin_update(&mut self, plugin: &PluginHandle, _dt: Duration) {
        self.push(format!("update:{}", plugin.name));
    }

    fn on_plugin_end(&mut self, plugin: &PluginHandle) {
        self.push(format!("end:{}", plugin.name));
    }
}

#[derive(Default)]
struct FakeLoader {
    events: EventLog,
    fail_plugins: HashSet<String>,
    swallow_exports: HashSet<String>,
    fail_init_languages: HashSet<String>,
}

impl ModuleLoader for FakeLoader {
    fn load(
        &self,
        descriptor: &LanguageModuleDescriptor,
        _file_path: &std::path::Path,
        _prefer_own_symbols: bool,
    ) -> Result<LoadedModule, String> {
        Ok(LoadedModule {
            iface: Box::new(FakeModule {
                language: descriptor.language.clone(),
                events: Arc::clone(&self.events),
                fail_plugins: self.fail_plugins.clone(),
                swallow_exports: self.swallow_exports.clone(),
                fail_init: self.fail_init_languages.contains(&descriptor.language),
            }),
            library: None,
        })
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn module_package(name: &str, language: &str, version: i32) -> LocalPackage {
    let descriptor = LanguageModuleDescriptor {
        file_version: 1,
        version: Version(version),
        language: language.to_string(),
        ..Default::default()
    };
    LocalPackage {
        name: name.to_string(),
        kind: language.to_string(),
        path: PathBuf::from(format!("/srv/plugify/modules/{name}/{name}.module")),
        version: Version(version),
        descriptor: PackageDescriptor::Module(Arc::new(descriptor)),
    }
}

fn plugin_package(
    name: &str,
    language: &str,
    version: i32,
    dependencies: &[(&str, Option<i32>)],
    methods: &[&str],
) -> LocalPackage {
    let descriptor = PluginDescriptor {
        file_version: 1,
        version: Version(version),
        language_module: LanguageModuleInfo {
            name: language.to_string(),
        },
        dependencies: dependencies
            .iter()
            .map(|(dep, requested)| PluginReference {
                name: dep.to_string(),
                optional: false,
                supported_platforms: Vec::new(),
                requested_version: requested.map(Version),
            })
            .collect(),
        exported_methods: methods
            .iter()
            .map(|m| Method::new(*m, Vec::new(), Property::new(ValueType::Void)))
            .collect(),
        ..Default::default()
    };
    LocalPackage {
        name: name.to_string(),
        kind: PLUGIN_TYPE.to_string(),
        path: PathBuf::from(format!("/srv/plugify/plugins/{name}/{name}.plugin")),
        version: Version(version),
        descriptor: PackageDescriptor::Plugin(Arc::new(descriptor)),
    }
}

fn setup(packages: Vec<LocalPackage>, loader: FakeLoader) -> (Arc<PluginManager>, EventLog) {
    let events = Arc::clone(&loader.events);
    let config = Arc::new(Config::new("/srv/plugify"));
    let manager = Arc::new(PluginManager::new(Arc::clone(&config), Box::new(loader)));
    let provider = Arc::new(Provider::new(
        Arc::downgrade(&manager),
        &config,
        Arc::new(TracingSink),
    ));
    manager.initialize(&packages, provider).unwrap();
    (manager, events)
}

fn events_of(events: &EventLog) -> Vec<String> {
    events.lock().unwrap().clone()
}

fn index_of(events: &[String], needle: &str) -> usize {
    events
        .iter()
        .position(|e| e == needle)
        .unwrap_or_else(|| panic!("event '{needle}' not found in {events:?}"))
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn test_happy_path_plugin_runs() {
    let (manager, events) = setup(
        vec![
            module_package("py", "python", 3),
            plugin_package("A", "python", 1, &[], &["Hello"]),
        ],
        FakeLoader::default(),
    );

    let plugin = manager.find_plugin("A").unwrap();
    assert_eq!(plugin.state, PluginState::Running);
    assert_eq!(plugin.methods.len(), 1);
    assert_eq!(plugin.find_method("Hello").unwrap().address, MemAddr(0x1000));

    let module = manager.find_module_from_lang("python").unwrap();
    assert_eq!(module.state, ModuleState::Loaded);

    let log = events_of(&events);
    assert!(index_of(&log, "init:python") < index_of(&log, "load:A"));
    assert!(index_of(&log, "load:A") < index_of(&log, "start:A"));
}

#[test]
fn test_cyclic_plugins_both_error() {
    let (manager, events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("A", "python", 1, &[("B", None)], &[]),
            plugin_package("B", "python", 1, &[("A", None)], &[]),
            plugin_package("C", "python", 1, &[], &[]),
        ],
        FakeLoader::default(),
    );

    assert!(manager.is_initialized());
    for name in ["A", "B"] {
        let plugin = manager.find_plugin(name).unwrap();
        assert_eq!(plugin.state, PluginState::Error);
        assert_eq!(plugin.error.as_deref(), Some("cyclic dependency"));
    }
    // The rest of the graph still loads.
    assert_eq!(manager.find_plugin("C").unwrap().state, PluginState::Running);

    let log = events_of(&events);
    assert!(!log.contains(&"load:A".to_string()));
    assert!(!log.contains(&"load:B".to_string()));
}

#[test]
fn test_missing_language_module_is_error() {
    let (manager, events) = setup(
        vec![plugin_package("A", "ruby", 1, &[], &[])],
        FakeLoader::default(),
    );

    let plugin = manager.find_plugin("A").unwrap();
    assert_eq!(plugin.state, PluginState::Error);
    assert!(plugin.error.as_deref().unwrap().contains("language module"));
    assert!(events_of(&events).is_empty());
}

#[test]
fn test_load_order_follows_dependencies_and_terminate_reverses() {
    let (manager, events) = setup(
        vec![
            module_package("py", "python", 1),
            // Discovered dependants-first to prove the sort reorders them.
            plugin_package("C", "python", 1, &[("B", None)], &[]),
            plugin_package("B", "python", 1, &[("A", None)], &[]),
            plugin_package("A", "python", 1, &[], &[]),
        ],
        FakeLoader::default(),
    );

    let log = events_of(&events);
    assert!(index_of(&log, "load:A") < index_of(&log, "load:B"));
    assert!(index_of(&log, "load:B") < index_of(&log, "load:C"));

    manager.terminate();
    let log = events_of(&events);
    assert!(index_of(&log, "end:C") < index_of(&log, "end:B"));
    assert!(index_of(&log, "end:B") < index_of(&log, "end:A"));
    assert!(index_of(&log, "end:A") < index_of(&log, "shutdown:python"));
    assert!(!manager.is_initialized());
}

#[test]
fn test_failed_plugin_fails_transitive_dependants() {
    let loader = FakeLoader {
        fail_plugins: HashSet::from(["B".to_string()]),
        ..Default::default()
    };
    let (manager, events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("A", "python", 1, &[], &[]),
            plugin_package("B", "python", 1, &[("A", None)], &[]),
            plugin_package("C", "python", 1, &[("B", None)], &[]),
        ],
        loader,
    );

    assert_eq!(manager.find_plugin("A").unwrap().state, PluginState::Running);

    let failed = manager.find_plugin("B").unwrap();
    assert_eq!(failed.state, PluginState::Error);
    assert_eq!(failed.error.as_deref(), Some("entry point crashed"));

    let dependant = manager.find_plugin("C").unwrap();
    assert_eq!(dependant.state, PluginState::Error);
    assert_eq!(dependant.error.as_deref(), Some("dependency failed: B"));

    // The module was never asked to load the dependant.
    assert!(!events_of(&events).contains(&"load:C".to_string()));
}

#[test]
fn test_module_init_failure_fails_its_plugins() {
    let loader = FakeLoader {
        fail_init_languages: HashSet::from(["python".to_string()]),
        ..Default::default()
    };
    let (manager, _events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("A", "python", 1, &[], &[]),
        ],
        loader,
    );

    let module = manager.find_module("py").unwrap();
    assert_eq!(module.state, ModuleState::Error);
    assert_eq!(module.error.as_deref(), Some("interpreter unavailable"));

    let plugin = manager.find_plugin("A").unwrap();
    assert_eq!(plugin.state, PluginState::Error);
    assert!(plugin.error.as_deref().unwrap().contains("not loaded"));
}

#[test]
fn test_export_set_must_match_descriptor() {
    let loader = FakeLoader {
        swallow_exports: HashSet::from(["A".to_string()]),
        ..Default::default()
    };
    let (manager, _events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("A", "python", 1, &[], &["Hello"]),
        ],
        loader,
    );

    let plugin = manager.find_plugin("A").unwrap();
    assert_eq!(plugin.state, PluginState::Error);
    assert!(plugin.error.as_deref().unwrap().contains("exports"));
}

#[test]
fn test_update_ticks_running_plugins_in_order() {
    let (manager, events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("B", "python", 1, &[("A", None)], &[]),
            plugin_package("A", "python", 1, &[], &[]),
            plugin_package("broken", "ruby", 1, &[], &[]),
        ],
        FakeLoader::default(),
    );

    manager.update(Duration::from_millis(16));

    let log = events_of(&events);
    assert!(index_of(&log, "update:A") < index_of(&log, "update:B"));
    assert!(!log.contains(&"update:broken".to_string()));
}

#[test]
fn test_discovery_assigns_unique_ids_in_order() {
    let (manager, _events) = setup(
        vec![
            module_package("py", "python", 1),
            plugin_package("A", "python", 1, &[], &[]),
            plugin_package("B", "python", 1, &[], &[]),
        ],
        FakeLoader::default(),
    );

    assert_eq!(manager.find_module("py").unwrap().id, 0);
    assert_eq!(manager.find_plugin("A").unwrap().id, 1);
    assert_eq!(manager.find_plugin("B").unwrap().id, 2);
    assert_eq!(manager.find_plugin_from_id(2).unwrap().name, "B");

    // Name uniqueness over the discovered set.
    let names: Vec<String> = manager.plugins().into_iter().map(|p| p.name).collect();
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), names.len());
}

#[test]
fn test_provider_queries_reflect_manager_state() {
    let config = Arc::new(Config::new("/srv/plugify"));
    let manager = Arc::new(PluginManager::new(
        Arc::clone(&config),
        Box::new(FakeLoader::default()),
    ));
    let provider = Arc::new(Provider::new(
        Arc::downgrade(&manager),
        &config,
        Arc::new(TracingSink),
    ));
    manager
        .initialize(
            &[
                module_package("py", "python", 3),
                plugin_package("A", "python", 2, &[], &[]),
            ],
            Arc::clone(&provider),
        )
        .unwrap();

    assert!(provider.is_plugin_loaded("A", None, false));
    assert!(provider.is_plugin_loaded("A", Some(Version(2)), false));
    assert!(!provider.is_plugin_loaded("A", Some(Version(1)), false));
    assert!(provider.is_plugin_loaded("A", Some(Version(1)), true));
    assert!(!provider.is_plugin_loaded("A", Some(Version(3)), true));
    assert!(!provider.is_plugin_loaded("nope", None, false));

    assert!(provider.is_module_loaded("py", Some(Version(3)), false));
    assert!(!provider.is_module_loaded("py", Some(Version(4)), true));

    manager.terminate();
    assert!(!provider.is_plugin_loaded("A", None, false));
    assert!(!provider.is_module_loaded("py", None, false));
}

#[test]
fn test_double_initialize_is_rejected() {
    let config = Arc::new(Config::new("/srv/plugify"));
    let manager = Arc::new(PluginManager::new(
        Arc::clone(&config),
        Box::new(FakeLoader::default()),
    ));
    let provider = Arc::new(Provider::new(
        Arc::downgrade(&manager),
        &config,
        Arc::new(TracingSink),
    ));
    manager.initialize(&[], Arc::clone(&provider)).unwrap();
    assert!(matches!(
        manager.initialize(&[], provider),
        Err(RuntimeError::AlreadyInitialized)
    ));
}

#[test]
fn test_optional_missing_dependency_does_not_block() {
    let packages = vec![
        module_package("py", "python", 1),
        {
            let mut package = plugin_package("A", "python", 1, &[], &[]);
            if let PackageDescriptor::Plugin(descriptor) = &mut package.descriptor {
                let descriptor = Arc::get_mut(descriptor).unwrap();
                descriptor.dependencies.push(PluginReference {
                    name: "extras".into(),
                    optional: true,
                    supported_platforms: Vec::new(),
                    requested_version: None,
                });
            }
            package
        },
    ];
    let (manager, _events) = setup(packages, FakeLoader::default());
    assert_eq!(manager.find_plugin("A").unwrap().state, PluginState::Running);
}
