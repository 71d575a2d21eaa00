//! End-to-end package manager scenarios over a temporary base directory and
//! an in-memory HTTP backend.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use plugify_core::{Config, Manifest, Version};
use plugify_packages::{PackageManager, VerifiedPackages};
use plugify_transport::{
    FetchResponse, HttpBackend, HttpDownloader, HTTP_STATUS_ERROR, HTTP_STATUS_OK,
};

// ─── Fixture helpers ─────────────────────────────────────────────────────────

struct FakeBackend {
    responses: HashMap<String, FetchResponse>,
}

#[async_trait]
impl HttpBackend for FakeBackend {
    async fn fetch(&self, url: &str) -> FetchResponse {
        self.responses.get(url).cloned().unwrap_or(FetchResponse {
            status: HTTP_STATUS_ERROR,
            ..Default::default()
        })
    }
}

fn manager_with(
    base: &Path,
    repositories: &[&str],
    responses: HashMap<String, FetchResponse>,
) -> PackageManager {
    let mut config = Config::new(base);
    config.repositories = repositories.iter().map(|s| s.to_string()).collect();
    let downloader = HttpDownloader::with_backend(Arc::new(FakeBackend { responses })).unwrap();
    let mut manager = PackageManager::with_downloader(Arc::new(config), downloader);
    manager.initialize().unwrap();
    manager
}

fn manifest_response(json: &str) -> FetchResponse {
    FetchResponse {
        status: HTTP_STATUS_OK,
        content_type: "application/json".into(),
        body: json.as_bytes().to_vec(),
    }
}

fn zip_response(entries: &[(&str, &str)]) -> FetchResponse {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    FetchResponse {
        status: HTTP_STATUS_OK,
        content_type: "application/zip".into(),
        body: writer.finish().unwrap().into_inner(),
    }
}

fn write_plugin(base: &Path, dir_name: &str, name: &str, version: i32, language: &str, deps: &str) {
    let dir = base.join("plugins").join(dir_name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{name}.plugin")),
        format!(
            r#"{{ "fileVersion": 1, "version": {version},
                  "languageModule": {{ "name": "{language}" }},
                  "dependencies": {deps} }}"#
        ),
    )
    .unwrap();
}

fn write_module(base: &Path, name: &str, version: i32, language: &str) {
    let dir = base.join("modules").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(format!("{name}.module")),
        format!(
            r#"{{ "fileVersion": 1, "version": {version},
                  "language": "{language}", "entryPoint": "lib{name}" }}"#
        ),
    )
    .unwrap();
}

// ─── Local discovery ─────────────────────────────────────────────────────────

#[test]
fn test_initialize_discovers_local_packages() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 3, "python");
    write_plugin(base.path(), "A", "A", 1, "python", "[]");

    let manager = manager_with(base.path(), &[], HashMap::new());
    assert_eq!(manager.local_packages().len(), 2);

    let plugin = manager.find_local_package("A").unwrap();
    assert_eq!(plugin.kind, "plugin");
    assert_eq!(plugin.version, Version(1));

    let module = manager.find_local_package("py").unwrap();
    assert_eq!(module.kind, "python");
    assert_eq!(module.version, Version(3));

    assert!(manager.missed_packages().is_empty());
    assert!(manager.conflicted_packages().is_empty());
}

#[test]
fn test_duplicate_local_package_higher_version_wins() {
    let base = tempfile::tempdir().unwrap();
    write_plugin(base.path(), "A", "A", 1, "python", "[]");
    write_plugin(base.path(), "A-newer", "A", 2, "python", "[]");
    write_module(base.path(), "py", 1, "python");

    let manager = manager_with(base.path(), &[], HashMap::new());
    let plugin = manager.find_local_package("A").unwrap();
    assert_eq!(plugin.version, Version(2));
    // One entry survives discovery for the duplicated name.
    assert_eq!(
        manager
            .local_packages()
            .iter()
            .filter(|p| p.name == "A")
            .count(),
        1
    );
}

// ─── Dependency resolution ───────────────────────────────────────────────────

#[test]
fn test_missing_language_module_marks_plugin_conflicted() {
    let base = tempfile::tempdir().unwrap();
    write_plugin(base.path(), "A", "A", 1, "ruby", "[]");

    let manager = manager_with(base.path(), &[], HashMap::new());
    assert!(manager.missed_packages().is_empty());
    let conflicted: Vec<&str> = manager
        .conflicted_packages()
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(conflicted, vec!["A"]);
}

#[test]
fn test_missing_language_module_found_remotely_is_missed() {
    let base = tempfile::tempdir().unwrap();
    write_plugin(base.path(), "A", "A", 1, "ruby", "[]");

    let manifest = r#"{
        "ruby": {
            "name": "ruby", "type": "ruby",
            "versions": [ { "version": 4, "mirrors": ["https://dl/ruby.zip"] } ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));

    let manager = manager_with(base.path(), &["https://repo"], responses);
    assert!(manager.conflicted_packages().is_empty());
    let (package, version) = &manager.missed_packages()["ruby"];
    assert_eq!(package.kind, "ruby");
    // Language modules default to the latest version.
    assert_eq!(*version, None);
}

#[test]
fn test_dependency_version_conflict_higher_wins() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");
    write_plugin(
        base.path(),
        "A",
        "A",
        1,
        "python",
        r#"[ { "name": "libX", "requestedVersion": 1 } ]"#,
    );
    write_plugin(
        base.path(),
        "B",
        "B",
        1,
        "python",
        r#"[ { "name": "libX", "requestedVersion": 2 } ]"#,
    );

    let manifest = r#"{
        "libX": {
            "name": "libX", "type": "plugin",
            "versions": [
                { "version": 1, "mirrors": ["https://dl/libX-1.zip"] },
                { "version": 2, "mirrors": ["https://dl/libX-2.zip"] }
            ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));

    let manager = manager_with(base.path(), &["https://repo"], responses);
    let (_, version) = &manager.missed_packages()["libX"];
    assert_eq!(*version, Some(Version(2)));
    assert!(manager.conflicted_packages().is_empty());
}

#[test]
fn test_unavailable_requested_version_marks_conflicted() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");
    write_plugin(
        base.path(),
        "A",
        "A",
        1,
        "python",
        r#"[ { "name": "libX", "requestedVersion": 9 } ]"#,
    );

    let manifest = r#"{
        "libX": {
            "name": "libX", "type": "plugin",
            "versions": [ { "version": 1, "mirrors": ["https://dl/libX.zip"] } ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));

    let manager = manager_with(base.path(), &["https://repo"], responses);
    assert!(!manager.missed_packages().contains_key("libX"));
    assert_eq!(manager.conflicted_packages().len(), 1);
}

#[test]
fn test_resolution_is_deterministic() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");
    write_plugin(
        base.path(),
        "A",
        "A",
        1,
        "python",
        r#"[ { "name": "libX", "requestedVersion": 2 } ]"#,
    );
    let manifest = r#"{
        "libX": {
            "name": "libX", "type": "plugin",
            "versions": [ { "version": 2, "mirrors": ["https://dl/libX.zip"] } ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    let first_missed: Vec<(String, Option<Version>)> = manager
        .missed_packages()
        .iter()
        .map(|(name, (_, version))| (name.clone(), *version))
        .collect();
    let first_conflicted: Vec<String> = manager
        .conflicted_packages()
        .iter()
        .map(|p| p.name.clone())
        .collect();

    manager.find_dependencies();

    let second_missed: Vec<(String, Option<Version>)> = manager
        .missed_packages()
        .iter()
        .map(|(name, (_, version))| (name.clone(), *version))
        .collect();
    let second_conflicted: Vec<String> = manager
        .conflicted_packages()
        .iter()
        .map(|p| p.name.clone())
        .collect();

    assert_eq!(first_missed, second_missed);
    assert_eq!(first_conflicted, second_conflicted);
}

// ─── Remote catalogue merge ──────────────────────────────────────────────────

#[test]
fn test_catalogue_merge_unions_version_sets() {
    let base = tempfile::tempdir().unwrap();
    let manifest_one = r#"{
        "libX": {
            "name": "libX", "type": "plugin",
            "versions": [ { "version": 1, "mirrors": [] }, { "version": 2, "mirrors": [] } ]
        }
    }"#;
    let manifest_two = r#"{
        "libX": {
            "name": "libX", "type": "plugin",
            "versions": [ { "version": 2, "mirrors": [] }, { "version": 3, "mirrors": [] } ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://one".to_string(), manifest_response(manifest_one));
    responses.insert("https://two".to_string(), manifest_response(manifest_two));

    let manager = manager_with(base.path(), &["https://one", "https://two"], responses);
    let remote = manager.remote_packages();
    assert_eq!(remote.len(), 1);
    let versions: Vec<i32> = remote[0].versions.iter().map(|v| v.version.0).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[test]
fn test_catalogue_merge_ignores_type_mismatch() {
    let base = tempfile::tempdir().unwrap();
    let manifest_one = r#"{
        "libX": { "name": "libX", "type": "plugin",
                  "versions": [ { "version": 1, "mirrors": [] } ] }
    }"#;
    let manifest_two = r#"{
        "libX": { "name": "libX", "type": "cpp",
                  "versions": [ { "version": 7, "mirrors": [] } ] }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://one".to_string(), manifest_response(manifest_one));
    responses.insert("https://two".to_string(), manifest_response(manifest_two));

    let manager = manager_with(base.path(), &["https://one", "https://two"], responses);
    let remote = manager.remote_packages();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].versions.len(), 1);
}

#[test]
fn test_manifest_key_name_mismatch_rejected() {
    let base = tempfile::tempdir().unwrap();
    let manifest = r#"{
        "wrong-key": { "name": "libX", "type": "plugin",
                       "versions": [ { "version": 1, "mirrors": [] } ] }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));

    let manager = manager_with(base.path(), &["https://repo"], responses);
    assert!(manager.remote_packages().is_empty());
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[test]
fn test_snapshot_round_trips_local_set() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 3, "python");
    write_plugin(base.path(), "A", "A", 1, "python", "[]");

    let manager = manager_with(base.path(), &[], HashMap::new());
    let snapshot_path = base.path().join("state.manifest");
    manager.snapshot_packages(&snapshot_path, true).unwrap();

    let manifest = Manifest::parse(&fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    let names: Vec<&str> = manifest.content.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["A", "py"]);
    assert_eq!(
        manifest.content["A"].latest_version().unwrap().version,
        Version(1)
    );
    assert_eq!(
        manifest.content["py"].latest_version().unwrap().version,
        Version(3)
    );
}

// ─── Install / update / uninstall ────────────────────────────────────────────

const LIBY_MANIFEST: &str = r#"{
    "libY": {
        "name": "libY", "type": "plugin",
        "versions": [ { "version": 1, "mirrors": ["https://dl/libY.zip"] } ]
    }
}"#;

fn liby_descriptor(version: i32) -> String {
    format!(
        r#"{{ "fileVersion": 1, "version": {version}, "languageModule": {{ "name": "python" }} }}"#
    )
}

#[test]
fn test_install_package_downloads_and_promotes_bundle() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");

    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        zip_response(&[
            ("libY.plugin", &liby_descriptor(1)),
            ("scripts/main.py", "print('hello')"),
        ]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    manager.install_package("libY", None);

    let installed = base.path().join("plugins/libY");
    assert!(installed.join("libY.plugin").is_file());
    assert!(installed.join("scripts/main.py").is_file());

    // The reconciliation after the request sees the new package.
    let local = manager.find_local_package("libY").unwrap();
    assert_eq!(local.version, Version(1));

    // Install; Uninstall restores the filesystem to non-existent.
    manager.uninstall_package("libY");
    assert!(!installed.exists());
    assert!(manager.find_local_package("libY").is_none());
}

#[test]
fn test_install_rejects_non_zip_content_type() {
    let base = tempfile::tempdir().unwrap();
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        FetchResponse {
            status: HTTP_STATUS_OK,
            content_type: "text/html".into(),
            body: b"<html>not a package</html>".to_vec(),
        },
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    manager.install_package("libY", None);

    assert!(!base.path().join("plugins/libY").exists());
    assert!(manager.find_local_package("libY").is_none());
}

#[test]
fn test_install_already_installed_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    write_plugin(base.path(), "libY", "libY", 1, "python", "[]");
    write_module(base.path(), "py", 1, "python");

    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    manager.install_package("libY", None);

    // Still version 1 from disk; no download was attempted.
    assert_eq!(manager.find_local_package("libY").unwrap().version, Version(1));
}

#[test]
fn test_update_package_upgrades_to_newer_remote() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");
    write_plugin(base.path(), "libY", "libY", 1, "python", "[]");

    let manifest = r#"{
        "libY": {
            "name": "libY", "type": "plugin",
            "versions": [
                { "version": 1, "mirrors": ["https://dl/libY-1.zip"] },
                { "version": 2, "mirrors": ["https://dl/libY-2.zip"] }
            ]
        }
    }"#;
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(manifest));
    responses.insert(
        "https://dl/libY-2.zip".to_string(),
        zip_response(&[("libY.plugin", &liby_descriptor(2))]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    manager.update_package("libY", None);

    assert_eq!(manager.find_local_package("libY").unwrap().version, Version(2));
}

#[test]
fn test_checksum_mismatch_aborts_install() {
    let base = tempfile::tempdir().unwrap();
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        zip_response(&[("libY.plugin", &liby_descriptor(1))]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    let mut verified = VerifiedPackages::default();
    verified.insert("libY", Version(1), "00000000deadbeef");
    manager.set_verified_packages(verified);

    manager.install_package("libY", None);
    assert!(!base.path().join("plugins/libY").exists());
}

#[test]
fn test_unauthorized_package_is_not_downloaded() {
    let base = tempfile::tempdir().unwrap();
    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        zip_response(&[("libY.plugin", &liby_descriptor(1))]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    // Non-empty whitelist that does not contain libY.
    let mut verified = VerifiedPackages::default();
    verified.insert("other", Version(1), "");
    manager.set_verified_packages(verified);

    manager.install_package("libY", None);
    assert!(!base.path().join("plugins/libY").exists());
}

#[test]
fn test_install_all_packages_from_manifest_file() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");

    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        zip_response(&[("libY.plugin", &liby_descriptor(1))]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);

    fs::write(base.path().join("wanted.manifest"), LIBY_MANIFEST).unwrap();
    manager
        .install_all_packages(Path::new("wanted.manifest"), false)
        .unwrap();

    assert!(manager.find_local_package("libY").is_some());

    // Wrong extension is rejected up front.
    fs::write(base.path().join("wanted.json"), LIBY_MANIFEST).unwrap();
    assert!(manager
        .install_all_packages(Path::new("wanted.json"), false)
        .is_err());
}

#[test]
fn test_install_missed_packages_resolves_conflicts() {
    let base = tempfile::tempdir().unwrap();
    write_module(base.path(), "py", 1, "python");
    write_plugin(
        base.path(),
        "A",
        "A",
        1,
        "python",
        r#"[ { "name": "libY", "requestedVersion": 1 } ]"#,
    );

    let mut responses = HashMap::new();
    responses.insert("https://repo".to_string(), manifest_response(LIBY_MANIFEST));
    responses.insert(
        "https://dl/libY.zip".to_string(),
        zip_response(&[("libY.plugin", &liby_descriptor(1))]),
    );

    let mut manager = manager_with(base.path(), &["https://repo"], responses);
    assert!(manager.missed_packages().contains_key("libY"));

    manager.install_missed_packages();

    assert!(manager.find_local_package("libY").is_some());
    assert!(manager.missed_packages().is_empty());
}
