//! Local/remote package reconciliation and lifecycle operations.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use plugify_core::{
    is_platform_supported, Config, LanguageModuleDescriptor, LocalPackage, Manifest,
    PackageDescriptor, PackageVersion, PluginDescriptor, RemotePackage, Version,
    MANIFEST_EXTENSION, MODULE_EXTENSION, PLUGIN_EXTENSION, PLUGIN_TYPE,
};
use plugify_transport::{extract, HttpDownloader, HTTP_STATUS_OK};
use tracing::{debug, error, info, warn};

use crate::error::PackageError;
use crate::verify::VerifiedPackages;

/// How deep below the base directory descriptor files are searched for
/// (`plugins/<name>/<name>.plugin` sits at depth 3).
const DISCOVERY_DEPTH: usize = 3;

const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// A remote package queued for installation, with the version a dependant
/// pinned (or `None` for latest).
type MissedPackage = (RemotePackage, Option<Version>);

/// Reconciles the on-disk package set with remote manifests and performs
/// install/update/uninstall operations.
///
/// All methods run on the caller's thread. Download completion callbacks
/// run on downloader workers and only ever touch the remote catalogue,
/// which is mutex-guarded so concurrent manifest fetches merge
/// deterministically.
pub struct PackageManager {
    config: Arc<Config>,
    downloader: Option<HttpDownloader>,
    inited: bool,
    local: Vec<LocalPackage>,
    remote: Arc<Mutex<Vec<RemotePackage>>>,
    missed: BTreeMap<String, MissedPackage>,
    conflicted: Vec<LocalPackage>,
    /// `None` disables the integrity hooks (the default); the policy is
    /// supplied externally.
    verified: Option<VerifiedPackages>,
}

impl PackageManager {
    pub fn new(config: Arc<Config>) -> Self {
        PackageManager {
            config,
            downloader: None,
            inited: false,
            local: Vec::new(),
            remote: Arc::new(Mutex::new(Vec::new())),
            missed: BTreeMap::new(),
            conflicted: Vec::new(),
            verified: None,
        }
    }

    /// Creates a manager with a caller-supplied downloader (tests inject an
    /// in-memory backend this way).
    pub fn with_downloader(config: Arc<Config>, downloader: HttpDownloader) -> Self {
        let mut manager = Self::new(config);
        manager.downloader = Some(downloader);
        manager
    }

    /// Builds the downloader (fatal on failure) and performs the initial
    /// local → remote → dependency reconciliation.
    pub fn initialize(&mut self) -> Result<(), PackageError> {
        if self.inited {
            return Err(PackageError::AlreadyInitialized);
        }
        let start = Instant::now();
        if self.downloader.is_none() {
            self.downloader = Some(HttpDownloader::create()?);
        }
        self.inited = true;
        self.load_local_packages();
        self.load_remote_packages();
        self.find_dependencies();
        debug!(elapsed = ?start.elapsed(), "Package manager initialized");
        Ok(())
    }

    pub fn terminate(&mut self) {
        if let Some(downloader) = &self.downloader {
            downloader.wait_for_all_requests();
        }
        self.local.clear();
        self.remote.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.missed.clear();
        self.conflicted.clear();
        self.downloader = None;
        self.inited = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.inited
    }

    /// Installs the external whitelist/checksum table, enabling the
    /// integrity hooks for subsequent downloads.
    pub fn set_verified_packages(&mut self, verified: VerifiedPackages) {
        self.verified = Some(verified);
    }

    // ─── Catalogue loading ───────────────────────────────────────────────────

    /// Walks the base directory and parses every platform-applicable
    /// descriptor into a local package. On duplicate names the higher
    /// version wins; equal versions keep the first occurrence.
    pub fn load_local_packages(&mut self) {
        debug!("Loading local packages");
        self.local.clear();

        let mut descriptor_files = Vec::new();
        collect_descriptor_files(&self.config.base_dir, DISCOVERY_DEPTH, &mut descriptor_files);

        for path in descriptor_files {
            let Some(package) = load_package_from_descriptor(&path) else {
                continue;
            };
            match self.local.iter_mut().find(|p| p.name == package.name) {
                None => self.local.push(package),
                Some(existing) => {
                    if existing.version != package.version {
                        warn!(
                            package = %package.name,
                            kept = %existing.version.max(package.version),
                            ignored = %existing.version.min(package.version),
                            "By default, prioritizing the newer version of a duplicated package"
                        );
                        if existing.version < package.version {
                            *existing = package;
                        }
                    } else {
                        warn!(
                            package = %package.name,
                            version = %existing.version,
                            path = %path.display(),
                            "The same version of this package exists at a second location; ignoring it"
                        );
                    }
                }
            }
        }
    }

    /// Fetches every configured repository manifest plus the `updateUrl` of
    /// each local package and merges the results into the remote catalogue.
    pub fn load_remote_packages(&mut self) {
        debug!("Loading remote packages");
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let Some(downloader) = &self.downloader else {
            error!("Package manager is not initialized");
            return;
        };

        let mut urls: Vec<String> = self
            .config
            .repositories
            .iter()
            .filter(|url| !url.is_empty())
            .cloned()
            .collect();
        for package in &self.local {
            let url = package.descriptor.update_url();
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }

        for url in urls {
            let remote = Arc::clone(&self.remote);
            let source = url.clone();
            downloader.create_request(url, move |status, _content_type, body| {
                if status != HTTP_STATUS_OK {
                    error!(url = %source, status, "Failed fetching package manifest");
                    return;
                }
                let text = String::from_utf8_lossy(body);
                let manifest = match Manifest::parse(&text) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        error!(url = %source, error = %e, "Package manifest has a JSON parsing error");
                        return;
                    }
                };
                merge_manifest(&remote, manifest, &source);
            });
        }

        downloader.wait_for_all_requests();
    }

    /// Resolves every local plugin's language module and required
    /// dependencies, populating the missed and conflicted sets.
    pub fn find_dependencies(&mut self) {
        self.missed.clear();
        self.conflicted.clear();

        let locals = self.local.clone();
        for package in &locals {
            let PackageDescriptor::Plugin(descriptor) = &package.descriptor else {
                continue;
            };

            let lang = &descriptor.language_module.name;
            if !locals.iter().any(|p| &p.kind == lang) {
                if let Some(remote) = self.find_remote_by_kind(lang) {
                    // Language modules default to the latest version.
                    self.missed
                        .entry(lang.clone())
                        .or_insert_with(|| (remote, None));
                } else {
                    error!(
                        package = %package.name,
                        language = %lang,
                        "Plugin requires a language module that is not available locally or remotely"
                    );
                    self.conflicted.push(package.clone());
                    continue;
                }
            }

            for dependency in descriptor.dependencies.iter().filter(|d| d.is_relevant()) {
                if let Some(local) = locals.iter().find(|p| p.name == dependency.name) {
                    if let Some(requested) = dependency.requested_version {
                        if requested != local.version {
                            error!(
                                package = %package.name,
                                dependency = %dependency.name,
                                requested = %requested,
                                installed = %local.version,
                                "Dependency version mismatch; conflict cannot be resolved automatically"
                            );
                        }
                    }
                    continue;
                }

                let Some(remote) = self.find_remote_package(&dependency.name) else {
                    error!(
                        package = %package.name,
                        dependency = %dependency.name,
                        "Dependency could not be found locally or remotely"
                    );
                    self.conflicted.push(package.clone());
                    continue;
                };

                if let Some(requested) = dependency.requested_version {
                    if remote.version(requested).is_none() {
                        error!(
                            package = %package.name,
                            dependency = %dependency.name,
                            requested = %requested,
                            "Requested dependency version is not available remotely"
                        );
                        self.conflicted.push(package.clone());
                        continue;
                    }
                }

                match self.missed.entry(dependency.name.clone()) {
                    std::collections::btree_map::Entry::Vacant(entry) => {
                        entry.insert((remote, dependency.requested_version));
                    }
                    std::collections::btree_map::Entry::Occupied(mut entry) => {
                        if let Some(requested) = dependency.requested_version {
                            let (_, existing_version) = entry.get_mut();
                            match *existing_version {
                                Some(existing) if existing != requested => {
                                    warn!(
                                        dependency = %dependency.name,
                                        kept = %existing.max(requested),
                                        ignored = %existing.min(requested),
                                        "By default, prioritizing the newer requested version of a dependency"
                                    );
                                    if existing < requested {
                                        *existing_version = Some(requested);
                                    }
                                }
                                Some(existing) => {
                                    warn!(
                                        dependency = %dependency.name,
                                        version = %existing,
                                        package = %package.name,
                                        "The same dependency version is requested twice; ignoring the second request"
                                    );
                                }
                                None => *existing_version = Some(requested),
                            }
                        }
                    }
                }
            }
        }

        for (name, (package, version)) in &self.missed {
            match version {
                Some(version) => {
                    info!(package = %name, kind = %package.kind, version = %version, "Required to install")
                }
                None => {
                    info!(package = %name, kind = %package.kind, version = "latest", "Required to install")
                }
            }
        }
        for package in &self.conflicted {
            warn!(
                package = %package.name,
                kind = %package.kind,
                version = %package.version,
                "Unable to install due to unresolved conflicts"
            );
        }
    }

    // ─── Request barrier ─────────────────────────────────────────────────────

    /// Runs a mutating action, waits for every download it initiated, then
    /// re-runs the full reconciliation pass.
    fn request<F: FnOnce(&mut Self)>(&mut self, operation: &str, action: F) {
        let start = Instant::now();
        action(self);
        if let Some(downloader) = &self.downloader {
            downloader.wait_for_all_requests();
        }
        self.load_local_packages();
        self.load_remote_packages();
        self.find_dependencies();
        debug!(operation, elapsed = ?start.elapsed(), "Request processed");
    }

    // ─── Install ─────────────────────────────────────────────────────────────

    pub fn install_package(&mut self, name: &str, version: Option<Version>) {
        if name.is_empty() {
            return;
        }
        self.request("install_package", |manager| {
            match manager.find_remote_package(name) {
                Some(package) => {
                    manager.install_remote(&package, version);
                }
                None => error!(package = %name, "Package not found remotely"),
            }
        });
    }

    /// Installs several packages by name, skipping duplicates and reporting
    /// the ones no remote advertises.
    pub fn install_packages<S: AsRef<str>>(&mut self, names: &[S]) {
        self.request("install_packages", |manager| {
            let mut seen = Vec::new();
            let mut not_found = Vec::new();
            for name in names {
                let name = name.as_ref();
                if name.is_empty() || seen.contains(&name) {
                    continue;
                }
                seen.push(name);
                match manager.find_remote_package(name) {
                    Some(package) => {
                        manager.install_remote(&package, None);
                    }
                    None => not_found.push(name.to_string()),
                }
            }
            if !not_found.is_empty() {
                error!(packages = ?not_found, "Packages not found remotely");
            }
        });
    }

    /// Installs everything currently recorded as missed.
    pub fn install_missed_packages(&mut self) {
        self.request("install_missed_packages", |manager| {
            let missed: Vec<MissedPackage> = manager.missed.values().cloned().collect();
            if missed.is_empty() {
                return;
            }
            let names: Vec<&str> = missed.iter().map(|(p, _)| p.name.as_str()).collect();
            info!(packages = ?names, "Installing missing packages to solve dependency issues");
            for (package, version) in &missed {
                manager.install_remote(package, *version);
            }
        });
    }

    /// Installs every package of a local manifest file. Already-installed
    /// names are skipped unless `reinstall` is set.
    pub fn install_all_packages(
        &mut self,
        manifest_path: &Path,
        reinstall: bool,
    ) -> Result<(), PackageError> {
        if manifest_path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
            return Err(PackageError::ManifestExtension(manifest_path.to_path_buf()));
        }
        let path = self.config.base_dir.join(manifest_path);
        info!(path = %path.display(), "Reading package manifest");

        let text = fs::read_to_string(&path).map_err(|source| PackageError::ManifestIo {
            path: path.clone(),
            source,
        })?;
        let manifest = Manifest::parse(&text).map_err(|source| PackageError::ManifestParse {
            path: path.clone(),
            source,
        })?;

        self.install_from_manifest(manifest, reinstall);
        Ok(())
    }

    /// Installs every package of a manifest fetched from a URL.
    pub fn install_all_packages_from_url(&mut self, manifest_url: &str, reinstall: bool) {
        if manifest_url.is_empty() {
            return;
        }
        let Some(downloader) = &self.downloader else {
            error!("Package manager is not initialized");
            return;
        };
        info!(url = %manifest_url, "Reading package manifest");

        let fetched: Arc<Mutex<Option<Manifest>>> = Arc::new(Mutex::new(None));
        {
            let fetched = Arc::clone(&fetched);
            let source = manifest_url.to_string();
            downloader.create_request(manifest_url, move |status, _content_type, body| {
                if status != HTTP_STATUS_OK {
                    error!(url = %source, status, "Failed fetching package manifest");
                    return;
                }
                let text = String::from_utf8_lossy(body);
                match Manifest::parse(&text) {
                    Ok(manifest) => {
                        *fetched.lock().unwrap_or_else(|e| e.into_inner()) = Some(manifest)
                    }
                    Err(e) => {
                        error!(url = %source, error = %e, "Package manifest has a JSON parsing error")
                    }
                }
            });
        }
        downloader.wait_for_all_requests();

        let manifest = fetched.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(manifest) = manifest {
            self.install_from_manifest(manifest, reinstall);
        }
    }

    fn install_from_manifest(&mut self, mut manifest: Manifest, reinstall: bool) {
        if !reinstall {
            for package in &self.local {
                manifest.content.remove(&package.name);
            }
        }
        if manifest.content.is_empty() {
            warn!("No packages to install were found; use the reinstall flag to reinstall installed packages");
            return;
        }
        self.request("install_all_packages", |manager| {
            for (name, package) in &manifest.content {
                if name.is_empty() || &package.name != name {
                    error!(
                        key = %name,
                        name = %package.name,
                        "Package manifest entry has a different name in key and object"
                    );
                    continue;
                }
                manager.install_remote(package, None);
            }
        });
    }

    /// Resolves the requested (or latest) version and starts the download.
    fn install_remote(&mut self, package: &RemotePackage, version: Option<Version>) -> bool {
        if let Some(local) = self.find_local_package(&package.name) {
            warn!(
                package = %package.name,
                version = %local.version,
                "Package already installed"
            );
            return false;
        }

        let resolved = match version {
            Some(requested) => package.version(requested),
            None => package.latest_version(),
        };
        let Some(resolved) = resolved else {
            match version {
                Some(requested) => {
                    warn!(package = %package.name, version = %requested, "Package version has not been found")
                }
                None => warn!(package = %package.name, "Package has no versions"),
            }
            return false;
        };
        if !is_platform_supported(&resolved.platforms) {
            return false;
        }

        self.download_package(&package.name, &package.kind, resolved)
    }

    // ─── Update ──────────────────────────────────────────────────────────────

    pub fn update_package(&mut self, name: &str, version: Option<Version>) {
        if name.is_empty() {
            return;
        }
        self.request("update_package", |manager| {
            match manager.find_local_package(name) {
                Some(package) => {
                    manager.update_local(&package, version);
                }
                None => error!(package = %name, "Package not found locally"),
            }
        });
    }

    pub fn update_packages<S: AsRef<str>>(&mut self, names: &[S]) {
        self.request("update_packages", |manager| {
            let mut seen = Vec::new();
            let mut not_found = Vec::new();
            for name in names {
                let name = name.as_ref();
                if name.is_empty() || seen.contains(&name) {
                    continue;
                }
                seen.push(name);
                match manager.find_local_package(name) {
                    Some(package) => {
                        manager.update_local(&package, None);
                    }
                    None => not_found.push(name.to_string()),
                }
            }
            if !not_found.is_empty() {
                error!(packages = ?not_found, "Packages not found locally");
            }
        });
    }

    pub fn update_all_packages(&mut self) {
        self.request("update_all_packages", |manager| {
            for package in manager.local.clone() {
                manager.update_local(&package, None);
            }
        });
    }

    /// Requires a remote counterpart; logs whether the chosen version is an
    /// upgrade, reinstall, or downgrade, then follows the install path.
    fn update_local(&mut self, package: &LocalPackage, version: Option<Version>) -> bool {
        let Some(remote) = self.find_remote_package(&package.name) else {
            warn!(package = %package.name, "Package has no remote counterpart");
            return false;
        };

        let resolved = match version {
            Some(requested) => {
                let Some(resolved) = remote.version(requested) else {
                    warn!(package = %package.name, version = %requested, "Package version has not been found");
                    return false;
                };
                let change = match resolved.version.cmp(&package.version) {
                    std::cmp::Ordering::Greater => "upgraded",
                    std::cmp::Ordering::Equal => "reinstalled",
                    std::cmp::Ordering::Less => "downgraded",
                };
                info!(
                    package = %package.name,
                    from = %package.version,
                    to = %resolved.version,
                    "Package will be {change}"
                );
                resolved
            }
            None => {
                let Some(resolved) = remote.latest_version() else {
                    warn!(package = %package.name, "Package has no remote versions");
                    return false;
                };
                if resolved.version <= package.version {
                    warn!(package = %package.name, "Package has no update available");
                    return false;
                }
                info!(
                    package = %package.name,
                    from = %package.version,
                    to = %resolved.version,
                    "Update available"
                );
                resolved
            }
        };
        if !is_platform_supported(&resolved.platforms) {
            return false;
        }

        let resolved = resolved.clone();
        self.download_package(&remote.name, &remote.kind, &resolved)
    }

    // ─── Uninstall ───────────────────────────────────────────────────────────

    pub fn uninstall_package(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.request("uninstall_package", |manager| {
            match manager.find_local_package(name) {
                Some(package) => {
                    manager.uninstall_local(&package, true);
                }
                None => error!(package = %name, "Package not found locally"),
            }
        });
    }

    pub fn uninstall_packages<S: AsRef<str>>(&mut self, names: &[S]) {
        self.request("uninstall_packages", |manager| {
            let mut seen = Vec::new();
            let mut not_found = Vec::new();
            for name in names {
                let name = name.as_ref();
                if name.is_empty() || seen.contains(&name) {
                    continue;
                }
                seen.push(name);
                match manager.find_local_package(name) {
                    Some(package) => {
                        manager.uninstall_local(&package, true);
                    }
                    None => not_found.push(name.to_string()),
                }
            }
            if !not_found.is_empty() {
                error!(packages = ?not_found, "Packages not found locally");
            }
        });
    }

    pub fn uninstall_all_packages(&mut self) {
        self.request("uninstall_all_packages", |manager| {
            for package in manager.local.clone() {
                manager.uninstall_local(&package, false);
            }
            manager.local.clear();
        });
    }

    /// Removes every conflicted local package.
    pub fn uninstall_conflicted_packages(&mut self) {
        self.request("uninstall_conflicted_packages", |manager| {
            let conflicted = manager.conflicted.clone();
            if conflicted.is_empty() {
                return;
            }
            let names: Vec<&str> = conflicted.iter().map(|p| p.name.as_str()).collect();
            info!(packages = ?names, "Uninstalling conflicted packages to solve dependency issues");
            for package in &conflicted {
                manager.uninstall_local(package, true);
            }
        });
    }

    /// Deletes the package's directory recursively; optionally removes the
    /// in-memory entry too.
    fn uninstall_local(&mut self, package: &LocalPackage, remove_entry: bool) -> bool {
        let Some(package_dir) = package.path.parent() else {
            error!(package = %package.name, "Package path has no parent directory");
            return false;
        };
        if let Err(e) = fs::remove_dir_all(package_dir) {
            error!(
                package = %package.name,
                path = %package_dir.display(),
                error = %e,
                "Failed removing package directory"
            );
            return false;
        }
        if remove_entry {
            self.local.retain(|p| p.name != package.name);
        }
        info!(
            package = %package.name,
            version = %package.version,
            path = %package_dir.display(),
            "Package removed"
        );
        true
    }

    // ─── Snapshot ────────────────────────────────────────────────────────────

    /// Writes a manifest describing the current local set.
    pub fn snapshot_packages(&self, path: &Path, prettify: bool) -> Result<(), PackageError> {
        let start = Instant::now();

        let mut manifest = Manifest::default();
        for package in &self.local {
            manifest
                .content
                .insert(package.name.clone(), RemotePackage::from(package));
        }
        if manifest.content.is_empty() {
            warn!("No local packages to snapshot");
            return Ok(());
        }

        let json = manifest
            .to_json(prettify)
            .map_err(|source| PackageError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, json).map_err(|source| PackageError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), elapsed = ?start.elapsed(), "Snapshot created");
        Ok(())
    }

    // ─── Download & integrity ────────────────────────────────────────────────

    /// Enqueues the archive download; the completion callback validates,
    /// extracts into a staging directory, and promotes it atomically.
    fn download_package(&self, name: &str, kind: &str, version: &PackageVersion) -> bool {
        if self.verified.is_some() && !self.is_package_authorized(name, version.version) {
            warn!(package = %name, "Tried to download a package that is not authorized; aborting");
            return false;
        }
        let Some(mirror) = version.mirrors.first() else {
            error!(package = %name, "Package version has no download mirrors");
            return false;
        };
        let Some(downloader) = &self.downloader else {
            error!("Package manager is not initialized");
            return false;
        };

        debug!(package = %name, url = %mirror, "Start downloading");

        let is_plugin = kind == PLUGIN_TYPE;
        let (folder, extension) = if is_plugin {
            ("plugins", PLUGIN_EXTENSION)
        } else {
            ("modules", MODULE_EXTENSION)
        };
        let destination_root = self.config.base_dir.join(folder);
        let package_name = name.to_string();
        let verified = self.verified.clone();
        let expected_version = version.version;

        downloader.create_request(mirror.clone(), move |status, content_type, body| {
            if status != HTTP_STATUS_OK {
                error!(package = %package_name, status, "Failed downloading");
                return;
            }
            debug!(package = %package_name, "Done downloading");

            if content_type != ARCHIVE_CONTENT_TYPE {
                error!(
                    package = %package_name,
                    content_type = %content_type,
                    "Package must be a zip archive to be extracted correctly"
                );
                return;
            }
            if let Some(verified) = &verified {
                if !verified.is_legit(&package_name, expected_version, body) {
                    warn!(
                        package = %package_name,
                        "Archive hash does not match the expected checksum; aborting"
                    );
                    return;
                }
            }

            let staging = destination_root.join(format!("{package_name}-{}", timestamp()));
            if let Err(e) = fs::create_dir_all(&staging) {
                error!(path = %staging.display(), error = %e, "Error creating staging directory");
                return;
            }

            match extract(body, &staging, extension) {
                Ok(()) => {
                    debug!(package = %package_name, "Done extracting");
                    let destination = destination_root.join(&package_name);
                    // A failed promote leaves the staging directory behind
                    // for inspection.
                    if destination.exists() {
                        if let Err(e) = fs::remove_dir_all(&destination) {
                            error!(path = %destination.display(), error = %e, "Failed replacing existing package directory");
                            return;
                        }
                    }
                    if let Err(e) = fs::rename(&staging, &destination) {
                        error!(
                            package = %package_name,
                            from = %staging.display(),
                            to = %destination.display(),
                            error = %e,
                            "Failed promoting extracted package"
                        );
                    }
                }
                Err(e) => {
                    error!(package = %package_name, error = %e, "Failed extracting");
                }
            }
        });

        true
    }

    /// Whitelist gate; permissive while verification is disabled.
    pub fn is_package_authorized(&self, name: &str, version: Version) -> bool {
        match &self.verified {
            Some(verified) => verified.is_authorized(name, version),
            None => true,
        }
    }

    /// Checksum gate; permissive while verification is disabled.
    pub fn is_package_legit(&self, name: &str, version: Version, bytes: &[u8]) -> bool {
        match &self.verified {
            Some(verified) => verified.is_legit(name, version, bytes),
            None => true,
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    pub fn find_local_package(&self, name: &str) -> Option<LocalPackage> {
        self.local.iter().find(|p| p.name == name).cloned()
    }

    pub fn find_remote_package(&self, name: &str) -> Option<RemotePackage> {
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    fn find_remote_by_kind(&self, kind: &str) -> Option<RemotePackage> {
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.kind == kind)
            .cloned()
    }

    pub fn local_packages(&self) -> &[LocalPackage] {
        &self.local
    }

    pub fn remote_packages(&self) -> Vec<RemotePackage> {
        self.remote
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn missed_packages(&self) -> &BTreeMap<String, MissedPackage> {
        &self.missed
    }

    pub fn conflicted_packages(&self) -> &[LocalPackage] {
        &self.conflicted
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Merges one fetched manifest into the shared remote catalogue. Entries
/// whose key and name disagree are rejected; packages already present merge
/// version sets when `(name, type)` matches and are ignored with a warning
/// otherwise.
fn merge_manifest(remote: &Mutex<Vec<RemotePackage>>, manifest: Manifest, source: &str) {
    let mut remote = remote.lock().unwrap_or_else(|e| e.into_inner());
    for (name, package) in manifest.content {
        if name.is_empty() || package.name != name {
            error!(
                url = %source,
                key = %name,
                name = %package.name,
                "Package manifest entry has a different name in key and object"
            );
            continue;
        }
        match remote.iter_mut().find(|p| p.name == name) {
            None => remote.push(package),
            Some(existing) => {
                if existing.is_same_package(&package) {
                    existing.versions.extend(package.versions);
                } else {
                    warn!(
                        package = %name,
                        url = %source,
                        "The package exists in another repository with a different type; ignoring this copy"
                    );
                }
            }
        }
    }
}

/// Collects descriptor files (`.plugin` / `.module`) up to `depth` levels
/// below `dir`.
fn collect_descriptor_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth == 0 {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_descriptor_files(&path, depth - 1, out);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(PLUGIN_EXTENSION) | Some(MODULE_EXTENSION)
        ) {
            out.push(path);
        }
    }
}

/// Parses one descriptor file into a local package. Platform-incompatible
/// descriptors are dropped silently; schema violations drop the package
/// with an error log.
fn load_package_from_descriptor(path: &Path) -> Option<LocalPackage> {
    let extension = path.extension()?.to_str()?;
    let name = path.file_stem()?.to_str()?.to_string();
    if name.is_empty() {
        return None;
    }

    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed reading descriptor");
            return None;
        }
    };

    if extension == MODULE_EXTENSION {
        match LanguageModuleDescriptor::parse(&name, &json) {
            Ok(descriptor) => {
                if !descriptor.is_platform_supported() {
                    return None;
                }
                Some(LocalPackage {
                    name,
                    kind: descriptor.language.clone(),
                    path: path.to_path_buf(),
                    version: descriptor.version,
                    descriptor: PackageDescriptor::Module(Arc::new(descriptor)),
                })
            }
            Err(e) => {
                error!("{e}");
                None
            }
        }
    } else {
        match PluginDescriptor::parse(&name, &json) {
            Ok(descriptor) => {
                if !descriptor.is_platform_supported() {
                    return None;
                }
                Some(LocalPackage {
                    name,
                    kind: PLUGIN_TYPE.to_string(),
                    path: path.to_path_buf(),
                    version: descriptor.version,
                    descriptor: PackageDescriptor::Plugin(Arc::new(descriptor)),
                })
            }
            Err(e) => {
                error!("{e}");
                None
            }
        }
    }
}

/// Staging-directory suffix derived from the wall clock.
fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}_{:03}", now.as_secs(), now.subsec_millis())
}
