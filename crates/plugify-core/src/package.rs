//! Local and remote package catalogue types and the manifest wire format.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{LanguageModuleDescriptor, PluginDescriptor};
use crate::version::Version;

/// Descriptor file extension of plugins (without the dot).
pub const PLUGIN_EXTENSION: &str = "plugin";
/// Descriptor file extension of language modules (without the dot).
pub const MODULE_EXTENSION: &str = "module";
/// File extension of package manifests (without the dot).
pub const MANIFEST_EXTENSION: &str = "manifest";

/// Package type tag used by plugins; language modules use their language
/// name instead.
pub const PLUGIN_TYPE: &str = "plugin";

// =============================================================================
// Local packages
// =============================================================================

/// The parsed descriptor behind a local package.
#[derive(Debug, Clone)]
pub enum PackageDescriptor {
    Plugin(Arc<PluginDescriptor>),
    Module(Arc<LanguageModuleDescriptor>),
}

impl PackageDescriptor {
    pub fn version(&self) -> Version {
        match self {
            PackageDescriptor::Plugin(d) => d.version,
            PackageDescriptor::Module(d) => d.version,
        }
    }

    pub fn update_url(&self) -> &str {
        match self {
            PackageDescriptor::Plugin(d) => &d.update_url,
            PackageDescriptor::Module(d) => &d.update_url,
        }
    }

    pub fn download_url(&self) -> &str {
        match self {
            PackageDescriptor::Plugin(d) => &d.download_url,
            PackageDescriptor::Module(d) => &d.download_url,
        }
    }

    pub fn supported_platforms(&self) -> &[String] {
        match self {
            PackageDescriptor::Plugin(d) => &d.supported_platforms,
            PackageDescriptor::Module(d) => &d.supported_platforms,
        }
    }

    pub fn as_plugin(&self) -> Option<&Arc<PluginDescriptor>> {
        match self {
            PackageDescriptor::Plugin(d) => Some(d),
            PackageDescriptor::Module(_) => None,
        }
    }

    pub fn as_module(&self) -> Option<&Arc<LanguageModuleDescriptor>> {
        match self {
            PackageDescriptor::Module(d) => Some(d),
            PackageDescriptor::Plugin(_) => None,
        }
    }
}

/// A package installed on disk, keyed by name.
#[derive(Debug, Clone)]
pub struct LocalPackage {
    pub name: String,
    /// `"plugin"` or the module's language tag.
    pub kind: String,
    /// Path of the descriptor file.
    pub path: PathBuf,
    pub version: Version,
    pub descriptor: PackageDescriptor,
}

impl LocalPackage {
    pub fn is_plugin(&self) -> bool {
        self.kind == PLUGIN_TYPE
    }
}

// =============================================================================
// Remote packages
// =============================================================================

/// One installable version of a remote package.
///
/// Ordered and keyed by `version` alone so a [`RemotePackage`]'s version set
/// keeps exactly one entry per version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub version: Version,
    /// Empty means every platform.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Download locations, in preference order.
    #[serde(default)]
    pub mirrors: Vec<String>,
    /// Hex SHA-256 of the archive, when the publisher provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

/// A package advertised by a remote manifest.
///
/// Two remote packages are the same package when name and type agree
/// ([`is_same_package`](Self::is_same_package)); their version sets are
/// then merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePackage {
    pub name: String,
    /// `"plugin"` or a language tag; same domain as [`LocalPackage::kind`].
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub versions: BTreeSet<PackageVersion>,
}

impl RemotePackage {
    /// Identity for catalogue merging: `(name, type)`.
    pub fn is_same_package(&self, other: &RemotePackage) -> bool {
        self.name == other.name && self.kind == other.kind
    }
    /// The newest advertised version.
    pub fn latest_version(&self) -> Option<&PackageVersion> {
        self.versions.iter().next_back()
    }

    /// The advertised entry for an exact version.
    pub fn version(&self, version: Version) -> Option<&PackageVersion> {
        self.versions.iter().find(|v| v.version == version)
    }
}

impl From<&LocalPackage> for RemotePackage {
    /// Snapshot form of an installed package, as written by
    /// `SnapshotPackages`.
    fn from(package: &LocalPackage) -> Self {
        let descriptor = &package.descriptor;
        let mut mirrors = Vec::new();
        if !descriptor.download_url().is_empty() {
            mirrors.push(descriptor.download_url().to_string());
        }
        let mut versions = BTreeSet::new();
        versions.insert(PackageVersion {
            version: package.version,
            platforms: descriptor.supported_platforms().to_vec(),
            mirrors,
            checksum: None,
        });
        RemotePackage {
            name: package.name.clone(),
            kind: package.kind.clone(),
            author: String::new(),
            description: String::new(),
            versions,
        }
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// The `.manifest` document: a JSON object mapping package names to remote
/// packages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub content: BTreeMap<String, RemotePackage>,
}

impl Manifest {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self, prettify: bool) -> Result<String, serde_json::Error> {
        if prettify {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
