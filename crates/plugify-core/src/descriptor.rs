//! Plugin and language-module descriptor documents.
//!
//! Descriptors are JSON files with strict but forgiving parsing: missing
//! optional fields fall back to defaults, unknown fields are ignored, and
//! semantic violations (the reserved `"plugin"` language name) are rejected.
//! Duplicate dependencies and duplicate exported methods are de-duplicated
//! first-wins; callers are told so they can warn.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::method::Method;
use crate::platform::is_platform_supported;
use crate::version::Version;

/// Language name a plugin descriptor may never use for a module: it is the
/// package type tag of plugins themselves.
pub(crate) const RESERVED_LANGUAGE_NAME: &str = "plugin";

// =============================================================================
// Plugin descriptor
// =============================================================================

/// Reference to the language module a plugin is written against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageModuleInfo {
    pub name: String,
}

/// A dependency of a plugin on another plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReference {
    pub name: String,
    /// Optional dependencies do not gate loading or resolution.
    #[serde(default)]
    pub optional: bool,
    /// Empty means every platform.
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    /// `None` requests the latest available version.
    #[serde(default)]
    pub requested_version: Option<Version>,
}

impl PluginReference {
    /// A required dependency that matters on this host.
    pub fn is_relevant(&self) -> bool {
        !self.optional && is_platform_supported(&self.supported_platforms)
    }
}

/// The `.plugin` descriptor document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub file_version: i32,
    pub version: Version,
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_by_url: String,
    #[serde(default)]
    pub docs_url: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub update_url: String,
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    #[serde(default)]
    pub resource_directories: Vec<String>,
    /// Module-interpreted entry point (e.g. a script path or class name).
    #[serde(default)]
    pub entry_point: String,
    pub language_module: LanguageModuleInfo,
    #[serde(default)]
    pub dependencies: Vec<PluginReference>,
    #[serde(default)]
    pub exported_methods: Vec<Method>,
}

impl PluginDescriptor {
    /// Parses and sanitises a plugin descriptor.
    ///
    /// Duplicate dependencies and duplicate exported methods (same name) are
    /// removed first-wins, with a warning naming the package.
    pub fn parse(name: &str, json: &str) -> Result<Self, DescriptorError> {
        let mut descriptor: PluginDescriptor =
            serde_json::from_str(json).map_err(|source| DescriptorError::Parse {
                name: name.to_string(),
                source,
            })?;

        if remove_duplicates(&mut descriptor.dependencies, |d| d.name.clone()) {
            tracing::warn!(
                package = %name,
                "Plugin descriptor has multiple dependencies with the same name; keeping the first"
            );
        }
        if remove_duplicates(&mut descriptor.exported_methods, |m| m.name.clone()) {
            tracing::warn!(
                package = %name,
                "Plugin descriptor has multiple exported methods with the same name; keeping the first"
            );
        }

        Ok(descriptor)
    }

    pub fn is_platform_supported(&self) -> bool {
        is_platform_supported(&self.supported_platforms)
    }
}

// =============================================================================
// Language-module descriptor
// =============================================================================

/// The `.module` descriptor document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageModuleDescriptor {
    pub file_version: i32,
    pub version: Version,
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_by_url: String,
    #[serde(default)]
    pub docs_url: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub update_url: String,
    #[serde(default)]
    pub supported_platforms: Vec<String>,
    #[serde(default)]
    pub resource_directories: Vec<String>,
    /// The language this module can load plugins for. Unique across local
    /// modules; must not be the reserved name `"plugin"`.
    pub language: String,
    /// Extra directories searched for the module's native dependencies.
    #[serde(default)]
    pub library_directories: Vec<PathBuf>,
    /// Load the module even when no local plugin targets its language.
    #[serde(default)]
    pub force_load: bool,
    /// Library file name under the module's `bin/` directory.
    #[serde(default)]
    pub entry_point: String,
}

impl LanguageModuleDescriptor {
    /// Parses and validates a module descriptor, rejecting the reserved
    /// language name.
    pub fn parse(name: &str, json: &str) -> Result<Self, DescriptorError> {
        let descriptor: LanguageModuleDescriptor =
            serde_json::from_str(json).map_err(|source| DescriptorError::Parse {
                name: name.to_string(),
                source,
            })?;

        if descriptor.language == RESERVED_LANGUAGE_NAME {
            return Err(DescriptorError::ReservedLanguage {
                name: name.to_string(),
            });
        }

        Ok(descriptor)
    }

    pub fn is_platform_supported(&self) -> bool {
        is_platform_supported(&self.supported_platforms)
    }
}

// =============================================================================
// De-duplication
// =============================================================================

/// Removes duplicates from `items`, keeping the first occurrence of each
/// key and preserving order. Returns `true` when anything was dropped.
pub fn remove_duplicates<T, K, F>(items: &mut Vec<T>, key: F) -> bool
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let before = items.len();
    let mut seen: Vec<K> = Vec::with_capacity(before);
    items.retain(|item| {
        let k = key(item);
        if seen.contains(&k) {
            false
        } else {
            seen.push(k);
            true
        }
    });
    items.len() != before
}
