//! Host platform identification and applicability checks.

/// The platform tag of the machine this runtime was compiled for.
///
/// Compared verbatim against the `supportedPlatforms` entries of descriptors
/// and package versions.
pub fn host_platform() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        "unknown"
    }
}

/// Returns `true` when the supported-platforms set is empty (no restriction)
/// or contains the host tag.
pub fn is_platform_supported(platforms: &[String]) -> bool {
    supports(platforms, host_platform())
}

pub(crate) fn supports(platforms: &[String], host: &str) -> bool {
    platforms.is_empty() || platforms.iter().any(|p| p == host)
}
