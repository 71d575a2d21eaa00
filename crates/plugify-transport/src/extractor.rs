//! Package bundle extraction.
//!
//! A bundle is a zip archive containing a descriptor file plus content. The
//! archive is validated before anything touches the filesystem: it must
//! carry at least one file with the expected descriptor extension, and no
//! entry may resolve outside the destination directory.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// Errors terminating an extraction. The staging directory is left as-is
/// for inspection; the caller decides whether to promote or discard it.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No file in the archive carries the expected descriptor extension.
    #[error("package descriptor *.{0} missing from archive")]
    MissingDescriptor(String),

    /// An entry name resolves outside the destination directory.
    #[error("archive entry '{0}' escapes the destination directory")]
    PathTraversal(String),

    #[error("failed reading archive: {0}")]
    Archive(#[from] ZipError),

    #[error("failed writing '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Unpacks `bytes` under `destination`, creating parent directories as
/// needed. `descriptor_ext` is the extension (without dot) that identifies
/// the bundle's descriptor file.
pub fn extract(bytes: &[u8], destination: &Path, descriptor_ext: &str) -> Result<(), ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    // Validation pass: every entry must stay inside the destination and at
    // least one file must be the descriptor.
    let mut found_descriptor = false;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::PathTraversal(entry.name().to_string()));
        };
        if !entry.is_dir()
            && relative.extension().map(|e| e == descriptor_ext).unwrap_or(false)
        {
            found_descriptor = true;
        }
    }
    if !found_descriptor {
        return Err(ExtractError::MissingDescriptor(descriptor_ext.to_string()));
    }

    // Write pass.
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        // Checked above; entries cannot change between passes.
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::PathTraversal(entry.name().to_string()));
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|source| ExtractError::Io {
                path: target.clone(),
                source,
            })?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ExtractError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut output = fs::File::create(&target).map_err(|source| ExtractError::Io {
            path: target.clone(),
            source,
        })?;
        io::copy(&mut entry, &mut output).map_err(|source| ExtractError::Io {
            path: target.clone(),
            source,
        })?;
    }

    debug!(
        destination = %destination.display(),
        entries = archive.len(),
        "Extraction complete"
    );
    Ok(())
}
