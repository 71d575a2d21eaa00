//! Descriptor-level error types.

use thiserror::Error;

/// Errors raised while parsing and validating descriptor documents.
///
/// Per the catalogue policy, a descriptor error drops the offending package
/// with a warning; it never aborts discovery of other packages.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The document is not valid JSON or violates the schema.
    #[error("package '{name}' has a JSON parsing error: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A module descriptor claimed the reserved language name.
    #[error("module descriptor '{name}' uses the forbidden language name \"plugin\"")]
    ReservedLanguage { name: String },
}
