//! Error types for nxswriter.

use thiserror::Error;

/// Result type alias for nxswriter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the node abstraction, the backends and the write engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation on a closed node or on a node whose backend handle was not rebound.
    #[error("stale handle: {0}")]
    StaleHandle(String),

    /// Type tag absent from the mapping table.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The backend refused to create a group, field, attribute or link.
    #[error("the {kind} '{name}' cannot be created: {message}")]
    ObjectCreate {
        kind: &'static str,
        name: String,
        message: String,
    },

    /// Attribute creation without overwrite on an existing name.
    #[error("attribute {0} exists")]
    DuplicateAttribute(String),

    /// Payload format/shape combination not covered by the placement rules.
    #[error("rank mismatch: {0}")]
    RankMismatch(String),

    /// No value for a step.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Named object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Slice specification that cannot be translated or exceeds the field extent.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Payload element count does not match the selected region.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Value cannot be converted to the requested element type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Mutation attempted on a file opened read-only.
    #[error("file is read-only: {0}")]
    ReadOnly(String),

    /// Decoder registration or decoding failure.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Diagnostic reported by the container library.
    #[error("backend error: {0}")]
    Backend(String),

    /// Writer configuration or layout that cannot be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error describes bad or missing per-step data.
    ///
    /// Only these errors are eligible for can-fail recovery; everything else
    /// is structural and always propagates.
    #[must_use]
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Error::DataUnavailable(_)
                | Error::RankMismatch(_)
                | Error::ShapeMismatch(_)
                | Error::Conversion(_)
                | Error::Decoder(_)
        )
    }

    /// Wraps a creation failure, keeping type-mapping errors as they are.
    #[must_use]
    pub fn creation(kind: &'static str, name: &str, source: Error) -> Self {
        match source {
            Error::UnsupportedType(_) | Error::ObjectCreate { .. } | Error::StaleHandle(_) => {
                source
            }
            other => Error::ObjectCreate {
                kind,
                name: name.to_string(),
                message: other.to_string(),
            },
        }
    }
}
