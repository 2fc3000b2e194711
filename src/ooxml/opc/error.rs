/// Error types for package-level operations
use crate::common::xml::XmlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    /// A part the caller relies on is absent. Treated as a structural defect.
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// A relationship is missing its id, type or target.
    #[error("Malformed relationship in {rels}: {reason}")]
    MalformedRelationship { rels: String, reason: String },

    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),

    /// A numbered series already reached `u32::MAX`.
    #[error("No number left after {0}")]
    NumberExhausted(String),

    #[error("XML error in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A markup part is not valid UTF-8.
    #[error("UTF-8 conversion error in {part}: {source}")]
    Utf8 {
        part: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

impl OpcError {
    pub(crate) fn xml(part: &str, source: XmlError) -> Self {
        match source {
            XmlError::Utf8(source) => OpcError::Utf8 {
                part: part.to_string(),
                source,
            },
            source => OpcError::Xml {
                part: part.to_string(),
                source,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;
