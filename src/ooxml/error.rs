/// Error types for composition operations.
use thiserror::Error;

/// Result type for composition operations.
pub type Result<T> = std::result::Result<T, OoxmlError>;

/// Error types for composition operations.
///
/// Structural defects of a package abort composition and surface here.
/// Lookup misses and hook failures do not; they are reported as outcomes.
#[derive(Error, Debug)]
pub enum OoxmlError {
    /// OPC package error
    #[error("OPC error: {0}")]
    Opc(#[from] crate::ooxml::opc::error::OpcError),

    /// Invalid or unreadable options
    #[error("Configuration error: {0}")]
    Config(String),

    /// A part is present but not shaped the way composition needs
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

