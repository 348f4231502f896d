//! Error types for MusicXML conversion
//!
//! Parse errors are fatal: without a readable `score-partwise` tree there is
//! nothing to build. MSR errors come from the builder and are only fatal
//! when the translator is asked to abort on them.

use crate::msr::MsrError;
use thiserror::Error;

/// Top-level conversion error type
#[derive(Debug, Clone, Error)]
pub enum ConversionError {
    /// Fatal XML parsing error
    #[error("XML parsing failed: {0}")]
    ParseError(#[from] ParseError),

    /// The source violates an MSR invariant
    #[error("MSR construction failed: {0}")]
    Msr(#[from] MsrError),

    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    /// Output could not be produced from a finished score
    #[error("Internal conversion error: {0}")]
    InternalError(String),
}

/// Fatal XML parsing errors
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// XML is malformed (not well-formed)
    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    /// MusicXML format not supported (e.g., timewise instead of partwise)
    #[error("Unsupported MusicXML format: {0}")]
    UnsupportedFormat(String),

    /// Required structural element is missing
    #[error("Missing required element: {0}")]
    MissingRequiredElement(String),

    /// Element present but its content cannot be used
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
