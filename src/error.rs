//! Error Handling Module
//!
//! Custom error types for the ingestion pipeline, built with `thiserror`.
//! Extraction and parsing carry separate taxonomies because they fail for
//! different reasons and are logged at different points of the poll cycle.
//! There is intentionally no aggregation error type: defaulted record data
//! is always absorbed by the metrics registry.

use thiserror::Error;

/// Failures while turning a raw attachment into XML bytes.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Size limit exceeded: {0}")]
    TooLarge(String),
}

/// Failures while decoding XML bytes into a report.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    MalformedXml(#[from] quick_xml::Error),

    #[error("Report is missing its report_id")]
    MissingIdentifier,

    #[error("Document rejected: {0}")]
    Rejected(String),
}
