//! Error types for qf-convert

use thiserror::Error;

/// Conversion error type
///
/// These use the `QC` prefix (Queryflow Conversion) so messages stay
/// greppable when surfaced through a caller's own error chain.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// QC001: Statement kind has no graph form
    ///
    /// The one hard failure in the pipeline; everything below statement
    /// level degrades to a less annotated graph instead of erroring.
    #[error("[QC001] Unsupported statement kind: {kind}")]
    UnsupportedStatement { kind: String },
}

/// Result type alias for ConvertError
pub type ConvertResult<T> = Result<T, ConvertError>;
