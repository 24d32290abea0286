//! Error types for the files2knowledge library.
//!
//! Two types reflect two failure scopes:
//!
//! * [`DescribeError`]: a failure that aborts the current unit, and by
//!   default the whole batch (missing input, backend down, a page that the
//!   model refused). Returned as `Err(DescribeError)` from the `describe*`
//!   entry points and from every pipeline stage.
//!
//! * [`InputFailure`]: one top-level input that failed while the batch ran
//!   with [`crate::config::FailurePolicy::Isolate`]. Stored in
//!   [`crate::output::BatchOutput::failures`] so siblings keep going and the
//!   caller still sees what went wrong.
//!
//! An unsupported file type is reported as [`DescribeError::UnsupportedType`]
//! by [`crate::pipeline::dispatch::classify_file`] but the dispatcher logs and
//! skips it instead of propagating.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the files2knowledge library.
#[derive(Debug, Error)]
pub enum DescribeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input path or image file does not exist.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// File extension is not one of the supported image or PDF types.
    #[error("Unsupported file type: '{path}'")]
    UnsupportedType { path: PathBuf },

    /// An image unit could not be decoded or resized.
    #[error("Could not read image '{path}': {detail}")]
    InvalidImage { path: PathBuf, detail: String },

    // ── Inference errors ──────────────────────────────────────────────────
    /// The inference backend could not be reached during the availability check.
    #[error("Inference service unavailable at '{endpoint}': {reason}\nIs Ollama running? Try: ollama serve")]
    ServiceUnavailable { endpoint: String, reason: String },

    /// A generation call failed after the service was confirmed reachable.
    #[error("Inference with model '{model}' failed: {detail}")]
    Inference { model: String, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document could not be decoded or a page could not be rendered.
    #[error("Rasterisation of '{path}' failed: {detail}")]
    Rasterization { path: PathBuf, detail: String },

    /// The native pdfium library could not be bound.
    #[error(
        "PDF rasteriser unavailable: {0}\n\n\
Rendering PDFs requires the pdfium shared library. Either:\n\
  • install libpdfium where the system loader can find it, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib).\n"
    )]
    RasterizerUnavailable(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output directory or write a record.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more inputs failed while failures were isolated.
    #[error("{failed}/{total} inputs failed\nFirst error: {first_error}")]
    BatchFailed {
        failed: usize,
        total: usize,
        first_error: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DescribeError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DescribeError::NotFound { .. } => "not_found",
            DescribeError::UnsupportedType { .. } => "unsupported_type",
            DescribeError::InvalidImage { .. } => "invalid_image",
            DescribeError::ServiceUnavailable { .. } => "service_unavailable",
            DescribeError::Inference { .. } => "inference",
            DescribeError::Rasterization { .. } => "rasterization",
            DescribeError::RasterizerUnavailable(_) => "rasterizer_unavailable",
            DescribeError::OutputWriteFailed { .. } => "output_write_failed",
            DescribeError::BatchFailed { .. } => "batch_failed",
            DescribeError::InvalidConfig(_) => "invalid_config",
            DescribeError::Internal(_) => "internal",
        }
    }
}

/// A top-level input that failed under [`crate::config::FailurePolicy::Isolate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFailure {
    /// The image or PDF that failed.
    pub path: PathBuf,
    /// Error kind, see [`DescribeError::kind`].
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
}

impl InputFailure {
    pub fn new(path: impl Into<PathBuf>, error: &DescribeError) -> Self {
        Self {
            path: path.into(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}
