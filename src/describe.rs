//! Top-level entry points.
//!
//! [`describe_path`] is the one-call API: it connects to Ollama, binds the
//! pdfium rasteriser lazily (only when a PDF is actually rendered), and runs
//! the dispatcher over a file or directory. [`describe_path_with`] takes the
//! collaborators explicitly, which is what tests and embedders with their own
//! backend use.

use crate::config::DescribeConfig;
use crate::error::DescribeError;
use crate::output::BatchOutput;
use crate::pipeline::client::{InferenceBackend, OllamaClient};
use crate::pipeline::dispatch::{self, DispatchContext, InputPlan};
use crate::pipeline::document::DocumentContext;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::unit::UnitContext;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Describe every image and PDF under `input`, writing records to `output_dir`.
///
/// # Errors
/// - [`DescribeError::NotFound`] if `input` does not exist
/// - [`DescribeError::ServiceUnavailable`] if Ollama cannot be reached
/// - any unit or document error, unless the config isolates failures
///
/// # Example
/// ```rust,no_run
/// use files2knowledge::{describe_path, DescribeConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DescribeConfig::builder().model("llava").build()?;
/// let out = describe_path("slides/", "descriptions/", &config).await?;
/// println!("{} image records, {} PDF summaries",
///     out.stats.image_records, out.stats.document_summaries);
/// # Ok(())
/// # }
/// ```
pub async fn describe_path(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &DescribeConfig,
) -> Result<BatchOutput, DescribeError> {
    let input = input.as_ref();
    if !input.exists() {
        return Err(DescribeError::NotFound {
            path: input.to_path_buf(),
        });
    }

    info!(
        "Connecting to {} (model '{}')",
        config.api_url, config.model
    );
    let backend: Arc<dyn InferenceBackend> = Arc::new(OllamaClient::from_config(config).await?);
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::new(
        config.max_rendered_pixels,
        config.pdfium_library_path.clone(),
    ));

    describe_path_with(input, output_dir, config, backend, rasterizer).await
}

/// Same as [`describe_path`] with caller-supplied collaborators.
pub async fn describe_path_with(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &DescribeConfig,
    backend: Arc<dyn InferenceBackend>,
    rasterizer: Arc<dyn Rasterizer>,
) -> Result<BatchOutput, DescribeError> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    let ctx = DispatchContext {
        document: DocumentContext {
            unit: UnitContext {
                backend: backend.as_ref(),
                prompt: config.effective_prompt(),
                progress: config.progress.as_ref(),
            },
            rasterizer,
        },
        concurrency: config.concurrency,
        failure_policy: config.failure_policy,
    };

    let output = dispatch::process_path(input, output_dir, &ctx).await?;
    info!(
        "Processing complete: {} image records, {} PDF summaries ({} pages), {} skipped, {} failed in {}ms",
        output.stats.image_records,
        output.stats.document_summaries,
        output.stats.page_records,
        output.stats.skipped,
        output.stats.failed,
        output.stats.duration_ms
    );
    info!("Output directory: {}", output_dir.display());
    Ok(output)
}

/// Synchronous wrapper around [`describe_path`].
///
/// Creates a temporary tokio runtime internally.
pub fn describe_path_sync(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &DescribeConfig,
) -> Result<BatchOutput, DescribeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DescribeError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(describe_path(input, output_dir, config))
}

/// List what [`describe_path`] would process, without contacting the backend.
pub fn plan(input: impl AsRef<Path>) -> Result<InputPlan, DescribeError> {
    dispatch::discover_inputs(input.as_ref())
}
