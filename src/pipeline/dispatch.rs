//! Path dispatcher: classify the input, enumerate files, route each one.
//!
//! A single file is routed by extension; a directory is walked recursively.
//! PDFs are processed first, then images. Unsupported files are logged and
//! skipped, never an error.

use crate::config::FailurePolicy;
use crate::error::{DescribeError, InputFailure};
use crate::output::BatchOutput;
use crate::pipeline::document::{process_document, DocumentContext};
use crate::pipeline::unit::{process_unit, ProcessingUnit};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Image extensions accepted as standalone units (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// Extension of multi-page documents.
pub const PDF_EXTENSION: &str = "pdf";

/// What a supported input file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Pdf,
    Image,
}

/// Classify a file by its extension.
///
/// Returns [`DescribeError::UnsupportedType`] for anything that is neither a
/// PDF nor a supported image.
pub fn classify_file(path: &Path) -> Result<InputKind, DescribeError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if ext == PDF_EXTENSION {
        Ok(InputKind::Pdf)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(InputKind::Image)
    } else {
        Err(DescribeError::UnsupportedType {
            path: path.to_path_buf(),
        })
    }
}

/// The files one invocation will process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPlan {
    pub pdfs: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl InputPlan {
    /// Inputs in processing order: PDFs, then images.
    pub fn ordered(&self) -> impl Iterator<Item = (&Path, InputKind)> {
        self.pdfs
            .iter()
            .map(|p| (p.as_path(), InputKind::Pdf))
            .chain(self.images.iter().map(|p| (p.as_path(), InputKind::Image)))
    }

    pub fn len(&self) -> usize {
        self.pdfs.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, path: PathBuf) {
        match classify_file(&path) {
            Ok(InputKind::Pdf) => self.pdfs.push(path),
            Ok(InputKind::Image) => self.images.push(path),
            Err(_) => self.skipped.push(path),
        }
    }
}

/// Enumerate the supported files under `input`.
///
/// A file yields itself (or a skip); a directory is walked recursively in
/// sorted order without following symlinked directories. Directories that
/// cannot be read end up in [`InputPlan::skipped`].
pub fn discover_inputs(input: &Path) -> Result<InputPlan, DescribeError> {
    let mut plan = InputPlan::default();

    if input.is_file() {
        plan.push(input.to_path_buf());
        if let Some(p) = plan.skipped.first() {
            warn!("Unsupported file type: {}", p.display());
        }
    } else if input.is_dir() {
        info!("Processing directory: {}", input.display());
        walk(input, &mut plan);
        for p in &plan.skipped {
            debug!("Skipping unsupported file: {}", p.display());
        }
    } else {
        error!("Input path does not exist: {}", input.display());
        return Err(DescribeError::NotFound {
            path: input.to_path_buf(),
        });
    }

    Ok(plan)
}

/// Unreadable directories (permissions, races with deletion) are logged and
/// listed in `skipped`; they never abort discovery.
fn walk(dir: &Path, plan: &mut InputPlan) {
    let entries = std::fs::read_dir(dir).and_then(|rd| rd.collect::<Result<Vec<_>, _>>());
    let mut entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Skipping unreadable directory {}: {}", dir.display(), e);
            plan.skipped.push(dir.to_path_buf());
            return;
        }
    };
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => walk(&path, plan),
            // Regular files and symlinks to files.
            Ok(_) if path.is_file() => plan.push(path),
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping unreadable entry {}: {}", path.display(), e);
                plan.skipped.push(path);
            }
        }
    }
}

/// Collaborators and policy for a batch.
#[derive(Clone)]
pub struct DispatchContext<'a> {
    pub document: DocumentContext<'a>,
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
}

/// Process a file or directory and collect every artifact written.
///
/// Creates `output_dir` if needed. With [`FailurePolicy::Abort`] the first
/// failing input ends the batch with its error; with
/// [`FailurePolicy::Isolate`] failures are collected in
/// [`BatchOutput::failures`] and the remaining inputs still run.
pub async fn process_path(
    input: &Path,
    output_dir: &Path,
    ctx: &DispatchContext<'_>,
) -> Result<BatchOutput, DescribeError> {
    let start = Instant::now();
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| DescribeError::OutputWriteFailed {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let plan = discover_inputs(input)?;
    process_plan(&plan, output_dir, ctx, start).await
}

/// Process an already discovered [`InputPlan`].
pub async fn process_plan(
    plan: &InputPlan,
    output_dir: &Path,
    ctx: &DispatchContext<'_>,
    start: Instant,
) -> Result<BatchOutput, DescribeError> {
    let progress = ctx.document.unit.progress;
    if !plan.pdfs.is_empty() {
        info!("Found {} PDF files", plan.pdfs.len());
    }
    if !plan.images.is_empty() {
        info!("Found {} image files", plan.images.len());
    }
    if let Some(cb) = progress {
        cb.on_batch_start(plan.pdfs.len(), plan.images.len());
        for p in &plan.skipped {
            cb.on_input_skipped(p);
        }
    }

    let mut output = BatchOutput {
        output_dir: output_dir.to_path_buf(),
        skipped: plan.skipped.clone(),
        ..Default::default()
    };
    output.stats.pdfs = plan.pdfs.len();
    output.stats.images = plan.images.len();

    // `buffered` keeps results in input order whatever the concurrency.
    let mut results = std::pin::pin!(stream::iter(plan.ordered())
        .map(|(path, kind)| async move { (path, process_input(path, kind, output_dir, ctx).await) })
        .buffered(ctx.concurrency.max(1)));

    while let Some((path, result)) = results.next().await {
        match result {
            Ok(artifacts) => output.artifacts.extend(artifacts),
            Err(e) => match ctx.failure_policy {
                FailurePolicy::Abort => {
                    error!("Error processing {}: {}", path.display(), e);
                    return Err(e);
                }
                FailurePolicy::Isolate => {
                    warn!("Error processing {} (continuing): {}", path.display(), e);
                    output.failures.push(InputFailure::new(path, &e));
                }
            },
        }
    }

    output.tally();
    output.stats.duration_ms = start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_batch_complete(&output.stats);
    }
    Ok(output)
}

async fn process_input(
    path: &Path,
    kind: InputKind,
    output_dir: &Path,
    ctx: &DispatchContext<'_>,
) -> Result<Vec<crate::output::Artifact>, DescribeError> {
    if let Some(cb) = ctx.document.unit.progress {
        cb.on_input_start(path);
    }
    match kind {
        InputKind::Pdf => process_document(path, output_dir, &ctx.document).await,
        InputKind::Image => {
            info!("Processing image file: {}", path.display());
            let unit = ProcessingUnit::Image {
                path: path.to_path_buf(),
            };
            let outcome = process_unit(unit, output_dir, &ctx.document.unit).await?;
            Ok(vec![outcome.artifact])
        }
    }
}
