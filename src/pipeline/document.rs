//! Document aggregator: every page of one PDF, then the combined summary.
//!
//! ```text
//! Rasterizing ──▶ ProcessingPages ──▶ Combining ──▶ Done
//!      │                 │                 │
//!      └─────────────────┴─────────────────┴──▶ Failed
//! ```
//!
//! Pages are processed strictly in order `1..=N`. The first failing page
//! aborts the document: no summary is written, but page records already
//! flushed stay on disk (they are not rolled back). Rendered page images live
//! in a [`TempDir`] owned by this module and are removed on every exit path.

use crate::error::DescribeError;
use crate::output::{
    self, document_dir_name, file_name, file_stem, summary_record_name, Artifact, ArtifactKind,
    DocumentSummary, PageRecord,
};
use crate::pipeline::render::Rasterizer;
use crate::pipeline::unit::{process_unit, ProcessingUnit, UnitContext};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Lifecycle of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStage {
    Rasterizing,
    ProcessingPages,
    Combining,
    Done,
    Failed,
}

impl DocumentStage {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: DocumentStage) -> bool {
        use DocumentStage::*;
        matches!(
            (self, next),
            (Rasterizing, ProcessingPages)
                | (ProcessingPages, Combining)
                | (Combining, Done)
                | (Rasterizing | ProcessingPages | Combining, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStage::Done | DocumentStage::Failed)
    }
}

impl fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStage::Rasterizing => "rasterizing",
            DocumentStage::ProcessingPages => "processing-pages",
            DocumentStage::Combining => "combining",
            DocumentStage::Done => "done",
            DocumentStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Stage tracker for one document, for logs.
struct DocumentRun<'p> {
    pdf: &'p Path,
    stage: DocumentStage,
}

impl<'p> DocumentRun<'p> {
    fn new(pdf: &'p Path) -> Self {
        Self {
            pdf,
            stage: DocumentStage::Rasterizing,
        }
    }

    fn advance(&mut self, next: DocumentStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {} → {}",
            self.stage,
            next
        );
        debug!("{}: {} → {}", self.pdf.display(), self.stage, next);
        self.stage = next;
    }

    /// Mark the run failed and hand the error back.
    fn fail(&mut self, err: DescribeError) -> DescribeError {
        warn!("{}: failed while {}: {}", self.pdf.display(), self.stage, err);
        self.advance(DocumentStage::Failed);
        err
    }
}

/// Collaborators for document processing.
#[derive(Clone)]
pub struct DocumentContext<'a> {
    pub unit: UnitContext<'a>,
    pub rasterizer: Arc<dyn Rasterizer>,
}

/// Process every page of `pdf_path` and write the combined summary.
///
/// Returns the page records followed by the summary, in page order.
pub async fn process_document(
    pdf_path: &Path,
    output_dir: &Path,
    ctx: &DocumentContext<'_>,
) -> Result<Vec<Artifact>, DescribeError> {
    info!("Processing PDF: {}", pdf_path.display());
    let mut run = DocumentRun::new(pdf_path);

    let timestamp = output::capture_timestamp();
    let stem = file_stem(pdf_path);

    // ── Rasterizing ──────────────────────────────────────────────────────
    let scratch = tempfile::Builder::new()
        .prefix("f2k-pages-")
        .tempdir()
        .map_err(|e| run.fail(DescribeError::Internal(format!("scratch dir: {e}"))))?;
    let pages = match rasterize(pdf_path, &scratch, &ctx.rasterizer).await {
        Ok(pages) => pages,
        Err(e) => {
            if let Some(cb) = ctx.unit.progress {
                cb.on_document_failed(pdf_path, &e.to_string());
            }
            return Err(run.fail(e));
        }
    };
    if let Some(cb) = ctx.unit.progress {
        cb.on_document_rasterized(pdf_path, pages.len());
    }
    let total_pages = u32::try_from(pages.len())
        .map_err(|_| run.fail(DescribeError::Internal("page count overflow".into())))?;

    let doc_dir = output::create_unique_dir(output_dir, &document_dir_name(&stem, &timestamp))
        .await
        .map_err(|e| run.fail(e))?;

    // ── ProcessingPages ──────────────────────────────────────────────────
    run.advance(DocumentStage::ProcessingPages);
    let mut artifacts = Vec::with_capacity(pages.len() + 1);
    let mut records = Vec::with_capacity(pages.len());

    for (page_number, image_path) in (1..=total_pages).zip(pages) {
        let unit = ProcessingUnit::PdfPage {
            parent_path: pdf_path.to_path_buf(),
            page_number,
            image_path,
            timestamp: timestamp.clone(),
        };
        match process_unit(unit, &doc_dir, &ctx.unit).await {
            Ok(outcome) => {
                records.push(PageRecord {
                    page: page_number,
                    filename: file_name(pdf_path),
                    timestamp: timestamp.clone(),
                    description: outcome.description,
                });
                artifacts.push(outcome.artifact);
            }
            Err(e) => {
                if !artifacts.is_empty() {
                    warn!(
                        "{}: {} page record(s) already written to {} are left in place",
                        pdf_path.display(),
                        artifacts.len(),
                        doc_dir.display()
                    );
                }
                return Err(run.fail(e));
            }
        }
    }

    // ── Combining ────────────────────────────────────────────────────────
    run.advance(DocumentStage::Combining);
    let summary = DocumentSummary::from_pages(file_name(pdf_path), &timestamp, total_pages, &records)
        .ok_or_else(|| {
            run.fail(DescribeError::Internal(format!(
                "page records of {} do not cover 1..={}",
                pdf_path.display(),
                total_pages
            )))
        })?;
    let summary_path = output::write_record(&doc_dir, &summary_record_name(&stem), &summary)
        .await
        .map_err(|e| run.fail(e))?;

    info!("Combined descriptions saved to: {}", summary_path.display());
    artifacts.push(Artifact {
        kind: ArtifactKind::DocumentSummary,
        path: summary_path,
        source: pdf_path.to_path_buf(),
    });

    run.advance(DocumentStage::Done);
    // `scratch` drops here, deleting the rendered pages.
    Ok(artifacts)
}

async fn rasterize(
    pdf_path: &Path,
    scratch: &TempDir,
    rasterizer: &Arc<dyn Rasterizer>,
) -> Result<Vec<std::path::PathBuf>, DescribeError> {
    let rasterizer = Arc::clone(rasterizer);
    let pdf = pdf_path.to_path_buf();
    let dir = scratch.path().to_path_buf();
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &dir))
        .await
        .map_err(|e| DescribeError::Internal(format!("Render task panicked: {e}")))?
}
