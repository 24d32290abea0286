//! Unit processor: one image or one PDF page through the model to one record.

use crate::error::DescribeError;
use crate::output::{
    self, file_name, file_stem, image_record_name, page_record_name, Artifact, ArtifactKind,
    ImageRecord, PageRecord,
};
use crate::pipeline::client::InferenceBackend;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// The smallest thing sent to inference. Consumed once.
#[derive(Debug, Clone)]
pub enum ProcessingUnit {
    /// A standalone image file.
    Image { path: PathBuf },
    /// One rendered page of a PDF.
    PdfPage {
        parent_path: PathBuf,
        page_number: u32,
        image_path: PathBuf,
        /// Document timestamp shared by all its pages.
        timestamp: String,
    },
}

impl ProcessingUnit {
    /// `slide.png` or `deck.pdf#3`, for logs and progress events.
    pub fn label(&self) -> String {
        match self {
            ProcessingUnit::Image { path } => file_name(path),
            ProcessingUnit::PdfPage {
                parent_path,
                page_number,
                ..
            } => format!("{}#{}", file_name(parent_path), page_number),
        }
    }

    fn image_path(&self) -> &Path {
        match self {
            ProcessingUnit::Image { path } => path,
            ProcessingUnit::PdfPage { image_path, .. } => image_path,
        }
    }
}

/// What one processed unit produced.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub artifact: Artifact,
    pub description: String,
    pub page_number: Option<u32>,
}

/// Shared collaborators for every unit of a run.
#[derive(Clone)]
pub struct UnitContext<'a> {
    pub backend: &'a dyn InferenceBackend,
    pub prompt: &'a str,
    pub progress: Option<&'a ProgressCallback>,
}

/// Describe `unit` and write its record into `output_dir`.
///
/// Images land in `output_dir` as `{stem}_description_{ts}.json`, where the
/// timestamp is captured after inference, at write time. Pages land in the
/// document folder as `page_{n}_description.json`. If inference fails no
/// record is written and the error is returned unchanged.
pub async fn process_unit(
    unit: ProcessingUnit,
    output_dir: &Path,
    ctx: &UnitContext<'_>,
) -> Result<UnitOutcome, DescribeError> {
    let label = unit.label();
    info!("Processing {}", label);

    let description = match ctx.backend.generate(ctx.prompt, unit.image_path()).await {
        Ok(text) => text,
        Err(e) => {
            error!("Error processing {}: {}", label, e);
            if let Some(cb) = ctx.progress {
                cb.on_unit_error(&label, &e.to_string());
            }
            return Err(e);
        }
    };

    let outcome = match unit {
        ProcessingUnit::Image { path } => {
            let timestamp = output::capture_timestamp();
            let record = ImageRecord {
                filename: file_name(&path),
                timestamp: timestamp.clone(),
                description,
            };
            let name = image_record_name(&file_stem(&path), &timestamp);
            let written = output::write_record(output_dir, &name, &record).await?;
            UnitOutcome {
                artifact: Artifact {
                    kind: ArtifactKind::ImageRecord,
                    path: written,
                    source: path,
                },
                description: record.description,
                page_number: None,
            }
        }
        ProcessingUnit::PdfPage {
            parent_path,
            page_number,
            timestamp,
            ..
        } => {
            let record = PageRecord {
                page: page_number,
                filename: file_name(&parent_path),
                timestamp,
                description,
            };
            let written =
                output::write_record(output_dir, &page_record_name(page_number), &record).await?;
            UnitOutcome {
                artifact: Artifact {
                    kind: ArtifactKind::PageRecord,
                    path: written,
                    source: parent_path,
                },
                description: record.description,
                page_number: Some(page_number),
            }
        }
    };

    info!("Description saved to: {}", outcome.artifact.path.display());
    if let Some(cb) = ctx.progress {
        cb.on_unit_complete(&label, &outcome.artifact.path);
    }
    Ok(outcome)
}
