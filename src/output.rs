//! Persisted records, artifact bookkeeping, and the output naming scheme.
//!
//! Three record shapes are written, one JSON object per file:
//!
//! ```text
//! out/
//! ├── photo_description_20240615_123045.json      ImageRecord
//! └── deck_20240615_123050/
//!     ├── page_1_description.json                 PageRecord
//!     ├── page_2_description.json                 PageRecord
//!     └── deck_all_descriptions.json              DocumentSummary
//! ```
//!
//! Every file is created with create-new semantics. When a name is already
//! taken (same stem in the same second) a `_2`, `_3`, … suffix is appended,
//! so a record never overwrites another one, from this run or a previous one.

use crate::error::{DescribeError, InputFailure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `strftime` pattern of the timestamp embedded in names and record bodies.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Capture the current local time in [`TIMESTAMP_FORMAT`].
pub fn capture_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

// ── Records ──────────────────────────────────────────────────────────────

/// Record for one standalone image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Source file name, e.g. `photo.jpg`.
    pub filename: String,
    pub timestamp: String,
    /// Model output, verbatim. May be empty.
    pub description: String,
}

/// Record for one PDF page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based page number.
    pub page: u32,
    /// Source PDF file name.
    pub filename: String,
    /// Shared by every page of the document.
    pub timestamp: String,
    pub description: String,
}

/// Combined record for all pages of one PDF.
///
/// `pages` keys serialise as `"1"`, `"2"`, … in numeric order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub timestamp: String,
    pub total_pages: u32,
    pub pages: BTreeMap<u32, String>,
}

impl DocumentSummary {
    /// Build the summary from page records.
    ///
    /// Returns `None` unless the records cover exactly pages `1..=total_pages`.
    pub fn from_pages(
        filename: impl Into<String>,
        timestamp: impl Into<String>,
        total_pages: u32,
        records: &[PageRecord],
    ) -> Option<Self> {
        let pages: BTreeMap<u32, String> = records
            .iter()
            .map(|r| (r.page, r.description.clone()))
            .collect();
        let complete = pages.len() == total_pages as usize
            && records.len() == total_pages as usize
            && pages.keys().copied().eq(1..=total_pages);
        complete.then(|| Self {
            filename: filename.into(),
            timestamp: timestamp.into(),
            total_pages,
            pages,
        })
    }
}

// ── Naming ───────────────────────────────────────────────────────────────

/// `{stem}_description_{timestamp}.json`
pub fn image_record_name(stem: &str, timestamp: &str) -> String {
    format!("{stem}_description_{timestamp}.json")
}

/// `page_{n}_description.json`
pub fn page_record_name(page: u32) -> String {
    format!("page_{page}_description.json")
}

/// `{stem}_all_descriptions.json`
pub fn summary_record_name(stem: &str) -> String {
    format!("{stem}_all_descriptions.json")
}

/// `{stem}_{timestamp}`: the per-document output folder.
pub fn document_dir_name(stem: &str, timestamp: &str) -> String {
    format!("{stem}_{timestamp}")
}

/// File stem of `path`, or `"unnamed"` when it has none.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unnamed".to_string())
}

/// File name of `path` as a string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Candidate names for `name`: `name`, then `name_2`, `name_3`, … with the
/// suffix placed before the extension.
fn candidate_name(name: &str, attempt: usize) -> String {
    if attempt <= 1 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{attempt}.{ext}"),
        _ => format!("{name}_{attempt}"),
    }
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Serialise `record` as pretty JSON into `dir/name`, never overwriting an
/// existing file. Returns the path actually written.
pub async fn write_record<T: Serialize>(
    dir: &Path,
    name: &str,
    record: &T,
) -> Result<PathBuf, DescribeError> {
    use tokio::io::AsyncWriteExt;

    let mut body = serde_json::to_vec_pretty(record)
        .map_err(|e| DescribeError::Internal(format!("record serialisation failed: {e}")))?;
    body.push(b'\n');

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let path = dir.join(candidate_name(name, attempt));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DescribeError::OutputWriteFailed { path, source: e }),
        };

        file.write_all(&body)
            .await
            .map_err(|e| DescribeError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        file.flush()
            .await
            .map_err(|e| DescribeError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!("Wrote {} bytes → {}", body.len(), path.display());
        return Ok(path);
    }

    Err(DescribeError::Internal(format!(
        "no free file name for '{}' in {}",
        name,
        dir.display()
    )))
}

/// Create a fresh directory `parent/name`, suffixing the name if it exists.
pub async fn create_unique_dir(parent: &Path, name: &str) -> Result<PathBuf, DescribeError> {
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        // Folder names carry no extension; `v1.2_{ts}` must not become `v1_2.2_{ts}`.
        let candidate = if attempt <= 1 {
            name.to_string()
        } else {
            format!("{name}_{attempt}")
        };
        let path = parent.join(candidate);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DescribeError::OutputWriteFailed { path, source: e }),
        }
    }

    Err(DescribeError::Internal(format!(
        "no free directory name for '{}' in {}",
        name,
        parent.display()
    )))
}

// ── Batch results ────────────────────────────────────────────────────────

/// Kind of a written artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ImageRecord,
    PageRecord,
    DocumentSummary,
}

/// One file written by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Path of the written JSON file.
    pub path: PathBuf,
    /// Image or PDF the artifact was produced from.
    pub source: PathBuf,
}

/// Counters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// PDFs discovered.
    pub pdfs: usize,
    /// Standalone images discovered.
    pub images: usize,
    pub image_records: usize,
    pub page_records: usize,
    pub document_summaries: usize,
    /// Files skipped because of their type.
    pub skipped: usize,
    /// Inputs that failed (isolation mode only).
    pub failed: usize,
    pub duration_ms: u64,
}

/// Everything a describe run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    pub output_dir: PathBuf,
    /// Written artifacts; PDFs first, then images, each document's pages in order.
    pub artifacts: Vec<Artifact>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<InputFailure>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Paths of every written artifact, in production order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }

    /// Artifacts of one kind.
    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// Treat any isolated input failure as an error.
    ///
    /// Returns [`DescribeError::BatchFailed`] when `failures` is non-empty.
    pub fn into_result(self) -> Result<Self, DescribeError> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(DescribeError::BatchFailed {
                failed: self.failures.len(),
                total: self.stats.pdfs + self.stats.images,
                first_error: format!("{}: {}", first.path.display(), first.message),
            }),
        }
    }

    /// Recount artifact and failure counters from the collected lists.
    pub(crate) fn tally(&mut self) {
        let count = |k| self.artifacts.iter().filter(|a| a.kind == k).count();
        self.stats.image_records = count(ArtifactKind::ImageRecord);
        self.stats.page_records = count(ArtifactKind::PageRecord);
        self.stats.document_summaries = count(ArtifactKind::DocumentSummary);
        self.stats.skipped = self.skipped.len();
        self.stats.failed = self.failures.len();
    }
}
