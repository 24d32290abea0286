//! # files2knowledge
//!
//! Turn images and PDF slide decks into per-page JSON descriptions using a
//! vision model served by [Ollama](https://ollama.com).
//!
//! ## Why this crate?
//!
//! Indexing and retrieval systems want text, but slide decks carry most of
//! their meaning in charts, diagrams and layout. This crate sends every image
//! (and every rendered PDF page) to a local vision-language model with a
//! transcription prompt and stores the answers as small JSON records that
//! downstream tooling can pick up without touching a pixel.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input path
//!  │
//!  ├─ 1. Dispatch  single file or recursive directory walk; PDFs first
//!  ├─ 2. Render    PDF → one PNG per page via pdfium (spawn_blocking)
//!  ├─ 3. Normalise resize to an 800×600 canvas, JPEG, base64
//!  ├─ 4. Infer     POST /api/generate, one attempt per unit
//!  └─ 5. Persist   image / page records + one summary per PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use files2knowledge::{describe_path, DescribeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Talks to http://localhost:11434 with granite3.2-vision:latest
//!     let config = DescribeConfig::default();
//!     let output = describe_path("deck.pdf", "out/", &config).await?;
//!     for path in output.paths() {
//!         println!("{}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Output
//!
//! | File | Body |
//! |------|------|
//! | `{stem}_description_{ts}.json` | `{filename, timestamp, description}` |
//! | `{stem}_{ts}/page_{n}_description.json` | `{page, filename, timestamp, description}` |
//! | `{stem}_{ts}/{stem}_all_descriptions.json` | `{filename, timestamp, total_pages, pages}` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `files2knowledge` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod describe;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DescribeConfig, DescribeConfigBuilder, FailurePolicy, ResizeMode};
pub use describe::{describe_path, describe_path_sync, describe_path_with, plan};
pub use error::{DescribeError, InputFailure};
pub use output::{
    Artifact, ArtifactKind, BatchOutput, BatchStats, DocumentSummary, ImageRecord, PageRecord,
};
pub use pipeline::client::{InferenceBackend, OllamaClient};
pub use pipeline::dispatch::{InputKind, InputPlan};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use progress::{NoopProgressObserver, ProgressCallback, ProgressObserver};
