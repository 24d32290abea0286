//! Pipeline stages for describing images and PDFs.
//!
//! Each submodule implements one component; they only meet through the
//! types in [`unit`] and the traits [`client::InferenceBackend`] and
//! [`render::Rasterizer`].
//!
//! ## Data Flow
//!
//! ```text
//! dispatch ──▶ document ──▶ unit ──▶ client ──▶ Ollama
//! (walk dir)   (pdfium)     (record)  (normalize + base64)
//!     └───────────────────────▲
//!          standalone images
//! ```
//!
//! 1. [`dispatch`] : classify the input path, walk directories, route files
//! 2. [`document`] : rasterise a PDF, run its pages in order, write the summary
//! 3. [`unit`]     : one image or page through the model into one JSON record
//! 4. [`client`]   : the Ollama REST client; one attempt per unit
//! 5. [`normalize`]: resize to the inference canvas and base64-encode
//! 6. [`render`]   : pdfium page rendering, run in `spawn_blocking`

pub mod client;
pub mod dispatch;
pub mod document;
pub mod normalize;
pub mod render;
pub mod unit;
