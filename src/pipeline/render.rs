//! PDF rasterisation: expand a document into one PNG per page.
//!
//! ## Why a trait?
//!
//! Rendering needs the native pdfium library, which is not always present.
//! The aggregator only sees [`Rasterizer`], so a missing library surfaces as
//! [`DescribeError::RasterizerUnavailable`] (distinct from a corrupt file),
//! and tests can plug in a fake renderer.
//!
//! ## Why blocking?
//!
//! pdfium keeps thread-local state and is not async-safe. The aggregator
//! calls [`Rasterizer::rasterize`] inside `tokio::task::spawn_blocking`.

use crate::error::DescribeError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Turns a document into ordered page images.
pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf_path` into `scratch_dir`.
    ///
    /// Returns one image path per page; element `i` is page `i + 1`.
    fn rasterize(&self, pdf_path: &Path, scratch_dir: &Path) -> Result<Vec<PathBuf>, DescribeError>;
}

/// File name of a rendered page inside the scratch directory.
pub fn page_image_name(page: usize) -> String {
    format!("page_{page}.png")
}

/// Renders pages with pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            max_rendered_pixels,
            library_path,
        }
    }

    /// Library to bind: explicit path, then `PDFIUM_LIB_PATH`, else `None`
    /// meaning the system search path.
    fn resolve_library(&self) -> Option<PathBuf> {
        self.library_path.clone().or_else(|| {
            std::env::var(PDFIUM_LIB_PATH_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }

    /// Bind pdfium, mapping any failure to [`DescribeError::RasterizerUnavailable`].
    pub fn bind(&self) -> Result<Pdfium, DescribeError> {
        let bindings = match self.resolve_library() {
            Some(path) => {
                // A directory means "the platform library inside it".
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path.clone()
                };
                Pdfium::bind_to_library(&lib).map_err(|e| {
                    DescribeError::RasterizerUnavailable(format!(
                        "cannot load '{}': {e}",
                        lib.display()
                    ))
                })?
            }
            None => Pdfium::bind_to_system_library().map_err(|e| {
                DescribeError::RasterizerUnavailable(format!(
                    "no pdfium library on the system search path: {e}"
                ))
            })?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(2000, None)
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path, scratch_dir: &Path) -> Result<Vec<PathBuf>, DescribeError> {
        if !pdf_path.is_file() {
            return Err(DescribeError::NotFound {
                path: pdf_path.to_path_buf(),
            });
        }

        let pdfium = self.bind()?;
        let failed = |detail: String| DescribeError::Rasterization {
            path: pdf_path.to_path_buf(),
            detail,
        };

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| failed(format!("{e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} ({} pages)", pdf_path.display(), total);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut out = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| failed(format!("page {page_num}: {e:?}")))?;
            let image = bitmap.as_image();

            let path = scratch_dir.join(page_image_name(page_num));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| failed(format!("page {page_num}: saving render failed: {e}")))?;
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            out.push(path);
        }

        Ok(out)
    }
}
