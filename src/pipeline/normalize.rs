//! Image normalisation: resize a unit to the inference canvas and base64 it.
//!
//! Every unit, standalone image or rendered PDF page, goes through here right
//! before inference. The resized copy is written as a JPEG into a private
//! [`TempDir`] owned by the returned [`NormalizedImage`], so the scratch file
//! disappears when the inference call is done, on success or failure, and
//! nothing is ever left beside the source image.

use crate::config::ResizeMode;
use crate::error::DescribeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A resized copy of a unit, deleted on drop.
#[derive(Debug)]
pub struct NormalizedImage {
    path: PathBuf,
    width: u32,
    height: u32,
    _scratch: TempDir,
}

impl NormalizedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Read the normalised file and encode it as standard base64.
    pub fn to_base64(&self) -> Result<String, DescribeError> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            DescribeError::Internal(format!(
                "failed to read normalised image {}: {e}",
                self.path.display()
            ))
        })?;
        let b64 = STANDARD.encode(&bytes);
        debug!("Encoded {} → {} bytes base64", self.path.display(), b64.len());
        Ok(b64)
    }
}

/// Resize `src` onto a `canvas` of `(width, height)` pixels.
///
/// Blocking: call from `spawn_blocking` inside async code.
pub fn normalize_image(
    src: &Path,
    canvas: (u32, u32),
    mode: ResizeMode,
) -> Result<NormalizedImage, DescribeError> {
    if !src.is_file() {
        return Err(DescribeError::NotFound {
            path: src.to_path_buf(),
        });
    }

    let invalid = |detail: String| DescribeError::InvalidImage {
        path: src.to_path_buf(),
        detail,
    };
    // Sniff the content rather than trusting the extension.
    let img = image::ImageReader::open(src)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| invalid(e.to_string()))?
        .decode()
        .map_err(|e| invalid(e.to_string()))?;
    let resized = fit_to_canvas(&img, canvas, mode);

    let scratch = tempfile::Builder::new()
        .prefix("f2k-normalize-")
        .tempdir()
        .map_err(|e| DescribeError::Internal(format!("scratch dir: {e}")))?;
    let path = scratch.path().join("normalized.jpg");
    resized
        .save_with_format(&path, image::ImageFormat::Jpeg)
        .map_err(|e| DescribeError::InvalidImage {
            path: src.to_path_buf(),
            detail: format!("re-encoding failed: {e}"),
        })?;

    debug!(
        "Normalised {} ({}x{}) → {}x{}",
        src.display(),
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );

    Ok(NormalizedImage {
        path,
        width: resized.width(),
        height: resized.height(),
        _scratch: scratch,
    })
}

/// Resize to the canvas. JPEG has no alpha, so the result is always RGB.
fn fit_to_canvas(img: &DynamicImage, (width, height): (u32, u32), mode: ResizeMode) -> RgbImage {
    match mode {
        ResizeMode::Stretch => img
            .resize_exact(width, height, FilterType::CatmullRom)
            .to_rgb8(),
        ResizeMode::Fit => {
            let scaled = img.resize(width, height, FilterType::CatmullRom).to_rgb8();
            let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
            let x = (width - scaled.width()) / 2;
            let y = (height - scaled.height()) / 2;
            image::imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
            canvas
        }
    }
}
