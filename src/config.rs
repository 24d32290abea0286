//! Configuration types for a describe run.
//!
//! Every knob of a run lives in [`DescribeConfig`], built through
//! [`DescribeConfigBuilder`]. The config is cheap to clone and carries the
//! per-invocation progress observer, so nothing about a run depends on
//! process-wide state.

use crate::error::DescribeError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default Ollama model tag.
pub const DEFAULT_MODEL: &str = "granite3.2-vision:latest";

/// Default Ollama base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:11434";

/// Port Ollama listens on when a host is given without one.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Turn an Ollama host setting into a base URL.
///
/// Accepts the forms `OLLAMA_HOST` takes: `127.0.0.1:11434`, `0.0.0.0`,
/// `gpu-box`, or a full URL. A value without a scheme gets `http://`, and a
/// bare host gets the default port. Trailing slashes are dropped; an empty
/// value yields [`DEFAULT_API_URL`].
pub fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_URL.to_string();
    }
    if trimmed.contains("://") {
        return trimmed.to_string();
    }

    let (authority, rest) = match trimmed.find('/') {
        Some(i) => trimmed.split_at(i),
        None => (trimmed, ""),
    };
    // `[::1]:8080` carries a port after the bracket; `[::1]` does not.
    let has_port = match authority.rfind(']') {
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    };
    if has_port {
        format!("http://{authority}{rest}")
    } else {
        format!("http://{authority}:{DEFAULT_OLLAMA_PORT}{rest}")
    }
}

/// Configuration for describing images and PDFs.
///
/// # Example
/// ```rust
/// use files2knowledge::{DescribeConfig, FailurePolicy};
///
/// let config = DescribeConfig::builder()
///     .model("llava:13b")
///     .api_url("http://gpu-box:11434")
///     .failure_policy(FailurePolicy::Isolate)
///     .build()
///     .unwrap();
/// assert_eq!(config.canvas_width, 800);
/// ```
#[derive(Clone)]
pub struct DescribeConfig {
    /// Ollama model tag. Default: `granite3.2-vision:latest`.
    pub model: String,

    /// Base URL of the Ollama server. Default: `http://localhost:11434`.
    pub api_url: String,

    /// Prompt sent with every image. If None, uses [`DEFAULT_PROMPT`].
    pub prompt: Option<String>,

    /// Width of the canvas every unit is resized to before inference. Default: 800.
    pub canvas_width: u32,

    /// Height of the canvas every unit is resized to before inference. Default: 600.
    pub canvas_height: u32,

    /// How a unit is fitted to the canvas. Default: [`ResizeMode::Stretch`].
    pub resize_mode: ResizeMode,

    /// Longest edge in pixels of a rendered PDF page. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Explicit pdfium shared library. If None, `PDFIUM_LIB_PATH` is
    /// consulted, then the system library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Timeout in seconds for each HTTP request to the backend. Default: 300.
    ///
    /// Local vision models on CPU can take minutes per image.
    pub api_timeout_secs: u64,

    /// Number of top-level inputs processed at once. Default: 1 (sequential).
    ///
    /// Pages inside one PDF are always processed in order, one at a time.
    pub concurrency: usize,

    /// What happens to the rest of a batch when one input fails.
    /// Default: [`FailurePolicy::Abort`].
    pub failure_policy: FailurePolicy,

    /// Observer receiving per-input and per-unit events.
    pub progress: Option<ProgressCallback>,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            prompt: None,
            canvas_width: 800,
            canvas_height: 600,
            resize_mode: ResizeMode::default(),
            max_rendered_pixels: 2000,
            pdfium_library_path: None,
            api_timeout_secs: 300,
            concurrency: 1,
            failure_policy: FailurePolicy::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for DescribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescribeConfig")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("prompt", &self.prompt.as_ref().map(|p| p.len()))
            .field("canvas_width", &self.canvas_width)
            .field("canvas_height", &self.canvas_height)
            .field("resize_mode", &self.resize_mode)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn ProgressObserver>"))
            .finish()
    }
}

impl DescribeConfig {
    /// Create a new builder for `DescribeConfig`.
    pub fn builder() -> DescribeConfigBuilder {
        DescribeConfigBuilder {
            config: Self::default(),
        }
    }

    /// The prompt actually sent to the model.
    pub fn effective_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    /// Canvas dimensions as `(width, height)`.
    pub fn canvas(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }
}

/// Builder for [`DescribeConfig`].
#[derive(Debug)]
pub struct DescribeConfigBuilder {
    config: DescribeConfig,
}

impl DescribeConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Base URL of the Ollama server; scheme-less hosts are accepted,
    /// see [`normalize_api_url`].
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = normalize_api_url(&url.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn canvas(mut self, width: u32, height: u32) -> Self {
        self.config.canvas_width = width.max(16);
        self.config.canvas_height = height.max(16);
        self
    }

    pub fn resize_mode(mut self, mode: ResizeMode) -> Self {
        self.config.resize_mode = mode;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn progress(mut self, observer: ProgressCallback) -> Self {
        self.config.progress = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DescribeConfig, DescribeError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(DescribeError::InvalidConfig("Model name must not be empty".into()));
        }
        if !(c.api_url.starts_with("http://") || c.api_url.starts_with("https://")) {
            return Err(DescribeError::InvalidConfig(format!(
                "API URL must start with http:// or https://, got '{}'",
                c.api_url
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(DescribeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(DescribeError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a unit is mapped onto the fixed inference canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Resize to exactly the canvas size, ignoring aspect ratio. (default)
    #[default]
    Stretch,
    /// Scale to fit inside the canvas and pad the rest with white.
    Fit,
}

/// Batch behaviour when a top-level input fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop at the first failing input; inputs not yet started are never reached. (default)
    #[default]
    Abort,
    /// Record the failure in [`crate::BatchOutput::failures`] and continue;
    /// [`crate::BatchOutput::into_result`] turns it into [`DescribeError::BatchFailed`].
    Isolate,
}
