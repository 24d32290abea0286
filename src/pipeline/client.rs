//! Inference client: one image + one prompt in, one description out.
//!
//! [`OllamaClient`] speaks the Ollama REST API directly:
//!
//! * `GET  {api_url}/api/tags`    : model registry, checked once at connect time
//! * `POST {api_url}/api/generate`: `{model, prompt, images: [b64], stream: false}`
//!
//! Exactly one attempt is made per unit. A transport error or non-2xx status
//! becomes [`DescribeError::Inference`] and propagates; there is no retry.
//!
//! The pipeline only depends on the [`InferenceBackend`] trait, so tests and
//! embedders can substitute their own backend.

use crate::config::{normalize_api_url, DescribeConfig, ResizeMode};
use crate::error::DescribeError;
use crate::pipeline::normalize::normalize_image;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A vision model that turns `(prompt, image)` into text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Describe the image at `image_path`.
    ///
    /// Fails with [`DescribeError::NotFound`] if the image does not exist and
    /// with [`DescribeError::Inference`] if the model call fails.
    async fn generate(&self, prompt: &str, image_path: &Path) -> Result<String, DescribeError>;

    /// Model identifier used in log lines and errors.
    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
}

/// Client for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    model: String,
    api_url: String,
    canvas: (u32, u32),
    resize_mode: ResizeMode,
}

impl OllamaClient {
    /// Connect to `api_url` and check that the service is reachable.
    ///
    /// Fails with [`DescribeError::ServiceUnavailable`] when the registry
    /// cannot be fetched. A model missing from the registry is only a
    /// warning: the first generate call will surface the real error.
    pub async fn connect(
        model: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DescribeError> {
        let api_url = normalize_api_url(&api_url.into());
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DescribeError::Internal(format!("failed to build HTTP client: {e}")))?;

        let client = Self {
            http,
            model: model.into(),
            api_url,
            canvas: (800, 600),
            resize_mode: ResizeMode::Stretch,
        };
        client.check_availability().await?;
        Ok(client)
    }

    /// Connect using the model, URL, timeout and canvas from `config`.
    pub async fn from_config(config: &DescribeConfig) -> Result<Self, DescribeError> {
        let client = Self::connect(
            config.model.clone(),
            config.api_url.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )
        .await?;
        Ok(client.with_canvas(config.canvas(), config.resize_mode))
    }

    /// Override the canvas images are normalised to before encoding.
    pub fn with_canvas(mut self, canvas: (u32, u32), mode: ResizeMode) -> Self {
        self.canvas = canvas;
        self.resize_mode = mode;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Names of the models the server reports.
    pub async fn list_models(&self) -> Result<Vec<String>, DescribeError> {
        let endpoint = format!("{}/api/tags", self.api_url);
        let unavailable = |reason: String| DescribeError::ServiceUnavailable {
            endpoint: endpoint.clone(),
            reason,
        };

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("unreadable model registry: {e}")))?;
        Ok(tags.models.into_iter().filter_map(|m| m.name).collect())
    }

    async fn check_availability(&self) -> Result<(), DescribeError> {
        let models = self.list_models().await?;
        if has_model(&models, &self.model) {
            info!("Ollama at {} serves model '{}'", self.api_url, self.model);
        } else {
            warn!(
                "Model '{}' not found in Ollama. Available models: {}",
                self.model,
                models.join(", ")
            );
            warn!("You may need to run: ollama pull {}", self.model);
        }
        Ok(())
    }

    /// Send one already-encoded image.
    async fn generate_encoded(&self, prompt: &str, image_b64: String) -> Result<String, DescribeError> {
        let endpoint = format!("{}/api/generate", self.api_url);
        let failed = |detail: String| DescribeError::Inference {
            model: self.model.clone(),
            detail,
        };

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            images: vec![image_b64],
            stream: false,
        };

        let start = Instant::now();
        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(failed(format!("HTTP {status}: {}", text.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unreadable response: {e}")))?;
        let text = parsed.response.unwrap_or_default();
        debug!(
            "Model '{}' answered {} chars in {:?}",
            self.model,
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn generate(&self, prompt: &str, image_path: &Path) -> Result<String, DescribeError> {
        if !image_path.is_file() {
            return Err(DescribeError::NotFound {
                path: image_path.to_path_buf(),
            });
        }

        let src = image_path.to_path_buf();
        let canvas = self.canvas;
        let mode = self.resize_mode;
        // The normalised copy lives in a TempDir that is dropped on return.
        let encoded = tokio::task::spawn_blocking(move || {
            let normalized = normalize_image(&src, canvas, mode)?;
            normalized.to_base64()
        })
        .await
        .map_err(|e| DescribeError::Internal(format!("normalise task panicked: {e}")))??;

        self.generate_encoded(prompt, encoded).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Registry lookup that treats `name` and `name:latest` as the same model.
fn has_model(available: &[String], wanted: &str) -> bool {
    let canonical = |s: &str| {
        if s.contains(':') {
            s.to_string()
        } else {
            format!("{s}:latest")
        }
    };
    let wanted = canonical(wanted);
    available.iter().any(|m| canonical(m) == wanted)
}
