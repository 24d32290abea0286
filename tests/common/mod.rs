//! Shared fixtures for the integration tests.
//!
//! * [`ScriptedBackend`]: an in-memory [`InferenceBackend`] that answers
//!   `"description of <file>"` and can be told to fail on chosen files.
//! * [`FakeRasterizer`] : renders a "PDF" whose body is `pages=N` into N
//!   solid PNGs, so aggregation can be tested without pdfium.
//! * [`MockOllama`]     : a minimal HTTP/1.1 server speaking just enough of
//!   the Ollama API for the real [`files2knowledge::OllamaClient`].

#![allow(dead_code)]

use async_trait::async_trait;
use files2knowledge::{DescribeError, InferenceBackend, Rasterizer};
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// ── Logging ──────────────────────────────────────────────────────────────────

/// Route library `tracing` output through the test harness.
///
/// Silent unless `RUST_LOG` is set, e.g. `RUST_LOG=files2knowledge=debug
/// cargo test -- --nocapture`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Files ────────────────────────────────────────────────────────────────────

/// Write a small valid image; the format follows the extension.
pub fn write_image(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(64, 48, Rgb([200, 40, 40]))
        .save(path)
        .unwrap();
}

/// Write a fake PDF understood by [`FakeRasterizer`].
pub fn write_fake_pdf(path: &Path, pages: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, format!("pages={pages}")).unwrap();
}

/// Every file under `dir`, recursively, sorted.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                out.extend(files_under(&p));
            } else {
                out.push(p);
            }
        }
    }
    out.sort();
    out
}

pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

pub fn name_of(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

// ── Scripted backend ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScriptedBackend {
    /// File names (e.g. `page_2.png`, `b.jpg`) whose call fails.
    failing: HashSet<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// File names sent to the model, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str, image_path: &Path) -> Result<String, DescribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !image_path.is_file() {
            return Err(DescribeError::NotFound {
                path: image_path.to_path_buf(),
            });
        }
        let name = name_of(image_path);
        self.seen.lock().unwrap().push(name.clone());
        if self.failing.contains(&name) {
            return Err(DescribeError::Inference {
                model: "scripted".into(),
                detail: format!("HTTP 500 for {name}"),
            });
        }
        assert!(!prompt.is_empty());
        Ok(format!("description of {name}"))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

// ── Fake rasterizer ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRasterizer {
    /// Scratch directories handed to `rasterize`, for cleanup assertions.
    pub scratch_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeRasterizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        self.scratch_dirs.lock().unwrap().clone()
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(&self, pdf_path: &Path, scratch_dir: &Path) -> Result<Vec<PathBuf>, DescribeError> {
        self.scratch_dirs
            .lock()
            .unwrap()
            .push(scratch_dir.to_path_buf());

        let body = std::fs::read_to_string(pdf_path).map_err(|e| DescribeError::Rasterization {
            path: pdf_path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let pages: usize = body
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DescribeError::Rasterization {
                path: pdf_path.to_path_buf(),
                detail: "corrupt document".into(),
            })?;

        (1..=pages)
            .map(|n| {
                let path = scratch_dir.join(format!("page_{n}.png"));
                RgbImage::from_pixel(32, 32, Rgb([0, 0, (n * 20) as u8]))
                    .save(&path)
                    .map_err(|e| DescribeError::Rasterization {
                        path: pdf_path.to_path_buf(),
                        detail: e.to_string(),
                    })?;
                Ok(path)
            })
            .collect()
    }
}

// ── Mock Ollama server ───────────────────────────────────────────────────────

/// One request seen by [`MockOllama`].
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

type Handler = dyn Fn(&SeenRequest, usize) -> (u16, String) + Send + Sync;

pub struct MockOllama {
    pub url: String,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl MockOllama {
    /// Start a server; `handler(request, generate_call_index)` returns
    /// `(status, json_body)`. The index counts `/api/generate` calls from 1.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&SeenRequest, usize) -> (u16, String) + Send + Sync + 'static,
    {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        let generate_calls = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let seen = Arc::clone(&seen);
                let handler = Arc::clone(&handler);
                let generate_calls = Arc::clone(&generate_calls);
                tokio::spawn(async move {
                    let Some(req) = read_request(&mut socket).await else {
                        return;
                    };
                    let index = if req.path == "/api/generate" {
                        generate_calls.fetch_add(1, Ordering::SeqCst) + 1
                    } else {
                        0
                    };
                    seen.lock().unwrap().push(req.clone());
                    let (status, body) = handler(&req, index);
                    let response = format!(
                        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        reason(status),
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            url,
            requests,
            task,
        }
    }

    /// A server that lists `models` and answers every generate call with `text`.
    pub async fn answering(models: &[&str], text: &str) -> Self {
        let tags = tags_body(models);
        let reply = serde_json::json!({ "response": text, "done": true }).to_string();
        Self::start(move |req, _| match req.path.as_str() {
            "/api/tags" => (200, tags.clone()),
            "/api/generate" => (200, reply.clone()),
            _ => (404, "{}".into()),
        })
        .await
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn generate_requests(&self) -> Vec<serde_json::Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/api/generate")
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect()
    }
}

impl Drop for MockOllama {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn tags_body(models: &[&str]) -> String {
    let models: Vec<_> = models
        .iter()
        .map(|m| serde_json::json!({ "name": m, "size": 1 }))
        .collect();
    serde_json::json!({ "models": models }).to_string()
}

/// A URL nothing listens on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Some(SeenRequest { method, path, body })
}
