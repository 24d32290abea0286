//! CLI binary for files2knowledge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DescribeConfig` and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use files2knowledge::{
    describe_path, plan, BatchStats, DescribeConfig, FailurePolicy, ProgressCallback,
    ProgressObserver, ResizeMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: one bar counting units (images + PDF pages). The bar
/// grows as each PDF is rasterised and its page count becomes known.
struct CliProgress {
    bar: ProgressBar,
    /// Time of the previous unit event; units run back to back.
    last_event: Mutex<Instant>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Describing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            last_event: Mutex::new(Instant::now()),
            errors: AtomicUsize::new(0),
        })
    }

    /// Seconds since the previous event, resetting the clock.
    fn lap(&self) -> f64 {
        match self.last_event.lock() {
            Ok(mut last) => {
                let secs = last.elapsed().as_secs_f64();
                *last = Instant::now();
                secs
            }
            Err(_) => 0.0,
        }
    }
}

impl ProgressObserver for CliProgress {
    fn on_batch_start(&self, pdfs: usize, images: usize) {
        self.bar.set_length(images as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {pdfs} PDF files and {images} image files"))
        ));
    }

    fn on_input_start(&self, path: &Path) {
        self.bar.set_message(display_name(path));
    }

    fn on_document_rasterized(&self, path: &Path, pages: usize) {
        self.lap();
        self.bar.inc_length(pages as u64);
        self.bar.println(format!(
            "  {} {}  {}",
            cyan("▤"),
            display_name(path),
            dim(&format!("{pages} pages"))
        ));
    }

    fn on_unit_complete(&self, label: &str, record: &Path) {
        let secs = self.lap();
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            green("✓"),
            label,
            dim(&display_name(record)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, label: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.lap();
        self.bar.println(format!(
            "  {} {:<32}  {}",
            red("✗"),
            label,
            red(&first_line(error))
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, path: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.lap();
        // Its pages were never added to the bar, so the position stays put.
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            display_name(path),
            red(&first_line(error))
        ));
    }

    fn on_input_skipped(&self, path: &Path) {
        self.bar
            .println(format!("  {} {}  {}", dim("–"), display_name(path), dim("skipped")));
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let errors = self.errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!(
                "{} {} unit(s) failed across {} input(s)",
                red("✘"),
                errors,
                stats.failed
            );
        }
    }
}

/// First line of an error, cut to 80 columns.
fn first_line(error: &str) -> String {
    let line = error.lines().next().unwrap_or(error);
    if line.chars().count() > 80 {
        let cut: String = line.chars().take(79).collect();
        format!("{cut}\u{2026}")
    } else {
        line.to_string()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Describe one image
  files2knowledge --input-path slide.png --output-dir out/

  # Describe every page of a deck
  files2knowledge --input-path deck.pdf --output-dir out/

  # Walk a directory (recursively), keep going past failures
  files2knowledge --input-path slides/ --output-dir out/ --keep-going

  # Another model on another host
  files2knowledge --input-path deck.pdf --output-dir out/ \
      --model llava:13b --api-url http://gpu-box:11434

  # See what would be processed, without calling the model
  files2knowledge --input-path slides/ --output-dir out/ --dry-run

OUTPUT:
  out/slide_description_20240615_123045.json
      {"filename", "timestamp", "description"}
  out/deck_20240615_123050/page_1_description.json
      {"page", "filename", "timestamp", "description"}
  out/deck_20240615_123050/deck_all_descriptions.json
      {"filename", "timestamp", "total_pages", "pages": {"1": ..., "2": ...}}

SETUP:
  1. Start Ollama:    ollama serve
  2. Pull a model:    ollama pull granite3.2-vision
  3. For PDFs, make libpdfium loadable or set PDFIUM_LIB_PATH.
"#;

/// Convert images and PDFs to semantic descriptions using Ollama.
#[derive(Parser, Debug)]
#[command(
    name = "files2knowledge",
    version,
    about = "Convert images and PDFs to semantic descriptions using Ollama",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to input file or directory.
    #[arg(long, alias = "input_path", env = "F2K_INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory path.
    #[arg(long, alias = "output_dir", env = "F2K_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Ollama model to use.
    #[arg(long, env = "OLLAMA_MODEL", default_value = files2knowledge::config::DEFAULT_MODEL)]
    model: String,

    /// Ollama API URL.
    #[arg(long, alias = "api_url", env = "OLLAMA_HOST", default_value = files2knowledge::config::DEFAULT_API_URL)]
    api_url: String,

    /// Prompt to use for the description (default: slide transcription prompt).
    #[arg(long, env = "F2K_PROMPT", conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Path to a text file containing the prompt.
    #[arg(long, env = "F2K_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Canvas every image is resized to before inference, as WIDTHxHEIGHT.
    #[arg(long, env = "F2K_CANVAS", default_value = "800x600", value_parser = parse_canvas)]
    canvas: (u32, u32),

    /// Preserve aspect ratio: scale into the canvas and pad instead of stretching.
    #[arg(long, env = "F2K_FIT")]
    fit: bool,

    /// Number of files processed at once (pages of one PDF stay sequential).
    #[arg(short, long, env = "F2K_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Keep processing other files when one fails (exit status is still nonzero).
    #[arg(long, env = "F2K_KEEP_GOING")]
    keep_going: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "F2K_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Path to the pdfium shared library (or a directory containing it).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Longest edge in pixels of rendered PDF pages.
    #[arg(long, env = "F2K_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// List the files that would be processed and exit.
    #[arg(long)]
    dry_run: bool,

    /// Print the run result as JSON on stdout.
    #[arg(long, env = "F2K_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "F2K_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "F2K_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "F2K_QUIET")]
    quiet: bool,
}

fn parse_canvas(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if w == 0 || h == 0 {
        return Err("canvas dimensions must be positive".into());
    }
    Ok((w, h))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        let plan = plan(&cli.input_path).context("Failed to scan input")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("Failed to serialise plan")?
            );
        } else {
            for p in &plan.pdfs {
                println!("pdf    {}", p.display());
            }
            for p in &plan.images {
                println!("image  {}", p.display());
            }
            for p in &plan.skipped {
                println!("skip   {}", p.display());
            }
            eprintln!(
                "{} PDF files, {} image files, {} skipped",
                plan.pdfs.len(),
                plan.images.len(),
                plan.skipped.len()
            );
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ProgressObserver>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = describe_path(&cli.input_path, &cli.output_dir, &config)
        .await
        .context("Processing failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{} Processing complete in {:.1}s",
            if stats.failed == 0 { green("✔") } else { cyan("⚠") },
            stats.duration_ms as f64 / 1000.0
        );
        eprintln!(
            "   Generated {} image description files.",
            bold(&stats.image_records.to_string())
        );
        eprintln!(
            "   Generated {} PDF description files {}.",
            bold(&stats.document_summaries.to_string()),
            dim(&format!("({} pages)", stats.page_records))
        );
        if stats.skipped > 0 {
            eprintln!("   Skipped {} unsupported files.", stats.skipped);
        }
        for failure in &output.failures {
            eprintln!("   {} {}: {}", red("✗"), failure.path.display(), failure.message);
        }
        eprintln!("   Output directory: {}", bold(&output.output_dir.display().to_string()));
    }

    output.into_result().context("Some inputs failed")?;
    Ok(())
}

/// Map CLI args to `DescribeConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DescribeConfig> {
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(path)) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        ),
        (None, None) => None,
    };

    let mut builder = DescribeConfig::builder()
        .model(cli.model.clone())
        .api_url(cli.api_url.clone())
        .canvas(cli.canvas.0, cli.canvas.1)
        .resize_mode(if cli.fit {
            ResizeMode::Fit
        } else {
            ResizeMode::Stretch
        })
        .max_rendered_pixels(cli.max_pixels)
        .api_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency)
        .failure_policy(if cli.keep_going {
            FailurePolicy::Isolate
        } else {
            FailurePolicy::Abort
        });

    if let Some(p) = prompt {
        builder = builder.prompt(p);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }

    builder.build().context("Bad CLI arguments")
}
