//! CLI binary for pdf-blueprint.
//!
//! A thin shim over the library crate: maps CLI flags to `ProcessingConfig`,
//! then either processes one document and prints the result, or serves the
//! `POST /process-pdf/` endpoint.

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_blueprint::pipeline::input::read_document;
use pdf_blueprint::{
    process_document, BlueprintError, Collaborators, DocumentBlueprint, PageContent, PageSeparator, Phase,
    ProcessingConfig, ProcessingProgressCallback, ProgressCallback, StorageSettings, UploadMode,
};
use serde::Serialize;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────

/// One bar, re-armed for every phase. Upload and enrich items complete out
/// of order; the bar only counts them.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_processing_start(&self, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_phase_start(&self, phase: Phase, items: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_style(style);
        self.bar.set_prefix(format!("{phase:<8}"));
        self.bar.set_length(items as u64);
        self.bar.set_position(0);
        self.bar.reset_elapsed();
    }

    fn on_item_complete(&self, _phase: Phase, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn on_phase_complete(&self, phase: Phase) {
        self.bar.println(format!(
            "  {} {:<8} {}",
            green("✓"),
            phase.to_string(),
            dim(&format!("{} items, {:.1}s", self.bar.length().unwrap_or(0), self.bar.elapsed().as_secs_f64())),
        ));
    }

    fn on_processing_complete(&self, pages: &[PageContent]) {
        self.bar.finish_and_clear();
        eprintln!("{} {} pages processed", green("✔"), bold(&pages.len().to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Blueprint JSON on stdout
  pdf-blueprint report.pdf

  # Flattened Markdown into a file
  pdf-blueprint report.pdf --format markdown -o report.md

  # Store images in S3 instead of ./uploads
  pdf-blueprint --bucket my-bucket --region eu-west-1 report.pdf

  # Serve POST /process-pdf/ on port 8000
  pdf-blueprint --serve --bind 0.0.0.0:8000

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred when set)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  AWS_ACCESS_KEY_ID       S3 credentials (with AWS_SECRET_ACCESS_KEY)
  AWS_REGION              S3 region (default us-east-1)
  TESSERACT_CMD_PATH      Path to the tesseract binary
  RUST_LOG                Log filter, e.g. pdf_blueprint=debug

A .env file in the working directory is loaded on start-up.
"#;

/// Turn PDF documents into ordered, AI-enriched content blueprints.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-blueprint",
    version,
    about = "Turn PDF documents into ordered, AI-enriched content blueprints",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "serve")]
    input: Option<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "PDF_BLUEPRINT_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "PDF_BLUEPRINT_FORMAT", value_enum, default_value = "json")]
    format: FormatArg,

    /// Page separator for Markdown output: none, hr, comment, or custom string.
    #[arg(long, env = "PDF_BLUEPRINT_SEPARATOR", default_value = "none")]
    separator: String,

    /// Serve the HTTP endpoint instead of processing a single input.
    #[arg(long)]
    serve: bool,

    /// Listen address for --serve.
    #[arg(long, env = "PDF_BLUEPRINT_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Allowed CORS origin for --serve (repeatable).
    #[arg(long = "cors-origin", env = "PDF_BLUEPRINT_CORS_ORIGIN", default_value = "http://localhost:3000")]
    cors_origins: Vec<String>,

    /// Maximum upload size for --serve, in megabytes.
    #[arg(long, env = "PDF_BLUEPRINT_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// Vision provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID (e.g. gemini-2.0-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// S3 bucket for uploads. When unset, files go to --uploads-dir.
    #[arg(long, env = "S3_BUCKET_NAME")]
    bucket: Option<String>,

    /// S3 region.
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// S3-compatible endpoint URL (MinIO, R2, …).
    #[arg(long, env = "S3_ENDPOINT")]
    endpoint: Option<String>,

    /// Local upload directory used when no bucket is configured.
    #[arg(long, env = "PDF_BLUEPRINT_UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Public URL prefix for files in --uploads-dir.
    #[arg(long, env = "PDF_BLUEPRINT_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Do not wait for the document archival upload to finish.
    #[arg(long, env = "PDF_BLUEPRINT_DETACH_UPLOAD")]
    detach_upload: bool,

    /// Concurrent image uploads.
    #[arg(long, env = "PDF_BLUEPRINT_UPLOAD_CONCURRENCY", default_value_t = 16)]
    upload_concurrency: usize,

    /// Concurrent vision calls.
    #[arg(long, env = "PDF_BLUEPRINT_VISION_CONCURRENCY", default_value_t = 8)]
    vision_concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_BLUEPRINT_PASSWORD")]
    password: Option<String>,

    /// pdfium shared library, or the directory containing it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF_BLUEPRINT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_BLUEPRINT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_BLUEPRINT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_BLUEPRINT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs in one-shot mode.
    let show_progress = !cli.serve && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info,tower_http=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ProcessingProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // Missing credentials fail here, before any document is read.
    let collaborators = Collaborators::from_config(&config)
        .await
        .context("Failed to initialise collaborators")?;

    if cli.serve {
        return serve(&cli, config, collaborators).await;
    }

    let input = cli.input.as_deref().context("missing input")?;
    let doc = read_document(input, config.download_timeout_secs)
        .await
        .with_context(|| format!("Failed to read {input}"))?;
    let blueprint = process_document(doc.bytes, &doc.file_name, &collaborators, &config)
        .await
        .context("Processing failed")?;

    let rendered = match cli.format {
        FormatArg::Json => serde_json::to_string_pretty(&blueprint).context("Failed to serialise output")?,
        FormatArg::Markdown => blueprint.to_markdown(&parse_separator(&cli.separator)),
    };

    if let Some(ref path) = cli.output {
        write_atomic(path, &rendered).await?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        print_summary(&blueprint, cli.output.as_ref());
    }
    Ok(())
}

fn print_summary(blueprint: &DocumentBlueprint, output: Option<&PathBuf>) {
    let s = &blueprint.stats;
    eprintln!(
        "   {} images ({} kept): {} described, {} ocr, {} background, {} unwanted, {}ms total",
        dim(&s.images_seen.to_string()),
        blueprint.image_count(),
        s.vision,
        s.ocr,
        s.background,
        s.unwanted,
        s.total_duration_ms,
    );
    for item in &s.degradations {
        eprintln!("   {} {}", cyan("⚠"), item);
    }
    if let Some(path) = output {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }
}

/// Write via temp file + rename so a crash never leaves a partial file.
async fn write_atomic(path: &PathBuf, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move output to {}", path.display()))?;
    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let storage = match cli.bucket {
        Some(ref bucket) => StorageSettings::S3 {
            bucket: bucket.clone(),
            region: cli.region.clone(),
            endpoint: cli.endpoint.clone(),
        },
        None => StorageSettings::Local {
            dir: cli.uploads_dir.clone(),
            public_base_url: cli.public_base_url.clone(),
        },
    };

    let mut builder = ProcessingConfig::builder()
        .upload_concurrency(cli.upload_concurrency)
        .vision_concurrency(cli.vision_concurrency)
        .storage(storage)
        .download_timeout_secs(cli.download_timeout)
        .document_upload(if cli.detach_upload {
            UploadMode::Detach
        } else {
            UploadMode::Await
        });
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

// ── HTTP server ──────────────────────────────────────────────────────────

struct AppState {
    collaborators: Collaborators,
    config: ProcessingConfig,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `{"detail": "..."}` error body.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "detail": self.1 }))).into_response()
    }
}

impl From<BlueprintError> for ApiError {
    fn from(e: BlueprintError) -> Self {
        let internal = matches!(e, BlueprintError::Internal(_) | BlueprintError::ExtractionFailed(_));
        let status = if e.is_configuration() || internal {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        };
        ApiError(status, e.to_string())
    }
}

async fn process_pdf_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DocumentBlueprint>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError(StatusCode::BAD_REQUEST, format!("Invalid multipart body: {e}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document.pdf").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("Failed to read upload: {e}")))?;
        tracing::info!("Received {} ({} bytes)", file_name, bytes.len());

        let blueprint = process_document(bytes.to_vec(), &file_name, &state.collaborators, &state.config).await?;
        return Ok(Json(blueprint));
    }

    tracing::warn!("No file field found in multipart upload");
    Err(ApiError(StatusCode::BAD_REQUEST, "multipart field 'file' is required".into()))
}

async fn serve(cli: &Cli, config: ProcessingConfig, collaborators: Collaborators) -> Result<()> {
    let origins = cli
        .cors_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{o}'")))
        .collect::<Result<Vec<_>>>()?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let state = Arc::new(AppState { collaborators, config });
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/process-pdf/", post(process_pdf_upload))
        .layer(DefaultBodyLimit::max(cli.max_upload_mb * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    tracing::info!("pdf-blueprint listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
