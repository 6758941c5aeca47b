//! Configuration types for document processing.
//!
//! All processing behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. Every classification threshold is a
//! named policy knob on [`ClassifierPolicy`] rather than a literal buried in
//! the classifier, so deployments can tune them without touching code.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::BlueprintError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for processing one or more documents.
///
/// # Example
/// ```rust
/// use pdf_blueprint::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .vision_concurrency(4)
///     .caption_max_gap(40.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.vision_concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Image classification thresholds.
    pub classifier: ClassifierPolicy,

    /// Maximum vertical gap (points) between an image's bottom edge and a
    /// caption's top edge. Default: 50.
    pub caption_max_gap: f64,

    /// In-flight object storage uploads. Default: 16.
    pub upload_concurrency: usize,

    /// In-flight AI vision calls. Default: 8.
    ///
    /// Vision APIs rate-limit per key; all images of a document are pooled
    /// into one fan-out, so a dense 100-page deck would otherwise open
    /// hundreds of requests at once.
    pub vision_concurrency: usize,

    /// Retry contract for the AI vision collaborator.
    pub vision_retry: VisionRetryPolicy,

    /// Lower bound of the longest edge (px) an image is shrunk to before the
    /// vision call. Default: 400.
    pub vision_min_edge: u32,

    /// Upper bound of the longest edge (px); reached by images that cover
    /// the whole page. Default: 800.
    pub vision_max_edge: u32,

    /// Vision model identifier, e.g. "gemini-2.0-flash". If None, uses the
    /// provider default.
    pub model: Option<String>,

    /// Vision provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, the provider is detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the vision call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 4096.
    pub max_tokens: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// URL recorded for an image whose upload failed.
    pub placeholder_url: String,

    /// pdfium shared library (file or containing directory). `None` tries
    /// the working directory, then the system library path.
    pub pdfium_library: Option<PathBuf>,

    /// How the whole-document archival upload is driven. Default: `Await`.
    pub document_upload: UploadMode,

    /// Where uploaded images and documents go.
    pub storage: StorageSettings,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives phase and per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierPolicy::default(),
            caption_max_gap: 50.0,
            upload_concurrency: 16,
            vision_concurrency: 8,
            vision_retry: VisionRetryPolicy::default(),
            vision_min_edge: 400,
            vision_max_edge: 800,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            password: None,
            pdfium_library: None,
            placeholder_url: "https://placehold.co/600x400?text=Upload+Failed".to_string(),
            document_upload: UploadMode::default(),
            storage: StorageSettings::default(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("classifier", &self.classifier)
            .field("caption_max_gap", &self.caption_max_gap)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("vision_concurrency", &self.vision_concurrency)
            .field("vision_retry", &self.vision_retry)
            .field("vision_min_edge", &self.vision_min_edge)
            .field("vision_max_edge", &self.vision_max_edge)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("document_upload", &self.document_upload)
            .field("storage", &self.storage)
            .field("pdfium_library", &self.pdfium_library)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn classifier(mut self, policy: ClassifierPolicy) -> Self {
        self.config.classifier = policy;
        self
    }

    pub fn caption_max_gap(mut self, gap: f64) -> Self {
        self.config.caption_max_gap = gap.max(0.0);
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = n.max(1);
        self
    }

    pub fn vision_concurrency(mut self, n: usize) -> Self {
        self.config.vision_concurrency = n.max(1);
        self
    }

    pub fn vision_retry(mut self, policy: VisionRetryPolicy) -> Self {
        self.config.vision_retry = policy;
        self
    }

    pub fn vision_edges(mut self, min_edge: u32, max_edge: u32) -> Self {
        self.config.vision_min_edge = min_edge;
        self.config.vision_max_edge = max_edge;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn placeholder_url(mut self, url: impl Into<String>) -> Self {
        self.config.placeholder_url = url.into();
        self
    }

    pub fn document_upload(mut self, mode: UploadMode) -> Self {
        self.config.document_upload = mode;
        self
    }

    pub fn storage(mut self, storage: StorageSettings) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, BlueprintError> {
        let c = &self.config;
        if c.vision_min_edge == 0 || c.vision_min_edge > c.vision_max_edge {
            return Err(BlueprintError::InvalidConfig(format!(
                "vision edges must satisfy 0 < min ≤ max, got {}..{}",
                c.vision_min_edge, c.vision_max_edge
            )));
        }
        let p = &c.classifier;
        if p.min_aspect_ratio <= 0.0 || p.min_aspect_ratio >= p.max_aspect_ratio {
            return Err(BlueprintError::InvalidConfig(format!(
                "aspect ratio bounds must satisfy 0 < min < max, got {}..{}",
                p.min_aspect_ratio, p.max_aspect_ratio
            )));
        }
        if p.density_sample_step == 0 {
            return Err(BlueprintError::InvalidConfig(
                "density sample step must be ≥ 1".into(),
            ));
        }
        if c.placeholder_url.is_empty() {
            return Err(BlueprintError::InvalidConfig(
                "placeholder URL must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Thresholds driving the image classifier.
///
/// These are policy knobs tuned on real documents, not derived constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Images smaller than this many bytes *and* [`Self::min_dimension`]
    /// on their longest edge are page furniture. Default: 3072.
    pub min_bytes: usize,
    /// Default: 50 px.
    pub min_dimension: u32,
    /// width / height above this is a rule or border. Default: 20.
    pub max_aspect_ratio: f64,
    /// width / height below this is a rule or border. Default: 0.05.
    pub min_aspect_ratio: f64,
    /// OCR output longer than this (chars) marks an image text-dominant. Default: 100.
    pub ocr_text_threshold: usize,
    /// Run the graphic-density check on text-dominant images. Default: true.
    pub mixed_content_check: bool,
    /// Default: 0.15.
    pub non_text_density_threshold: f64,
    /// Default: 0.30.
    pub edge_density_threshold: f64,
    /// OCR tokens at or below this confidence are ignored. Default: 30.
    pub token_confidence_threshold: f32,
    /// Euclidean RGB distance under which two colours are "the same". Default: 30.
    pub color_distance_threshold: f64,
    /// Edge-filter response above which a pixel is an edge. Default: 50.
    pub edge_intensity_threshold: u8,
    /// Grid step for the colour scan. Default: 5.
    pub density_sample_step: u32,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            min_bytes: 3072,
            min_dimension: 50,
            max_aspect_ratio: 20.0,
            min_aspect_ratio: 0.05,
            ocr_text_threshold: 100,
            mixed_content_check: true,
            non_text_density_threshold: 0.15,
            edge_density_threshold: 0.30,
            token_confidence_threshold: 30.0,
            color_distance_threshold: 30.0,
            edge_intensity_threshold: 50,
            density_sample_step: 5,
        }
    }
}

/// Retry contract of the AI vision collaborator.
///
/// Rate-limit responses back off linearly (`base × attempt`: 2 s, 4 s, 6 s);
/// transport failures wait a fixed delay. On exhaustion the collaborator
/// returns an `error`-typed analysis instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionRetryPolicy {
    pub rate_limit_retries: u32,
    pub rate_limit_backoff: Duration,
    pub transport_retries: u32,
    pub transport_delay: Duration,
}

impl Default for VisionRetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_retries: 3,
            rate_limit_backoff: Duration::from_secs(2),
            transport_retries: 3,
            transport_delay: Duration::from_secs(5),
        }
    }
}

impl VisionRetryPolicy {
    /// Delay before rate-limit retry number `retry` (1-based).
    pub fn rate_limit_delay(&self, retry: u32) -> Duration {
        self.rate_limit_backoff * retry
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How an upload is driven relative to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadMode {
    /// Await the upload inside the request; the URL is confirmed. (default)
    #[default]
    Await,
    /// Spawn the upload and return its URL immediately without confirmation.
    Detach,
}

/// Object storage backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorageSettings {
    /// Write into a local directory. `public_base_url` prefixes returned
    /// URLs; when absent the file path is returned.
    Local {
        dir: PathBuf,
        public_base_url: Option<String>,
    },
    /// Amazon S3 or an S3-compatible service (MinIO, R2, …). Credentials come
    /// from the standard AWS environment chain.
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Local {
            dir: PathBuf::from("uploads"),
            public_base_url: None,
        }
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
