//! Error types for the pdf-blueprint library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BlueprintError`] is **fatal**: the document cannot be processed at all
//!   (unreadable PDF, AI provider not configured). Returned as
//!   `Err(BlueprintError)` from [`crate::process::process_document`] and
//!   friends.
//!
//! * [`ItemError`] is **non-fatal**: a single image or page degraded (OCR
//!   crashed, an upload failed, the vision call gave up) but every other item
//!   is fine. Recorded in [`crate::output::ProcessingStats::degradations`] so
//!   callers can audit partial quality without losing the document.
//!
//! Collaborator-local errors ([`OcrError`], [`StorageError`]) never cross the
//! orchestrator boundary as `Err`; they are absorbed and turned into an
//! `ItemError` plus a fallback value.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-blueprint library.
#[derive(Debug, Error)]
pub enum BlueprintError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The AI vision provider is not initialised (missing API key etc.).
    #[error("AI vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The object storage backend could not be initialised.
    #[error("Object storage is not configured: {0}")]
    StorageNotConfigured(String),

    /// The pdfium shared library could not be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or point PDFIUM_LIB_PATH at a directory\n\
(or file) containing libpdfium.so / libpdfium.dylib / pdfium.dll."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The payload was read, but is not a PDF.
    #[error("Payload is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: [u8; 4] },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("PDF is encrypted and requires a valid password")]
    PasswordRequired,

    /// The extraction engine failed for the whole document (the blocking
    /// extraction task died before returning).
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BlueprintError {
    /// True for errors caused by the caller's configuration rather than the
    /// submitted document.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BlueprintError::ProviderNotConfigured { .. }
                | BlueprintError::StorageNotConfigured(_)
                | BlueprintError::PdfiumBindingFailed(_)
                | BlueprintError::InvalidConfig(_)
        )
    }
}

/// A non-fatal degradation of a single image or page.
///
/// The document still completes; the affected item carries a fallback value
/// (a `vision` disposition, a placeholder URL, an `error` analysis, or an
/// empty page).
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    /// OCR or image decoding failed inside the classifier heuristics.
    #[error("{visual_id}: classification degraded to vision: {detail}")]
    ClassificationDegraded { visual_id: String, detail: String },

    /// Object storage rejected an upload; a placeholder URL was substituted.
    #[error("{name}: upload failed: {detail}")]
    UploadFailed { name: String, detail: String },

    /// The AI vision call produced no usable description.
    #[error("{visual_id}: enrichment failed: {detail}")]
    EnrichmentFailed { visual_id: String, detail: String },

    /// Some content on a page could not be read.
    #[error("Page {page}: extraction degraded: {detail}")]
    PageExtractionDegraded { page: usize, detail: String },
}

/// Failure reported by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The OCR binary could not be started.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but reported a failure.
    #[error("OCR processing failed: {0}")]
    Processing(String),

    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by an object storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage SDK error: {0}")]
    Sdk(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
