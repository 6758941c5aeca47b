//! # pdf-blueprint
//!
//! Turn PDF documents into an ordered, structured blueprint of their content:
//! text, tables, OCR transcriptions and AI-described images, page by page.
//!
//! ## Why this crate?
//!
//! Text extraction alone loses every chart, scan and diagram; sending every
//! image to a vision model is slow and expensive because most embedded images
//! are logos or rules repeated on every page. This crate
//! classifies each image first and only pays for AI where it adds content.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract   text blocks + images per page (pdfium, spawn_blocking)
//!  │               └─ classify each image: unwanted / background / ocr / vision
//!  ├─ 2. Upload    every ocr + vision image, concurrently
//!  ├─ 3. Enrich    every vision image through the AI vision provider
//!  ├─ 4. Merge     results joined back by visual id
//!  └─ 5. Assemble  per-page reading order + flattened text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_blueprint::{process_pdf, ProcessingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ProcessingConfig::default();
//!     let blueprint = process_pdf("document.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&blueprint)?);
//!     eprintln!("{} images described, {} degraded items",
//!         blueprint.stats.vision,
//!         blueprint.stats.degradations.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-blueprint` binary (clap, anyhow, axum server) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-blueprint = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod caption;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{classify, Disposition};
pub use config::{
    ClassifierPolicy, PageSeparator, ProcessingConfig, ProcessingConfigBuilder, StorageSettings, UploadMode,
    VisionRetryPolicy,
};
pub use dedup::DedupState;
pub use error::{BlueprintError, ItemError};
pub use model::{BoundingBox, ContentBlock, PageContent, PageDimensions, Span, VisualContentType};
pub use output::{DocumentBlueprint, ProcessingStats};
pub use process::{process_document, process_pdf, process_pdf_sync, Collaborators};
pub use progress::{NoopProgressCallback, Phase, ProcessingProgressCallback, ProgressCallback};
