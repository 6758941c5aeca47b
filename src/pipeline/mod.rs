//! External collaborators and the plumbing around them.
//!
//! Each submodule owns one boundary the orchestrator talks across, behind a
//! trait so tests can swap in fakes without pdfium, tesseract, a network or a
//! bucket.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (classifier, uses ocr) ──▶ storage
//! (bytes)   (pdfium)                              └─▶ encode ──▶ vision
//! ```
//!
//! 1. [`input`]   : read a path or download a URL, check the `%PDF` magic
//! 2. [`extract`] : text blocks and images per page; synchronous, runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`ocr`]     : text and token boxes from image bytes (tesseract CLI)
//! 4. [`storage`] : durable URL for bytes (S3 or a local directory)
//! 5. [`encode`]  : shrink and base64-wrap images for the vision request
//! 6. [`vision`]  : describe an image, with the rate-limit/transport retry
//!    contract

pub mod encode;
pub mod extract;
pub mod input;
pub mod ocr;
pub mod storage;
pub mod vision;
