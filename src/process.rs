//! Pipeline orchestrator: one document in, ordered page blueprints out.
//!
//! ## Phases
//!
//! Strictly sequential, no re-entry:
//!
//! ```text
//! Extract ──▶ Upload ──▶ Enrich ──▶ Merge ──▶ Assemble
//! (blocking)  (fan-out)  (fan-out)  (by key)  (per page)
//! ```
//!
//! The archival upload of the whole document is spawned before Extract and
//! awaited (or not, see [`UploadMode`]) after Assemble.
//!
//! ## Why pool images across pages?
//!
//! Upload and vision latency dominate. Fanning out per page would leave the
//! pipeline idle while one slow page finishes; pooling every image of the
//! document keeps `upload_concurrency` / `vision_concurrency` requests in
//! flight for the whole run.
//!
//! ## Correlation by key
//!
//! `buffer_unordered` yields results in completion order. Every result is
//! keyed by its image's `visual_id` and looked up during Merge, so arrival
//! order never influences the output.
//!
//! ## Failure policy
//!
//! Only the extractor can abort a document. Upload failures become the
//! placeholder URL, vision failures become an `error` analysis, heuristic
//! failures become a `vision` disposition. Each is recorded as an
//! [`ItemError`] in [`ProcessingStats::degradations`].

use crate::assemble::{header_footer_block, ocr_block};
use crate::caption::find_caption;
use crate::classify::{classify, Disposition, ImageInput};
use crate::config::{ProcessingConfig, UploadMode};
use crate::dedup::DedupState;
use crate::error::{BlueprintError, ItemError, StorageError};
use crate::model::{ContentBlock, ImageMetadata, PageContent, PageDimensions, VisualContentType};
use crate::output::{DocumentBlueprint, ProcessingStats};
use crate::pipeline::encode::resize_for_vision;
use crate::pipeline::extract::{DocumentExtractor, PdfiumExtractor};
use crate::pipeline::input::{ensure_pdf_magic, read_document};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::storage::{self, ObjectStore};
use crate::pipeline::vision::{LlmVisionAnalyzer, VisionAnalyzer, VisualAnalysis};
use crate::progress::{Phase, ProcessingProgressCallback};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The four external collaborators a document run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub ocr: Arc<dyn OcrEngine>,
    pub vision: Arc<dyn VisionAnalyzer>,
    pub store: Arc<dyn ObjectStore>,
}

impl Collaborators {
    /// Build the production collaborators: pdfium, tesseract, the configured
    /// vision provider and object store.
    ///
    /// Fails with a configuration error when no vision provider, pdfium
    /// library or storage backend can be set up, before any document is
    /// touched.
    pub async fn from_config(config: &ProcessingConfig) -> Result<Self, BlueprintError> {
        let provider = resolve_provider(config)?;
        let extractor = PdfiumExtractor::bind(config.pdfium_library.clone())?;
        let store = storage::from_settings(&config.storage).await?;

        let ocr = TesseractOcr::default();
        if !ocr.is_available() {
            warn!("tesseract not found; OCR-based classification will degrade to vision");
        }

        Ok(Self {
            extractor: Arc::new(extractor),
            ocr: Arc::new(ocr),
            vision: Arc::new(LlmVisionAnalyzer::new(provider, config)),
            store,
        })
    }
}

/// Process a local PDF file or HTTP(S) URL with production collaborators.
pub async fn process_pdf(input: impl AsRef<str>, config: &ProcessingConfig) -> Result<DocumentBlueprint, BlueprintError> {
    let input = input.as_ref();
    info!("Starting processing: {}", input);

    // Configuration errors surface before any download.
    let collaborators = Collaborators::from_config(config).await?;
    let doc = read_document(input, config.download_timeout_secs).await?;
    process_document(doc.bytes, &doc.file_name, &collaborators, config).await
}

/// Synchronous wrapper around [`process_pdf`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_pdf_sync(input: impl AsRef<str>, config: &ProcessingConfig) -> Result<DocumentBlueprint, BlueprintError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BlueprintError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_pdf(input, config))
}

/// Run every phase for one in-memory document.
///
/// # Errors
/// Only document-level failures: payload is not a PDF, the extractor cannot
/// read it, or an internal task panicked. Everything else degrades the
/// affected item and is reported in `stats.degradations`.
pub async fn process_document(
    bytes: Vec<u8>,
    file_name: &str,
    collaborators: &Collaborators,
    config: &ProcessingConfig,
) -> Result<DocumentBlueprint, BlueprintError> {
    let total_start = Instant::now();
    ensure_pdf_magic(&bytes)?;

    // ── Step 1: Archive the document (runs alongside every phase) ────────
    let archive = DocumentUpload::start(&collaborators.store, file_name, bytes.clone(), config.document_upload);

    // ── Step 2: Extract + classify (pdfium is blocking) ──────────────────
    let extract_start = Instant::now();
    let extractor = Arc::clone(&collaborators.extractor);
    let ocr = Arc::clone(&collaborators.ocr);
    let cfg = config.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_and_classify(&bytes, extractor.as_ref(), ocr.as_ref(), &cfg))
        .await
        .map_err(|e| BlueprintError::ExtractionFailed(format!("extract task aborted: {}", e)))
        .and_then(|r| r);
    let Extraction {
        mut drafts,
        pending,
        mut stats,
    } = match extracted {
        Ok(extraction) => extraction,
        Err(e) => {
            archive.abort();
            return Err(e);
        }
    };
    stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(
        "Extracted {} pages, {} images ({} ocr, {} vision, {} background, {} unwanted) in {}ms",
        stats.total_pages,
        stats.images_seen,
        stats.ocr,
        stats.vision,
        stats.background,
        stats.unwanted,
        stats.extract_duration_ms
    );

    // ── Step 3: Upload fan-out ───────────────────────────────────────────
    let upload_start = Instant::now();
    let urls = upload_images(&pending, collaborators.store.as_ref(), config, &mut stats).await;
    stats.upload_duration_ms = upload_start.elapsed().as_millis() as u64;

    // ── Step 4: Enrich fan-out ───────────────────────────────────────────
    let enrich_start = Instant::now();
    let mut analyses = enrich_images(&pending, collaborators.vision.as_ref(), config, &mut stats).await;
    stats.enrich_duration_ms = enrich_start.elapsed().as_millis() as u64;

    // ── Step 5: Merge by visual_id ───────────────────────────────────────
    notify(config, |cb| cb.on_phase_start(Phase::Merge, pending.len()));
    for image in pending {
        let Some(draft) = drafts.get_mut(&image.meta.page_number) else {
            continue;
        };
        let url = urls
            .get(&image.meta.visual_id)
            .cloned()
            .unwrap_or_else(|| config.placeholder_url.clone());
        let analysis = analyses.remove(&image.meta.visual_id);
        if let Some(block) = merge_image(image, url, analysis, &mut stats) {
            draft.blocks.push(block);
        }
    }
    notify(config, |cb| cb.on_phase_complete(Phase::Merge));

    // ── Step 6: Assemble each page ───────────────────────────────────────
    notify(config, |cb| cb.on_phase_start(Phase::Assemble, drafts.len()));
    let total = drafts.len();
    let data: Vec<PageContent> = drafts
        .into_values()
        .enumerate()
        .map(|(i, draft)| {
            let page = PageContent::assemble(draft.number, draft.dimensions, draft.blocks);
            notify(config, |cb| cb.on_item_complete(Phase::Assemble, i + 1, total));
            page
        })
        .collect();
    notify(config, |cb| cb.on_phase_complete(Phase::Assemble));

    // ── Step 7: Document URL ─────────────────────────────────────────────
    let pdf_url = archive.finish(config, file_name, &mut stats).await;

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Processing complete: {} pages, {} degradations, {}ms total",
        data.len(),
        stats.degradations.len(),
        stats.total_duration_ms
    );
    notify(config, |cb| cb.on_processing_complete(&data));

    Ok(DocumentBlueprint { data, pdf_url, stats })
}

// ── Extract phase ───────────────────────────────────────────────────────

/// A page whose blocks are still being collected.
#[derive(Debug)]
struct PageDraft {
    number: usize,
    dimensions: PageDimensions,
    blocks: Vec<ContentBlock>,
}

/// An image that survived classification and needs upload (and maybe vision).
#[derive(Debug)]
struct PendingImage {
    meta: ImageMetadata,
    disposition: Disposition,
    /// Transcription for `Ocr` images.
    ocr_text: Option<String>,
    /// Resized copy for the vision call; `Some` only for `Vision` images.
    vision_bytes: Option<Vec<u8>>,
}

struct Extraction {
    drafts: BTreeMap<usize, PageDraft>,
    pending: Vec<PendingImage>,
    stats: ProcessingStats,
}

/// Extract every page, classify every image and partition the survivors.
///
/// The dedup state lives only for the duration of this call.
fn extract_and_classify(
    pdf: &[u8],
    extractor: &dyn DocumentExtractor,
    ocr: &dyn OcrEngine,
    config: &ProcessingConfig,
) -> Result<Extraction, BlueprintError> {
    let pages = extractor.extract(pdf, config.password.as_deref())?;
    let total = pages.len();
    notify(config, |cb| cb.on_processing_start(total));
    notify(config, |cb| cb.on_phase_start(Phase::Extract, total));

    let mut dedup = DedupState::new();
    let mut drafts = BTreeMap::new();
    let mut pending = Vec::new();
    let mut stats = ProcessingStats {
        total_pages: total,
        ..Default::default()
    };

    for (done, page) in pages.into_iter().enumerate() {
        for warning in &page.warnings {
            stats.degradations.push(ItemError::PageExtractionDegraded {
                page: page.number,
                detail: warning.clone(),
            });
        }

        let mut blocks: Vec<ContentBlock> = page
            .text_blocks
            .into_iter()
            .map(|t| ContentBlock::Text {
                bounding_box: t.bounding_box,
                spans: t.spans,
            })
            .collect();
        blocks.extend(page.tables.into_iter().map(|t| ContentBlock::Table {
            bounding_box: t.bounding_box,
            grid: t.grid,
            avg_font_size: t.avg_font_size,
        }));

        for image in page.images {
            stats.images_seen += 1;
            let input = ImageInput {
                bytes: &image.bytes,
                width: image.width,
                height: image.height,
                page_width: page.width,
                page_height: page.height,
            };
            let coverage = input.page_coverage();
            let verdict = classify(&input, &mut dedup, ocr, &config.classifier);
            let visual_id = ImageMetadata::visual_id_for(page.number, image.index);
            debug!("{}: {:?}", visual_id, verdict.disposition);

            match verdict.disposition {
                Disposition::Unwanted => stats.unwanted += 1,
                Disposition::Background => {
                    stats.background += 1;
                    if let Some(text) = verdict.text.filter(|t| !t.trim().is_empty()) {
                        blocks.push(header_footer_block(image.bounding_box, text));
                    }
                }
                Disposition::Ocr | Disposition::Vision => {
                    if let Some(detail) = verdict.degraded {
                        warn!("{}: classification degraded: {}", visual_id, detail);
                        stats.degradations.push(ItemError::ClassificationDegraded {
                            visual_id: visual_id.clone(),
                            detail,
                        });
                    }
                    let vision_bytes = if verdict.disposition == Disposition::Vision {
                        stats.vision += 1;
                        Some(resize_for_vision(
                            &image.bytes,
                            coverage,
                            config.vision_min_edge,
                            config.vision_max_edge,
                        ))
                    } else {
                        stats.ocr += 1;
                        None
                    };
                    let caption = find_caption(&image.bounding_box, &blocks, config.caption_max_gap);
                    pending.push(PendingImage {
                        meta: ImageMetadata {
                            page_number: page.number,
                            index: image.index,
                            visual_id,
                            bytes: image.bytes,
                            width: image.width,
                            height: image.height,
                            bounding_box: image.bounding_box,
                            caption,
                        },
                        disposition: verdict.disposition,
                        ocr_text: verdict.text,
                        vision_bytes,
                    });
                }
            }
        }

        drafts.insert(
            page.number,
            PageDraft {
                number: page.number,
                dimensions: PageDimensions {
                    width: page.width,
                    height: page.height,
                },
                blocks,
            },
        );
        notify(config, |cb| cb.on_item_complete(Phase::Extract, done + 1, total));
    }

    debug!(
        "Dedup: {} distinct images, {} repeated as junk",
        dedup.seen_count(),
        dedup.junk_count()
    );
    notify(config, |cb| cb.on_phase_complete(Phase::Extract));
    Ok(Extraction { drafts, pending, stats })
}

// ── Fan-out phases ──────────────────────────────────────────────────────

/// Upload every pending image; failures map to the placeholder URL.
async fn upload_images(
    pending: &[PendingImage],
    store: &dyn ObjectStore,
    config: &ProcessingConfig,
    stats: &mut ProcessingStats,
) -> HashMap<String, String> {
    let total = pending.len();
    notify(config, |cb| cb.on_phase_start(Phase::Upload, total));

    let mut results = stream::iter(pending.iter().map(|image| async move {
        let name = image.meta.file_name();
        let result = storage::upload(store, &name, image.meta.bytes.clone()).await;
        (image.meta.visual_id.as_str(), name, result)
    }))
    .buffer_unordered(config.upload_concurrency)
    .boxed();

    let mut urls = HashMap::with_capacity(total);
    let mut done = 0;
    while let Some((visual_id, name, result)) = results.next().await {
        done += 1;
        let url = match result {
            Ok(url) => url,
            Err(e) => {
                warn!("{}: upload failed, using placeholder: {}", name, e);
                stats.uploads_failed += 1;
                stats.degradations.push(ItemError::UploadFailed {
                    name,
                    detail: e.to_string(),
                });
                config.placeholder_url.clone()
            }
        };
        urls.insert(visual_id.to_string(), url);
        notify(config, |cb| cb.on_item_complete(Phase::Upload, done, total));
    }

    notify(config, |cb| cb.on_phase_complete(Phase::Upload));
    urls
}

/// Describe every `Vision` image. Never fails; error results are recorded.
async fn enrich_images(
    pending: &[PendingImage],
    vision: &dyn VisionAnalyzer,
    config: &ProcessingConfig,
    stats: &mut ProcessingStats,
) -> HashMap<String, VisualAnalysis> {
    let jobs: Vec<(&str, &[u8])> = pending
        .iter()
        .filter_map(|p| p.vision_bytes.as_deref().map(|b| (p.meta.visual_id.as_str(), b)))
        .collect();
    let total = jobs.len();
    notify(config, |cb| cb.on_phase_start(Phase::Enrich, total));

    let mut results = stream::iter(
        jobs.into_iter()
            .map(|(visual_id, bytes)| async move { (visual_id, vision.analyze(bytes).await) }),
    )
    .buffer_unordered(config.vision_concurrency)
    .boxed();

    let mut analyses = HashMap::with_capacity(total);
    let mut done = 0;
    while let Some((visual_id, analysis)) = results.next().await {
        done += 1;
        if analysis.is_error() {
            warn!("{}: vision analysis failed: {}", visual_id, analysis.description);
            stats.enrichments_failed += 1;
            stats.degradations.push(ItemError::EnrichmentFailed {
                visual_id: visual_id.to_string(),
                detail: analysis.description.clone(),
            });
        }
        analyses.insert(visual_id.to_string(), analysis);
        notify(config, |cb| cb.on_item_complete(Phase::Enrich, done, total));
    }

    notify(config, |cb| cb.on_phase_complete(Phase::Enrich));
    analyses
}

// ── Merge phase ─────────────────────────────────────────────────────────

/// Turn one image and its phase results into its final block, if any.
///
/// Decorative vision results are demoted: their text (if any) becomes
/// header/footer text and the image itself is dropped.
fn merge_image(
    image: PendingImage,
    url: String,
    analysis: Option<VisualAnalysis>,
    stats: &mut ProcessingStats,
) -> Option<ContentBlock> {
    let meta = image.meta;
    if image.disposition == Disposition::Ocr {
        let text = image.ocr_text.unwrap_or_default();
        return Some(ocr_block(meta.bounding_box, &text, url));
    }

    let analysis = analysis.unwrap_or_else(|| VisualAnalysis::error("no analysis was produced"));
    if analysis.content_type == VisualContentType::Decorative {
        stats.demoted += 1;
        debug!("{}: decorative, demoted", meta.visual_id);
        let text = analysis.raw_text.trim();
        return (!text.is_empty()).then(|| header_footer_block(meta.bounding_box, text));
    }

    let raw_text = Some(analysis.raw_text).filter(|t| !t.trim().is_empty());
    Some(ContentBlock::Image {
        bounding_box: meta.bounding_box,
        url,
        visual_id: meta.visual_id,
        caption: meta.caption,
        description: analysis.description,
        content_type: analysis.content_type,
        raw_text,
        width: meta.width,
        height: meta.height,
    })
}

// ── Document archival ───────────────────────────────────────────────────

enum DocumentUpload {
    /// Upload spawned without confirmation; URL known up front.
    Detached(String),
    /// Upload spawned, awaited in [`DocumentUpload::finish`].
    Pending(JoinHandle<Result<String, StorageError>>),
}

impl DocumentUpload {
    fn start(store: &Arc<dyn ObjectStore>, file_name: &str, bytes: Vec<u8>, mode: UploadMode) -> Self {
        let store = Arc::clone(store);
        match mode {
            UploadMode::Detach => {
                let object = store.locate(file_name);
                let url = object.url.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.put(&object, bytes).await {
                        warn!("detached document upload {} failed: {}", object.key, e);
                    }
                });
                DocumentUpload::Detached(url)
            }
            UploadMode::Await => {
                let name = file_name.to_string();
                DocumentUpload::Pending(tokio::spawn(async move { storage::upload(store.as_ref(), &name, bytes).await }))
            }
        }
    }

    fn abort(self) {
        if let DocumentUpload::Pending(handle) = self {
            handle.abort();
        }
    }

    async fn finish(self, config: &ProcessingConfig, file_name: &str, stats: &mut ProcessingStats) -> String {
        let handle = match self {
            DocumentUpload::Detached(url) => return url,
            DocumentUpload::Pending(handle) => handle,
        };
        let detail = match handle.await {
            Ok(Ok(url)) => return url,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("upload task failed: {}", e),
        };
        warn!("document upload failed, using placeholder: {}", detail);
        stats.uploads_failed += 1;
        stats.degradations.push(ItemError::UploadFailed {
            name: file_name.to_string(),
            detail,
        });
        config.placeholder_url.clone()
    }
}

// ── Provider resolution ─────────────────────────────────────────────────

fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "gemini" => "gemini-2.0-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, BlueprintError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| BlueprintError::ProviderNotConfigured {
        provider: provider_name.to_string(),
        hint: format!("{e}"),
    })
}

fn env_is_set(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. a pre-built `config.provider`
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `GEMINI_API_KEY`, then `OPENAI_API_KEY`
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(config: &ProcessingConfig) -> Result<Arc<dyn LLMProvider>, BlueprintError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    for (key, name) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if env_is_set(key) {
            let model = config.model.as_deref().unwrap_or_else(|| default_model(name));
            return create_vision_provider(name, model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| BlueprintError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No AI vision provider could be auto-detected from environment.\n\
            Set GEMINI_API_KEY or OPENAI_API_KEY, or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;
    Ok(llm_provider)
}

fn notify(config: &ProcessingConfig, event: impl FnOnce(&dyn ProcessingProgressCallback)) {
    if let Some(ref cb) = config.progress_callback {
        event(cb.as_ref());
    }
}
