//! Orchestrator integration tests.
//!
//! Every collaborator is an in-memory fake: no pdfium, no tesseract, no
//! network, no bucket. Payloads only need the `%PDF` magic because the fake
//! extractor ignores them.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use pdf_blueprint::error::{OcrError, StorageError};
use pdf_blueprint::pipeline::encode::encode_png;
use pdf_blueprint::pipeline::extract::{DocumentExtractor, ExtractedImage, ExtractedPage, ExtractedText};
use pdf_blueprint::pipeline::ocr::{OcrEngine, OcrOutput};
use pdf_blueprint::pipeline::storage::{ObjectStore, StoredObject};
use pdf_blueprint::pipeline::vision::{VisionAnalyzer, VisualAnalysis};
use pdf_blueprint::{
    process_document, BlueprintError, BoundingBox, ClassifierPolicy, Collaborators, ContentBlock, ItemError, Phase,
    ProcessingConfig, ProcessingProgressCallback, Span, UploadMode, VisualContentType,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PDF: &[u8] = b"%PDF-1.7\n% fake payload";
const PLACEHOLDER: &str = "https://placehold.co/600x400?text=Upload+Failed";

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeExtractor {
    pages: Option<Vec<ExtractedPage>>,
}

impl DocumentExtractor for FakeExtractor {
    fn extract(&self, _pdf: &[u8], _password: Option<&str>) -> Result<Vec<ExtractedPage>, BlueprintError> {
        self.pages.clone().ok_or_else(|| BlueprintError::CorruptPdf {
            detail: "xref table missing".into(),
        })
    }
}

/// OCR text keyed by image bytes; unknown images read as empty.
#[derive(Default)]
struct FakeOcr {
    texts: HashMap<Vec<u8>, String>,
    calls: Mutex<usize>,
}

impl OcrEngine for FakeOcr {
    fn recognize(&self, image: &[u8]) -> Result<OcrOutput, OcrError> {
        *self.calls.lock().unwrap() += 1;
        Ok(OcrOutput {
            text: self.texts.get(image).cloned().unwrap_or_default(),
            tokens: Vec::new(),
        })
    }
}

/// Analyses keyed by image bytes, each answered after its own delay.
#[derive(Default)]
struct FakeVision {
    answers: HashMap<Vec<u8>, (Duration, VisualAnalysis)>,
}

#[async_trait]
impl VisionAnalyzer for FakeVision {
    async fn analyze(&self, image: &[u8]) -> VisualAnalysis {
        match self.answers.get(image) {
            Some((delay, analysis)) => {
                tokio::time::sleep(*delay).await;
                analysis.clone()
            }
            None => VisualAnalysis {
                content_type: VisualContentType::Substantive,
                description: "an image".into(),
                raw_text: String::new(),
            },
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: HashSet<String>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn locate(&self, file_name: &str) -> StoredObject {
        let key = format!("k-{file_name}");
        StoredObject {
            url: format!("mem://{key}"),
            key,
            file_name: file_name.to_string(),
            content_type: "application/octet-stream".into(),
        }
    }

    async fn put(&self, object: &StoredObject, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.failing.contains(&object.file_name) {
            return Err(StorageError::Sdk("access denied".into()));
        }
        self.objects.lock().unwrap().insert(object.key.clone(), bytes);
        Ok(())
    }
}

// ── Builders ─────────────────────────────────────────────────────────────────

fn png(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
    encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(rgb)))).unwrap()
}

fn page(number: usize) -> ExtractedPage {
    ExtractedPage {
        number,
        width: 612.0,
        height: 792.0,
        ..Default::default()
    }
}

fn image(index: usize, bytes: Vec<u8>, w: u32, h: u32, bbox: [f64; 4]) -> ExtractedImage {
    ExtractedImage {
        index,
        bytes,
        width: w,
        height: h,
        bounding_box: bbox.into(),
    }
}

fn text(bbox: [f64; 4], s: &str) -> ExtractedText {
    ExtractedText {
        bounding_box: bbox.into(),
        spans: vec![Span {
            text: s.into(),
            font: "Helvetica".into(),
            size: 10.0,
            color: "#000000".into(),
            is_bold: false,
            is_italic: false,
            is_line_end: true,
        }],
    }
}

fn analysis(content_type: VisualContentType, description: &str, raw_text: &str) -> VisualAnalysis {
    VisualAnalysis {
        content_type,
        description: description.into(),
        raw_text: raw_text.into(),
    }
}

struct Fixture {
    pages: Option<Vec<ExtractedPage>>,
    ocr: FakeOcr,
    vision: FakeVision,
    store: MemoryStore,
}

impl Fixture {
    fn new(pages: Vec<ExtractedPage>) -> Self {
        Self {
            pages: Some(pages),
            ocr: FakeOcr::default(),
            vision: FakeVision::default(),
            store: MemoryStore::default(),
        }
    }

    fn collaborators(self) -> (Collaborators, Arc<FakeOcr>, Arc<MemoryStore>) {
        let ocr = Arc::new(self.ocr);
        let store = Arc::new(self.store);
        let collaborators = Collaborators {
            extractor: Arc::new(FakeExtractor { pages: self.pages }),
            ocr: ocr.clone(),
            vision: Arc::new(self.vision),
            store: store.clone(),
        };
        (collaborators, ocr, store)
    }
}

fn config() -> ProcessingConfig {
    ProcessingConfig::builder().build().unwrap()
}

fn image_blocks(blocks: &[ContentBlock]) -> Vec<&ContentBlock> {
    blocks.iter().filter(|b| b.is_image()).collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_small_logo_yields_no_image_blocks() {
    let logo = vec![7u8; 2000];
    let mut p1 = page(1);
    p1.images.push(image(0, logo.clone(), 40, 40, [10.0, 10.0, 50.0, 50.0]));
    let mut p2 = page(2);
    p2.images.push(image(0, logo, 40, 40, [10.0, 10.0, 50.0, 50.0]));

    let (collab, ocr, _) = Fixture::new(vec![p1, p2]).collaborators();
    let out = process_document(PDF.to_vec(), "deck.pdf", &collab, &config()).await.unwrap();

    assert_eq!(out.data.len(), 2);
    for page in &out.data {
        assert!(image_blocks(&page.content_blocks).is_empty());
        assert!(page.content_blocks.is_empty());
    }
    assert_eq!(out.stats.background, 2);
    assert_eq!(out.stats.vision, 0);
    // Only the first repeat is OCR'd for furniture text.
    assert_eq!(*ocr.calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn results_are_merged_by_visual_id_not_arrival_order() {
    let slow = png(300, 200, [200, 30, 30]);
    let fast = png(300, 200, [30, 200, 30]);
    let scan = png(400, 500, [250, 250, 250]);

    let mut p1 = page(1);
    p1.text_blocks.push(text([100.0, 310.0, 400.0, 325.0], "Figure 1: revenue by quarter"));
    p1.images.push(image(0, slow.clone(), 300, 200, [100.0, 100.0, 400.0, 300.0]));
    p1.images.push(image(1, fast.clone(), 300, 200, [100.0, 400.0, 400.0, 600.0]));
    let mut p2 = page(2);
    p2.images.push(image(0, scan.clone(), 400, 500, [50.0, 50.0, 450.0, 550.0]));

    let mut fx = Fixture::new(vec![p1, p2]);
    fx.vision.answers.insert(
        slow,
        (Duration::from_millis(60), analysis(VisualContentType::Substantive, "slow chart", "Q1 Q2")),
    );
    fx.vision.answers.insert(
        fast,
        (Duration::from_millis(1), analysis(VisualContentType::Substantive, "fast photo", "")),
    );
    fx.ocr.texts.insert(scan, "Lorem ipsum dolor sit amet. ".repeat(8));
    let (collab, _, store) = fx.collaborators();

    let mut cfg = config();
    cfg.classifier = ClassifierPolicy {
        mixed_content_check: false,
        ..Default::default()
    };
    let out = process_document(PDF.to_vec(), "report.pdf", &collab, &cfg).await.unwrap();

    assert_eq!(out.data.iter().map(|p| p.page_number).collect::<Vec<_>>(), [1, 2]);

    let images = image_blocks(&out.data[0].content_blocks);
    assert_eq!(images.len(), 2);
    match images[0] {
        ContentBlock::Image {
            visual_id,
            url,
            caption,
            description,
            raw_text,
            ..
        } => {
            assert_eq!(visual_id, "page_1_img_0");
            assert_eq!(url, "mem://k-page_1_img_0.png");
            assert_eq!(caption.as_deref(), Some("Figure 1: revenue by quarter"));
            assert_eq!(description, "slow chart");
            assert_eq!(raw_text.as_deref(), Some("Q1 Q2"));
        }
        other => panic!("expected image, got {other:?}"),
    }
    match images[1] {
        ContentBlock::Image {
            visual_id,
            description,
            caption,
            ..
        } => {
            assert_eq!(visual_id, "page_1_img_1");
            assert_eq!(description, "fast photo");
            assert_eq!(*caption, None);
        }
        other => panic!("expected image, got {other:?}"),
    }

    match &out.data[1].content_blocks[..] {
        [ContentBlock::OcrText {
            html_text, source_url, ..
        }] => {
            assert!(html_text.starts_with("<p>Lorem ipsum"));
            assert_eq!(source_url, "mem://k-page_2_img_0.png");
        }
        other => panic!("expected one OCR block, got {other:?}"),
    }

    let objects = store.objects.lock().unwrap();
    assert!(objects.contains_key("k-report.pdf"));
    assert!(objects.contains_key("k-page_2_img_0.png"));
    assert_eq!(out.pdf_url, "mem://k-report.pdf");
    assert!(out.stats.is_clean());
}

#[tokio::test]
async fn decorative_result_becomes_one_header_footer_block() {
    let banner = png(400, 80, [10, 10, 120]);
    let mut p1 = page(1);
    p1.images.push(image(0, banner.clone(), 400, 80, [0.0, 0.0, 612.0, 60.0]));

    let mut fx = Fixture::new(vec![p1]);
    fx.vision.answers.insert(
        banner,
        (Duration::ZERO, analysis(VisualContentType::Decorative, "a banner", "ACME Quarterly")),
    );
    let (collab, _, _) = fx.collaborators();
    let out = process_document(PDF.to_vec(), "a.pdf", &collab, &config()).await.unwrap();

    let blocks = &out.data[0].content_blocks;
    assert!(image_blocks(blocks).is_empty());
    assert_eq!(
        blocks,
        &vec![ContentBlock::HeaderFooterText {
            bounding_box: BoundingBox::new(0.0, 0.0, 612.0, 60.0),
            text: "ACME Quarterly".into(),
        }]
    );
    assert_eq!(out.stats.demoted, 1);
}

#[tokio::test]
async fn failed_uploads_fall_back_to_placeholder() {
    let chart = png(300, 200, [90, 90, 200]);
    let mut p1 = page(1);
    p1.images.push(image(0, chart, 300, 200, [10.0, 10.0, 310.0, 210.0]));

    let mut fx = Fixture::new(vec![p1]);
    fx.store.failing.insert("page_1_img_0.png".into());
    fx.store.failing.insert("broken.pdf".into());
    let (collab, _, _) = fx.collaborators();
    let out = process_document(PDF.to_vec(), "broken.pdf", &collab, &config()).await.unwrap();

    match image_blocks(&out.data[0].content_blocks)[..] {
        [ContentBlock::Image { url, .. }] => assert_eq!(url, PLACEHOLDER),
        ref other => panic!("expected one image, got {other:?}"),
    }
    assert_eq!(out.pdf_url, PLACEHOLDER);
    assert_eq!(out.stats.uploads_failed, 2);
    assert!(out
        .stats
        .degradations
        .iter()
        .all(|d| matches!(d, ItemError::UploadFailed { .. })));
}

#[tokio::test]
async fn vision_error_is_kept_as_low_value_image_block() {
    let chart = png(300, 200, [120, 60, 60]);
    let mut p1 = page(1);
    p1.images.push(image(0, chart.clone(), 300, 200, [10.0, 10.0, 310.0, 210.0]));

    let mut fx = Fixture::new(vec![p1]);
    fx.vision
        .answers
        .insert(chart, (Duration::ZERO, VisualAnalysis::error("Rate limit exceeded")));
    let (collab, _, _) = fx.collaborators();
    let out = process_document(PDF.to_vec(), "a.pdf", &collab, &config()).await.unwrap();

    match image_blocks(&out.data[0].content_blocks)[..] {
        [ContentBlock::Image {
            content_type,
            description,
            ..
        }] => {
            assert_eq!(*content_type, VisualContentType::Error);
            assert_eq!(description, "Rate limit exceeded");
        }
        ref other => panic!("expected one image, got {other:?}"),
    }
    assert_eq!(out.stats.enrichments_failed, 1);
    assert!(matches!(
        out.stats.degradations[..],
        [ItemError::EnrichmentFailed { ref visual_id, .. }] if visual_id == "page_1_img_0"
    ));
}

#[tokio::test]
async fn detached_document_upload_returns_url_immediately() {
    let (collab, _, _) = Fixture::new(vec![page(1)]).collaborators();
    let cfg = ProcessingConfig::builder()
        .document_upload(UploadMode::Detach)
        .build()
        .unwrap();
    let out = process_document(PDF.to_vec(), "a.pdf", &collab, &cfg).await.unwrap();
    assert_eq!(out.pdf_url, "mem://k-a.pdf");
    assert_eq!(out.data.len(), 1);
}

#[tokio::test]
async fn page_warnings_are_recorded_without_failing() {
    let mut p1 = page(1);
    p1.warnings.push("image 0: unsupported filter".into());
    let (collab, _, _) = Fixture::new(vec![p1, page(2)]).collaborators();
    let out = process_document(PDF.to_vec(), "a.pdf", &collab, &config()).await.unwrap();

    assert_eq!(out.data.len(), 2);
    assert!(matches!(
        out.stats.degradations[..],
        [ItemError::PageExtractionDegraded { page: 1, .. }]
    ));
}

#[tokio::test]
async fn unreadable_document_aborts() {
    let fx = Fixture {
        pages: None,
        ..Fixture::new(Vec::new())
    };
    let (collab, _, _) = fx.collaborators();
    let err = process_document(PDF.to_vec(), "a.pdf", &collab, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, BlueprintError::CorruptPdf { .. }));
}

#[test]
fn non_pdf_payload_is_rejected_before_extraction() {
    let (collab, _, store) = Fixture::new(vec![page(1)]).collaborators();
    let err = tokio_test::block_on(process_document(b"PK\x03\x04zip".to_vec(), "a.zip", &collab, &config()))
        .unwrap_err();
    assert!(matches!(err, BlueprintError::NotAPdf { magic } if magic == *b"PK\x03\x04"));
    assert!(store.objects.lock().unwrap().is_empty());
}

#[derive(Default)]
struct PhaseRecorder {
    phases: Mutex<Vec<Phase>>,
    pages: Mutex<usize>,
}

impl ProcessingProgressCallback for PhaseRecorder {
    fn on_processing_start(&self, total_pages: usize) {
        *self.pages.lock().unwrap() = total_pages;
    }

    fn on_phase_complete(&self, phase: Phase) {
        self.phases.lock().unwrap().push(phase);
    }
}

#[tokio::test]
async fn progress_reports_phases_in_order() {
    let (collab, _, _) = Fixture::new(vec![page(1), page(2), page(3)]).collaborators();
    let recorder = Arc::new(PhaseRecorder::default());
    let cfg = ProcessingConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    process_document(PDF.to_vec(), "a.pdf", &collab, &cfg).await.unwrap();

    assert_eq!(*recorder.pages.lock().unwrap(), 3);
    assert_eq!(
        *recorder.phases.lock().unwrap(),
        [Phase::Extract, Phase::Upload, Phase::Enrich, Phase::Merge, Phase::Assemble]
    );
}
