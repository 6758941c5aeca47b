//! Extraction collaborator: PDF bytes → per-page text, images and tables.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and is not safe to drive from async code.
//! The orchestrator calls [`DocumentExtractor::extract`] from inside
//! `tokio::task::spawn_blocking`, so this trait is deliberately synchronous.
//!
//! ## Coordinates
//!
//! pdfium reports object bounds in PDF user space (origin bottom-left,
//! y up). Everything leaving this module is flipped to a top-left origin
//! (y down) so reading order is "ascending y".
//!
//! ## Text grouping
//!
//! pdfium yields one text object per styled run. Runs sharing a baseline are
//! merged into lines ([`Span::is_line_end`] marks the last run), and lines
//! that stack closely with overlapping columns are merged into blocks. The
//! grouping is pure ([`group_text_blocks`]) and tested without pdfium.

use crate::error::BlueprintError;
use crate::model::{BoundingBox, Span};
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One text block as extracted: spans in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub bounding_box: BoundingBox,
    pub spans: Vec<Span>,
}

/// One embedded raster image.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// Position in the page's extraction order; stable across runs.
    pub index: usize,
    /// PNG-encoded pixels of the decoded raster. This is what the dedup hash
    /// and the byte-size rule see, not the embedded stream.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTable {
    pub bounding_box: BoundingBox,
    pub grid: Vec<Vec<String>>,
    pub avg_font_size: f32,
}

/// Everything the extractor found on one page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// 1-based.
    pub number: usize,
    pub width: f64,
    pub height: f64,
    pub text_blocks: Vec<ExtractedText>,
    pub images: Vec<ExtractedImage>,
    pub tables: Vec<ExtractedTable>,
    /// Content that was skipped (undecodable image, unreadable object).
    pub warnings: Vec<String>,
}

/// Anything that can take a whole PDF apart.
///
/// An `Err` means the document as a whole is unreadable; problems with
/// individual objects go into [`ExtractedPage::warnings`].
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8], password: Option<&str>) -> Result<Vec<ExtractedPage>, BlueprintError>;
}

/// pdfium-backed extractor.
///
/// Construct it with [`PdfiumExtractor::bind`], which loads the shared
/// library once so a missing pdfium surfaces as a configuration error at
/// start-up instead of on the first document.
///
/// Table detection is not attempted; `tables` is always empty and tabular
/// content arrives as ordinary text blocks.
#[derive(Debug, Clone)]
pub struct PdfiumExtractor {
    library: Option<PathBuf>,
}

impl PdfiumExtractor {
    /// Bind to pdfium, from `library` when given (a file or the directory
    /// holding it), otherwise from the working directory and then the system
    /// library path.
    pub fn bind(library: Option<PathBuf>) -> Result<Self, BlueprintError> {
        let extractor = Self { library };
        extractor.load()?;
        info!("pdfium bound{}", extractor.library.as_ref().map(|p| format!(" from {}", p.display())).unwrap_or_default());
        Ok(extractor)
    }

    fn load(&self) -> Result<Pdfium, BlueprintError> {
        let bindings = match &self.library {
            Some(path) if path.is_dir() => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path)),
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| BlueprintError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl DocumentExtractor for PdfiumExtractor {
    fn extract(&self, pdf: &[u8], password: Option<&str>) -> Result<Vec<ExtractedPage>, BlueprintError> {
        let pdfium = self.load()?;

        let document = pdfium.load_pdf_from_byte_slice(pdf, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                BlueprintError::PasswordRequired
            } else {
                BlueprintError::CorruptPdf { detail: err_str }
            }
        })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut out = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            out.push(extract_page(idx + 1, &page));
        }
        Ok(out)
    }
}

fn extract_page(number: usize, page: &PdfPage) -> ExtractedPage {
    let width = page.width().value as f64;
    let height = page.height().value as f64;
    let mut fragments = Vec::new();
    let mut images = Vec::new();
    let mut warnings = Vec::new();

    for object in page.objects().iter() {
        let bounds = match object.bounds() {
            Ok(b) => b,
            Err(e) => {
                warnings.push(format!("object without bounds: {:?}", e));
                continue;
            }
        };
        // Flip to a top-left origin.
        let bbox = BoundingBox::new(
            bounds.left().value as f64,
            height - bounds.top().value as f64,
            bounds.right().value as f64,
            height - bounds.bottom().value as f64,
        );

        if let Some(text) = object.as_text_object() {
            let content = text.text();
            if content.trim().is_empty() {
                continue;
            }
            let font = text.font();
            let color = text
                .fill_color()
                .map(|c| format!("#{:02x}{:02x}{:02x}", c.red(), c.green(), c.blue()))
                .unwrap_or_else(|_| "#000000".to_string());
            fragments.push(TextFragment {
                bounding_box: bbox,
                span: Span {
                    text: content,
                    font: font.name(),
                    size: text.unscaled_font_size().value,
                    color,
                    is_bold: font.is_bold_reenforced(),
                    is_italic: font.is_italic(),
                    is_line_end: false,
                },
            });
        } else if let Some(image) = object.as_image_object() {
            let index = images.len();
            match image.get_raw_image() {
                Ok(raw) => match encode_png(&raw) {
                    Ok(bytes) => images.push(ExtractedImage {
                        index,
                        bytes,
                        width: raw.width(),
                        height: raw.height(),
                        bounding_box: bbox,
                    }),
                    Err(e) => warnings.push(format!("image {}: PNG encoding failed: {}", index, e)),
                },
                Err(e) => warnings.push(format!("image {}: {:?}", index, e)),
            }
        }
    }

    for w in &warnings {
        warn!("Page {}: {}", number, w);
    }
    let text_blocks = group_text_blocks(fragments);
    debug!(
        "Page {}: {} text blocks, {} images",
        number,
        text_blocks.len(),
        images.len()
    );

    ExtractedPage {
        number,
        width,
        height,
        text_blocks,
        images,
        tables: Vec::new(),
        warnings,
    }
}

// ── Text grouping ───────────────────────────────────────────────────────

/// A single styled run with its page-space box (top-left origin).
#[derive(Debug, Clone)]
pub struct TextFragment {
    pub bounding_box: BoundingBox,
    pub span: Span,
}

struct Line {
    bbox: BoundingBox,
    fragments: Vec<TextFragment>,
}

impl Line {
    fn center_y(&self) -> f64 {
        (self.bbox.y0 + self.bbox.y1) / 2.0
    }
}

/// Group runs into lines and lines into blocks.
pub fn group_text_blocks(mut fragments: Vec<TextFragment>) -> Vec<ExtractedText> {
    fragments.sort_by(|a, b| {
        a.bounding_box
            .y0
            .total_cmp(&b.bounding_box.y0)
            .then(a.bounding_box.x0.total_cmp(&b.bounding_box.x0))
    });

    // ── Step 1: runs → lines ─────────────────────────────────────────────
    let mut lines: Vec<Line> = Vec::new();
    for frag in fragments {
        let center = (frag.bounding_box.y0 + frag.bounding_box.y1) / 2.0;
        let h = frag.bounding_box.height().max(1.0);
        let joins = lines.iter_mut().rev().take(3).find(|l| {
            let lh = l.bbox.height().max(1.0);
            (l.center_y() - center).abs() < 0.5 * h.min(lh)
        });
        match joins {
            Some(line) => {
                line.bbox = line.bbox.union(&frag.bounding_box);
                line.fragments.push(frag);
            }
            None => lines.push(Line {
                bbox: frag.bounding_box,
                fragments: vec![frag],
            }),
        }
    }
    lines.sort_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0).then(a.bbox.x0.total_cmp(&b.bbox.x0)));

    // ── Step 2: lines → blocks ───────────────────────────────────────────
    let mut blocks: Vec<ExtractedText> = Vec::new();
    let mut last_line: Option<BoundingBox> = None;
    for line in lines {
        let spans = line_spans(line.fragments);
        let joins_previous = match (blocks.last(), last_line) {
            (Some(block), Some(prev)) => {
                let gap = line.bbox.y0 - prev.y1;
                gap < 0.8 * line.bbox.height().max(prev.height()) && block.bounding_box.overlaps_horizontally(&line.bbox)
            }
            _ => false,
        };
        if joins_previous {
            if let Some(block) = blocks.last_mut() {
                block.bounding_box = block.bounding_box.union(&line.bbox);
                block.spans.extend(spans);
            }
        } else {
            blocks.push(ExtractedText {
                bounding_box: line.bbox,
                spans,
            });
        }
        last_line = Some(line.bbox);
    }
    blocks
}

/// Order a line's runs left to right, separate visually spaced runs with a
/// space and mark the last one as the line end.
fn line_spans(mut fragments: Vec<TextFragment>) -> Vec<Span> {
    fragments.sort_by(|a, b| a.bounding_box.x0.total_cmp(&b.bounding_box.x0));
    let mut spans: Vec<Span> = Vec::with_capacity(fragments.len());
    let mut prev_x1: Option<f64> = None;
    for frag in fragments {
        if let (Some(x1), Some(last)) = (prev_x1, spans.last_mut()) {
            let gap = frag.bounding_box.x0 - x1;
            let needs_space = !last.text.ends_with(char::is_whitespace)
                && !frag.span.text.starts_with(char::is_whitespace);
            if needs_space && gap > 0.15 * frag.span.size as f64 {
                last.text.push(' ');
            }
        }
        prev_x1 = Some(frag.bounding_box.x1);
        spans.push(frag.span);
    }
    if let Some(last) = spans.last_mut() {
        last.is_line_end = true;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfiumExtractor::bind(Some(dir.path().join("libpdfium-missing.so"))).unwrap_err();
        assert!(matches!(err, BlueprintError::PdfiumBindingFailed(_)));
        assert!(err.is_configuration());
        assert!(err.to_string().contains("PDFIUM_LIB_PATH"));
    }

    #[test]
    fn empty_library_directory_fails_to_bind() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfiumExtractor::bind(Some(dir.path().to_path_buf())).unwrap_err();
        assert!(err.is_configuration());
    }

    fn frag(x0: f64, y0: f64, x1: f64, y1: f64, text: &str) -> TextFragment {
        TextFragment {
            bounding_box: BoundingBox::new(x0, y0, x1, y1),
            span: Span {
                text: text.into(),
                font: "Helvetica".into(),
                size: 10.0,
                color: "#000000".into(),
                is_bold: false,
                is_italic: false,
                is_line_end: false,
            },
        }
    }

    fn texts(block: &ExtractedText) -> Vec<(&str, bool)> {
        block.spans.iter().map(|s| (s.text.as_str(), s.is_line_end)).collect()
    }

    #[test]
    fn runs_on_one_baseline_form_a_line() {
        let blocks = group_text_blocks(vec![
            frag(60.0, 100.0, 90.0, 110.0, "world"),
            frag(10.0, 100.0, 50.0, 110.0, "Hello"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(texts(&blocks[0]), [("Hello ", false), ("world", true)]);
        assert_eq!(blocks[0].bounding_box, BoundingBox::new(10.0, 100.0, 90.0, 110.0));
    }

    #[test]
    fn adjacent_runs_are_not_spaced() {
        let blocks = group_text_blocks(vec![
            frag(10.0, 100.0, 30.0, 110.0, "foo"),
            frag(30.5, 100.0, 50.0, 110.0, "bar"),
        ]);
        assert_eq!(texts(&blocks[0]), [("foo", false), ("bar", true)]);
    }

    #[test]
    fn stacked_lines_form_a_block() {
        let blocks = group_text_blocks(vec![
            frag(10.0, 100.0, 200.0, 110.0, "first line"),
            frag(10.0, 112.0, 180.0, 122.0, "second line"),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(texts(&blocks[0]), [("first line", true), ("second line", true)]);
    }

    #[test]
    fn distant_lines_split_blocks() {
        let blocks = group_text_blocks(vec![
            frag(10.0, 100.0, 200.0, 110.0, "paragraph one"),
            frag(10.0, 300.0, 200.0, 310.0, "Figure 1: caption"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].spans[0].text, "Figure 1: caption");
    }

    #[test]
    fn separate_columns_split_blocks() {
        let blocks = group_text_blocks(vec![
            frag(10.0, 100.0, 200.0, 110.0, "left column"),
            frag(10.0, 112.0, 200.0, 122.0, "left again"),
            frag(400.0, 124.0, 580.0, 134.0, "right column"),
        ]);
        assert_eq!(blocks.len(), 2);
    }
}
