//! The content block model shared by every pipeline stage.
//!
//! A page is described as a flat list of [`ContentBlock`]s, each carrying a
//! page-local [`BoundingBox`] in PDF points with a top-left origin (y grows
//! downwards). The block list is the source of truth; the flattened text on
//! [`PageContent`] is only a derived view.
//!
//! Serialisation follows the JSON shape consumed by downstream indexers:
//! blocks are internally tagged by `type` and boxes serialise as
//! `[x0, y0, x1, y1]` arrays.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in page coordinates (points, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Build a box from two corners, normalising their order and clamping
    /// every coordinate to be non-negative.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1).max(0.0),
            y0: y0.min(y1).max(0.0),
            x1: x0.max(x1).max(0.0),
            y1: y0.max(y1).max(0.0),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// True when the horizontal extents of the two boxes overlap.
    pub fn overlaps_horizontally(&self, other: &BoundingBox) -> bool {
        self.x0 <= other.x1 && other.x0 <= self.x1
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// A run of text sharing one font, size and colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub font: String,
    pub size: f32,
    /// `#rrggbb`
    pub color: String,
    pub is_bold: bool,
    pub is_italic: bool,
    /// Last span of its line; rendering inserts a line break after it.
    #[serde(default)]
    pub is_line_end: bool,
}

/// AI-vision classification of an image's informational value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualContentType {
    /// Photograph, chart, diagram, scan: worth describing.
    Substantive,
    /// Icon, logo, border: discarded after text harvesting.
    Decorative,
    /// The vision call produced no usable description.
    Error,
    /// The provider answered with a label we do not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One positioned piece of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Native PDF text.
    Text {
        bounding_box: BoundingBox,
        spans: Vec<Span>,
    },
    /// A detected table as a cell grid (rows of cells).
    Table {
        bounding_box: BoundingBox,
        grid: Vec<Vec<String>>,
        avg_font_size: f32,
    },
    /// An image enriched with an AI description.
    Image {
        bounding_box: BoundingBox,
        url: String,
        visual_id: String,
        caption: Option<String>,
        description: String,
        content_type: VisualContentType,
        raw_text: Option<String>,
        width: u32,
        height: u32,
    },
    /// A text-dominant image replaced by its OCR transcription.
    #[serde(rename = "ocr_text_block")]
    OcrText {
        bounding_box: BoundingBox,
        html_text: String,
        source_url: String,
    },
    /// Text harvested from page furniture (watermarks, logos, banners).
    #[serde(rename = "header_footer_text")]
    HeaderFooterText {
        bounding_box: BoundingBox,
        text: String,
    },
}

impl ContentBlock {
    pub fn bounding_box(&self) -> &BoundingBox {
        match self {
            ContentBlock::Text { bounding_box, .. }
            | ContentBlock::Table { bounding_box, .. }
            | ContentBlock::Image { bounding_box, .. }
            | ContentBlock::OcrText { bounding_box, .. }
            | ContentBlock::HeaderFooterText { bounding_box, .. } => bounding_box,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentBlock::Image { .. })
    }
}

/// Everything the orchestrator knows about one extracted image while a
/// request is in flight. Never serialised; dropped after assembly.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    /// 1-based page number the image was found on.
    pub page_number: usize,
    /// Position of the image in its page's extraction order.
    pub index: usize,
    /// `page_{page}_img_{index}`; unique within a document.
    pub visual_id: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bounding_box: BoundingBox,
    pub caption: Option<String>,
}

impl ImageMetadata {
    pub fn visual_id_for(page_number: usize, index: usize) -> String {
        format!("page_{}_img_{}", page_number, index)
    }

    /// File name used for the uploaded copy.
    pub fn file_name(&self) -> String {
        format!("{}.png", self.visual_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
}

/// The final, immutable description of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// 1-based.
    pub page_number: usize,
    pub page_dimensions: PageDimensions,
    /// Blocks in reading order.
    pub content_blocks: Vec<ContentBlock>,
    /// Derived plain-text rendering of `content_blocks`.
    #[serde(rename = "combined_markdown")]
    pub flattened_text: String,
}

impl PageContent {
    pub fn image_blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content_blocks.iter().filter(|b| b.is_image())
    }
}
