//! Caption matcher: pair an image with the caption printed below it.
//!
//! A text block is a caption candidate when its text starts like one
//! ("Fig. 3", "Figure 2.1", "Table A", "Chart 4", "(b)"). Among candidates
//! whose top edge is at or below the image's bottom edge, the closest one
//! within `max_gap` points wins; ties keep the first candidate encountered.

use crate::model::{BoundingBox, ContentBlock};
use once_cell::sync::Lazy;
use regex::Regex;

static CAPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(fig|figure|table|chart)\.?\s*[\w.]+|^\s*\(\w\)").unwrap()
});

/// True when `text` starts like a figure/table caption.
pub fn looks_like_caption(text: &str) -> bool {
    CAPTION_RE.is_match(text)
}

/// Text of a block as a caption would read: span texts joined by a space.
fn block_text(spans: &[crate::model::Span]) -> String {
    spans
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Find the caption for the image at `image_bbox` among `candidates`.
///
/// Non-text blocks are ignored.
pub fn find_caption(image_bbox: &BoundingBox, candidates: &[ContentBlock], max_gap: f64) -> Option<String> {
    let mut best: Option<(f64, String)> = None;

    for block in candidates {
        let ContentBlock::Text { bounding_box, spans } = block else {
            continue;
        };
        if bounding_box.y0 < image_bbox.y1 {
            continue;
        }
        let gap = bounding_box.y0 - image_bbox.y1;
        if gap >= max_gap {
            continue;
        }
        if best.as_ref().is_some_and(|(g, _)| gap >= *g) {
            continue;
        }
        let text = block_text(spans);
        if looks_like_caption(&text) {
            best = Some((gap, text));
        }
    }

    best.map(|(_, text)| text)
}
