//! Content block assembler: reading order + flattened text.
//!
//! Once every block of a page is known (native text, tables, OCR
//! transcriptions, enriched images, harvested furniture text) the assembler
//! sorts them into reading order and renders the derived plain-text view.
//!
//! ## Reading order
//!
//! Top edge ascending, then left edge ascending. The sort is stable, so two
//! blocks that start on the same line keep their extraction order when their
//! left edges also tie.
//!
//! ## Rendering
//!
//! | Block | Rendered as |
//! |-------|-------------|
//! | text | span texts, with a newline after each line-end span |
//! | table | GFM pipe table, first row as header |
//! | image | caption (or "Untitled Image") + visual description |
//! | OCR text | HTML-stripped transcription |
//! | header/footer | raw text |
//!
//! Parts are joined by a blank line and then run through a few deterministic
//! cleanup rules (line endings, trailing whitespace, invisible characters,
//! runs of blank lines).

use crate::model::{BoundingBox, ContentBlock, PageContent, PageDimensions, Span};
use once_cell::sync::Lazy;
use regex::Regex;

const UNTITLED_IMAGE: &str = "Untitled Image";

/// Sort `blocks` into reading order and render the flattened text.
pub fn sort_and_render(mut blocks: Vec<ContentBlock>) -> (Vec<ContentBlock>, String) {
    blocks.sort_by(|a, b| {
        let (a, b) = (a.bounding_box(), b.bounding_box());
        a.y0.total_cmp(&b.y0).then(a.x0.total_cmp(&b.x0))
    });

    let text = blocks
        .iter()
        .map(render_block)
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (blocks, clean_text(&text))
}

impl PageContent {
    /// Build the final, immutable page from its accumulated blocks.
    pub fn assemble(page_number: usize, page_dimensions: PageDimensions, blocks: Vec<ContentBlock>) -> Self {
        let (content_blocks, flattened_text) = sort_and_render(blocks);
        Self {
            page_number,
            page_dimensions,
            content_blocks,
            flattened_text,
        }
    }
}

// ── Block constructors ──────────────────────────────────────────────────

/// A text-dominant image replaced by its transcription.
pub fn ocr_block(bounding_box: BoundingBox, text: &str, source_url: impl Into<String>) -> ContentBlock {
    ContentBlock::OcrText {
        bounding_box,
        html_text: format!("<p>{}</p>", html_escape::encode_text(text)),
        source_url: source_url.into(),
    }
}

pub fn header_footer_block(bounding_box: BoundingBox, text: impl Into<String>) -> ContentBlock {
    ContentBlock::HeaderFooterText {
        bounding_box,
        text: text.into(),
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { spans, .. } => render_spans(spans),
        ContentBlock::Table { grid, .. } => render_table(grid),
        ContentBlock::Image {
            caption,
            description,
            ..
        } => {
            let title = caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(UNTITLED_IMAGE);
            format!("{}\n\nVisual Description: {}", title, description)
        }
        ContentBlock::OcrText { html_text, .. } => strip_html(html_text),
        ContentBlock::HeaderFooterText { text, .. } => text.clone(),
    }
}

/// Span text joined as-is, with a newline after each line-end span.
fn render_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        out.push_str(&span.text);
        if span.is_line_end {
            out.push('\n');
        }
    }
    out.trim().to_string()
}

fn render_table(grid: &[Vec<String>]) -> String {
    let Some(header) = grid.first() else {
        return String::new();
    };
    let cols = grid.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let row = |cells: &[String]| {
        let mut line = String::from("|");
        for i in 0..cols {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push(' ');
            line.push_str(&cell.replace('|', "\\|").replace('\n', " "));
            line.push_str(" |");
        }
        line
    };

    let mut lines = vec![row(header)];
    lines.push(std::iter::once("|").chain(std::iter::repeat_n(" --- |", cols)).collect());
    lines.extend(grid[1..].iter().map(|r| row(r)));
    lines.join("\n")
}

static RE_BREAK_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>").unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

fn strip_html(html: &str) -> String {
    let s = RE_BREAK_TAGS.replace_all(html, "\n");
    let s = RE_TAGS.replace_all(&s, "");
    html_escape::decode_html_entities(&s).trim().to_string()
}

// ── Cleanup ─────────────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn clean_text(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = s
        .replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'], "");
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    RE_BLANK_LINES.replace_all(&s, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisualContentType;

    fn span(text: &str, line_end: bool) -> Span {
        Span {
            text: text.into(),
            font: "Times".into(),
            size: 11.0,
            color: "#000000".into(),
            is_bold: false,
            is_italic: false,
            is_line_end: line_end,
        }
    }

    fn text(x0: f64, y0: f64, s: &str) -> ContentBlock {
        ContentBlock::Text {
            bounding_box: BoundingBox::new(x0, y0, x0 + 100.0, y0 + 10.0),
            spans: vec![span(s, true)],
        }
    }

    fn first_text(block: &ContentBlock) -> &str {
        match block {
            ContentBlock::Text { spans, .. } => &spans[0].text,
            ContentBlock::HeaderFooterText { text, .. } => text,
            _ => "",
        }
    }

    #[test]
    fn sorts_top_to_bottom_then_left_to_right() {
        let (blocks, flat) = sort_and_render(vec![
            text(300.0, 50.0, "right"),
            text(10.0, 200.0, "bottom"),
            text(10.0, 50.0, "left"),
        ]);
        let order: Vec<_> = blocks.iter().map(first_text).collect();
        assert_eq!(order, ["left", "right", "bottom"]);
        assert_eq!(flat, "left\n\nright\n\nbottom");
    }

    #[test]
    fn equal_positions_keep_input_order() {
        let (blocks, _) = sort_and_render(vec![
            text(10.0, 50.0, "first"),
            header_footer_block(BoundingBox::new(10.0, 50.0, 90.0, 60.0), "second"),
            text(10.0, 50.0, "third"),
        ]);
        let order: Vec<_> = blocks.iter().map(first_text).collect();
        assert_eq!(order, ["first", "second", "third"]);
    }

    #[test]
    fn spans_break_on_line_end() {
        let block = ContentBlock::Text {
            bounding_box: BoundingBox::default(),
            spans: vec![span("Hello ", false), span("world", true), span("again", true)],
        };
        assert_eq!(render_block(&block), "Hello world\nagain");
    }

    #[test]
    fn image_renders_caption_and_description() {
        let mut block = ContentBlock::Image {
            bounding_box: BoundingBox::default(),
            url: "https://b/x.png".into(),
            visual_id: "page_1_img_0".into(),
            caption: Some("Figure 1: demo".into()),
            description: "A bar chart.".into(),
            content_type: VisualContentType::Substantive,
            raw_text: None,
            width: 10,
            height: 10,
        };
        assert_eq!(render_block(&block), "Figure 1: demo\n\nVisual Description: A bar chart.");
        if let ContentBlock::Image { caption, .. } = &mut block {
            *caption = None;
        }
        assert!(render_block(&block).starts_with("Untitled Image\n\n"));
    }

    #[test]
    fn ocr_html_round_trips_to_plain_text() {
        let block = ocr_block(BoundingBox::default(), "a < b & c", "u");
        if let ContentBlock::OcrText { html_text, .. } = &block {
            assert_eq!(html_text, "<p>a &lt; b &amp; c</p>");
        }
        assert_eq!(render_block(&block), "a < b & c");
    }

    #[test]
    fn tables_render_as_gfm() {
        let grid = vec![
            vec!["Name".to_string(), "Qty".to_string()],
            vec!["a|b".to_string()],
        ];
        assert_eq!(render_table(&grid), "| Name | Qty |\n| --- | --- |\n| a\\|b |  |");
        assert_eq!(render_table(&[]), "");
    }

    #[test]
    fn empty_parts_are_skipped_and_text_cleaned() {
        let (_, flat) = sort_and_render(vec![
            text(0.0, 0.0, "top\u{200B}   "),
            header_footer_block(BoundingBox::new(0.0, 5.0, 1.0, 6.0), "   "),
            text(0.0, 10.0, "end"),
        ]);
        assert_eq!(flat, "top\n\nend");
    }

    #[test]
    fn page_assembly_is_ordered() {
        let page = PageContent::assemble(
            2,
            PageDimensions { width: 612.0, height: 792.0 },
            vec![text(0.0, 100.0, "b"), text(0.0, 10.0, "a")],
        );
        assert_eq!(page.page_number, 2);
        assert_eq!(page.flattened_text, "a\n\nb");
    }
}
