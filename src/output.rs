//! Result types returned by the orchestrator.
//!
//! [`DocumentBlueprint`] serialises to exactly the document the HTTP endpoint
//! returns: `{ "data": [PageContent, ...], "pdf_url": "..." }`. Processing
//! statistics and the degradation log ride along for library callers but are
//! never serialised.

use crate::config::PageSeparator;
use crate::error::ItemError;
use crate::model::PageContent;
use serde::{Deserialize, Serialize};

/// The processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentBlueprint {
    /// One entry per page, ascending by page number.
    pub data: Vec<PageContent>,
    /// URL of the archived original document.
    pub pdf_url: String,
    #[serde(skip)]
    pub stats: ProcessingStats,
}

impl DocumentBlueprint {
    /// Join every page's flattened text into one Markdown document.
    pub fn to_markdown(&self, separator: &PageSeparator) -> String {
        let mut out = String::new();
        for (i, page) in self.data.iter().enumerate() {
            if i > 0 {
                out.push_str(&separator.render(page.page_number));
            }
            out.push_str(&page.flattened_text);
        }
        out
    }

    /// Total image blocks across all pages.
    pub fn image_count(&self) -> usize {
        self.data.iter().map(|p| p.image_blocks().count()).sum()
    }
}

/// Counters and timings for one processing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_pages: usize,
    /// Every image the extractor returned, before classification.
    pub images_seen: usize,
    pub unwanted: usize,
    pub background: usize,
    pub ocr: usize,
    pub vision: usize,
    pub uploads_failed: usize,
    pub enrichments_failed: usize,
    /// Vision results judged decorative and demoted to furniture text.
    pub demoted: usize,
    /// Every absorbed, non-fatal failure, in the order it was recorded.
    pub degradations: Vec<ItemError>,
    pub extract_duration_ms: u64,
    pub upload_duration_ms: u64,
    pub enrich_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ProcessingStats {
    /// True when no item degraded.
    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }
}
