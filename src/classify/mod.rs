//! Image classifier: decide what every extracted image *is*.
//!
//! ## Dispositions
//!
//! | Disposition | Meaning | Later phases |
//! |-------------|---------|--------------|
//! | `Unwanted`   | degenerate rule/border, zero-sized | dropped |
//! | `Background` | repeated or tiny page furniture | text (if any) kept as header/footer text |
//! | `Ocr`        | text-dominant scan | uploaded, transcription used as-is |
//! | `Vision`     | anything else | uploaded and described by the AI |
//!
//! ## Decision order (first match wins)
//!
//! 1. hash already junk → `Background`
//! 2. hash seen once → promote to junk, OCR once, `Background` + text
//! 3. tiny (bytes *and* longest edge under the policy minimums) → `Background`
//! 4. zero-sized or extreme aspect ratio → `Unwanted`
//! 5. OCR longer than the text threshold → `Ocr`, unless the graphic-density
//!    check says the image is mixed, then `Vision`
//! 6. otherwise → `Vision`
//!
//! ## Fail open
//!
//! Any OCR or decode failure on a first-time image yields `Vision` and a
//! degradation note. Sending a clean scan to the AI costs a call; dropping a
//! chart because tesseract crashed loses content.
//!
//! Step 2 reclassifies a hash retroactively: the *first* occurrence was
//! already classified and its block is kept in the output. Only later
//! occurrences become background.

pub mod density;

use crate::config::ClassifierPolicy;
use crate::dedup::{DedupState, Sighting};
use crate::pipeline::ocr::OcrEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Four-way outcome for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Unwanted,
    Background,
    Ocr,
    Vision,
}

/// What the classifier knows about one image.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub bytes: &'a [u8],
    /// Pixel dimensions as reported by the extractor.
    pub width: u32,
    pub height: u32,
    /// Page size in points.
    pub page_width: f64,
    pub page_height: f64,
}

impl ImageInput<'_> {
    /// Pixel area over page area, clamped to `[0, 1]`.
    pub fn page_coverage(&self) -> f64 {
        let page_area = self.page_width * self.page_height;
        if page_area <= 0.0 {
            return 0.0;
        }
        (self.width as f64 * self.height as f64 / page_area).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub disposition: Disposition,
    /// Harvested text: OCR transcription for `Ocr`, furniture text for
    /// `Background`.
    pub text: Option<String>,
    /// Set when a heuristic failed and the disposition fell back to `Vision`.
    pub degraded: Option<String>,
}

impl Classification {
    fn of(disposition: Disposition) -> Self {
        Self {
            disposition,
            text: None,
            degraded: None,
        }
    }

    fn with_text(disposition: Disposition, text: String) -> Self {
        Self {
            disposition,
            text: Some(text),
            degraded: None,
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Vision,
            text: None,
            degraded: Some(detail.into()),
        }
    }
}

/// Classify one image, updating `dedup` with its hash.
pub fn classify(
    image: &ImageInput<'_>,
    dedup: &mut DedupState,
    ocr: &dyn OcrEngine,
    policy: &ClassifierPolicy,
) -> Classification {
    // ── Step 1-2: repeats ────────────────────────────────────────────────
    match dedup.observe(image.bytes) {
        Sighting::Junk => return Classification::of(Disposition::Background),
        Sighting::FirstRepeat => {
            debug!("repeated image promoted to background, harvesting text");
            return match ocr.recognize(image.bytes) {
                Ok(out) if !out.text.trim().is_empty() => {
                    Classification::with_text(Disposition::Background, out.text.trim().to_string())
                }
                Ok(_) => Classification::of(Disposition::Background),
                Err(e) => {
                    warn!("OCR failed on repeated image: {}", e);
                    Classification::of(Disposition::Background)
                }
            };
        }
        Sighting::First => {}
    }

    // ── Step 3-4: geometry ───────────────────────────────────────────────
    let longest = image.width.max(image.height);
    if image.bytes.len() < policy.min_bytes && longest < policy.min_dimension {
        return Classification::of(Disposition::Background);
    }
    if image.width == 0 || image.height == 0 {
        return Classification::of(Disposition::Unwanted);
    }
    let aspect = image.width as f64 / image.height as f64;
    if aspect > policy.max_aspect_ratio || aspect < policy.min_aspect_ratio {
        return Classification::of(Disposition::Unwanted);
    }

    // ── Step 5: text-dominant? ───────────────────────────────────────────
    let out = match ocr.recognize(image.bytes) {
        Ok(out) => out,
        Err(e) => return Classification::degraded(e.to_string()),
    };
    let text = out.text.trim();
    if text.chars().count() <= policy.ocr_text_threshold {
        return Classification::of(Disposition::Vision);
    }
    if !policy.mixed_content_check {
        return Classification::with_text(Disposition::Ocr, text.to_string());
    }

    match density::measure(image.bytes, &out.tokens, policy) {
        Ok(report) if report.is_mixed(policy) => {
            debug!(
                "mixed content (non-text {:.3}, edges {:.3})",
                report.non_text, report.edge
            );
            Classification::of(Disposition::Vision)
        }
        Ok(_) => Classification::with_text(Disposition::Ocr, text.to_string()),
        Err(e) => Classification::degraded(format!("image decode failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::pipeline::ocr::OcrOutput;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOcr {
        text: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedOcr {
        fn text(t: &str) -> Self {
            Self {
                text: Some(t.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                text: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _image: &[u8]) -> Result<OcrOutput, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.text {
                Some(t) => Ok(OcrOutput {
                    text: t.clone(),
                    tokens: vec![],
                }),
                None => Err(OcrError::Processing("boom".into())),
            }
        }
    }

    fn input(bytes: &[u8], width: u32, height: u32) -> ImageInput<'_> {
        ImageInput {
            bytes,
            width,
            height,
            page_width: 612.0,
            page_height: 792.0,
        }
    }

    fn white_png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn long_text() -> String {
        "lorem ipsum ".repeat(20)
    }

    #[test]
    fn repeated_bytes_become_background_with_harvested_text() {
        let ocr = FixedOcr::text("  ACME Corp  ");
        let policy = ClassifierPolicy::default();
        let mut dedup = DedupState::new();
        let bytes = vec![7u8; 8192];

        let first = classify(&input(&bytes, 300, 200), &mut dedup, &ocr, &policy);
        assert_ne!(first.disposition, Disposition::Background);

        let second = classify(&input(&bytes, 300, 200), &mut dedup, &ocr, &policy);
        assert_eq!(second.disposition, Disposition::Background);
        assert_eq!(second.text.as_deref(), Some("ACME Corp"));

        let calls = ocr.calls.load(Ordering::SeqCst);
        let third = classify(&input(&bytes, 300, 200), &mut dedup, &ocr, &policy);
        assert_eq!(third, Classification::of(Disposition::Background));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), calls, "junk hit must not OCR");
    }

    #[test]
    fn repeat_with_failing_ocr_is_background_without_text() {
        let ocr = FixedOcr::failing();
        let mut dedup = DedupState::new();
        let bytes = vec![1u8; 8192];
        let policy = ClassifierPolicy::default();
        classify(&input(&bytes, 300, 200), &mut dedup, &ocr, &policy);
        let second = classify(&input(&bytes, 300, 200), &mut dedup, &ocr, &policy);
        assert_eq!(second, Classification::of(Disposition::Background));
    }

    #[test]
    fn tiny_images_are_background() {
        let ocr = FixedOcr::text(&long_text());
        let bytes = vec![0u8; 2000];
        let c = classify(&input(&bytes, 40, 40), &mut DedupState::new(), &ocr, &ClassifierPolicy::default());
        assert_eq!(c, Classification::of(Disposition::Background));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tiny_rule_wins_over_extreme_aspect_ratio() {
        let ocr = FixedOcr::text("");
        let policy = ClassifierPolicy::default();
        let bytes = vec![0u8; 1500];
        let sliver = classify(&input(&bytes, 45, 2), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(sliver, Classification::of(Disposition::Background));
        let zero = classify(&input(&bytes, 0, 30), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(zero.disposition, Disposition::Background);
    }

    #[test]
    fn small_bytes_but_large_dimensions_are_not_tiny() {
        let ocr = FixedOcr::text("");
        let bytes = vec![0u8; 2000];
        let c = classify(&input(&bytes, 400, 300), &mut DedupState::new(), &ocr, &ClassifierPolicy::default());
        assert_eq!(c.disposition, Disposition::Vision);
    }

    #[test]
    fn extreme_aspect_ratios_are_unwanted() {
        let ocr = FixedOcr::text("");
        let policy = ClassifierPolicy::default();
        let bytes = vec![0u8; 4096];
        let wide = classify(&input(&bytes, 2100, 100), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(wide.disposition, Disposition::Unwanted);
        let tall = classify(&input(&bytes, 4, 100), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(tall.disposition, Disposition::Unwanted);
        let zero = classify(&input(&bytes, 0, 100), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(zero.disposition, Disposition::Unwanted);
    }

    #[test]
    fn text_heavy_flat_image_is_ocr() {
        let ocr = FixedOcr::text(&long_text());
        let png = white_png(200, 200);
        let c = classify(&input(&png, 200, 200), &mut DedupState::new(), &ocr, &ClassifierPolicy::default());
        assert_eq!(c.disposition, Disposition::Ocr);
        assert_eq!(c.text.as_deref(), Some(long_text().trim()));
    }

    #[test]
    fn text_heavy_mixed_image_is_vision() {
        let ocr = FixedOcr::text(&long_text());
        let mut buf = Vec::new();
        let chart = RgbImage::from_fn(200, 200, |x, y| {
            if (20..120).contains(&x) && (20..180).contains(&y) {
                Rgb([30, 90, 200])
            } else {
                Rgb([255, 255, 255])
            }
        });
        DynamicImage::ImageRgb8(chart)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        let c = classify(&input(&buf, 200, 200), &mut DedupState::new(), &ocr, &ClassifierPolicy::default());
        assert_eq!(c, Classification::of(Disposition::Vision));
    }

    #[test]
    fn mixed_check_can_be_disabled() {
        let ocr = FixedOcr::text(&long_text());
        let policy = ClassifierPolicy {
            mixed_content_check: false,
            ..ClassifierPolicy::default()
        };
        let bytes = vec![0u8; 4096];
        let c = classify(&input(&bytes, 200, 200), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(c.disposition, Disposition::Ocr);
    }

    #[test]
    fn failures_fail_open_to_vision() {
        let policy = ClassifierPolicy::default();
        let bytes = vec![0u8; 4096];

        let c = classify(&input(&bytes, 200, 200), &mut DedupState::new(), &FixedOcr::failing(), &policy);
        assert_eq!(c.disposition, Disposition::Vision);
        assert!(c.degraded.is_some());

        // OCR "succeeds" but the bytes cannot be decoded for the density check.
        let ocr = FixedOcr::text(&long_text());
        let c = classify(&input(&bytes, 200, 200), &mut DedupState::new(), &ocr, &policy);
        assert_eq!(c.disposition, Disposition::Vision);
        assert!(c.degraded.unwrap().contains("decode"));
    }

    #[test]
    fn coverage_is_clamped() {
        let bytes: [u8; 0] = [];
        let full = ImageInput {
            bytes: &bytes,
            width: 5000,
            height: 5000,
            page_width: 612.0,
            page_height: 792.0,
        };
        assert_eq!(full.page_coverage(), 1.0);
        let no_page = ImageInput { page_width: 0.0, ..full };
        assert_eq!(no_page.page_coverage(), 0.0);
    }
}
