//! Image encoding for the vision call: shrink, PNG-encode, base64-wrap.
//!
//! Embedded PDF images are often far larger than a vision model needs (a
//! 4000 px scan of a small logo). [`resize_for_vision`] caps the longest edge
//! with a budget that grows linearly with how much of the page the image
//! covers: a thumbnail-sized figure gets `min_edge`, a full-page plate gets
//! `max_edge`.
//!
//! PNG is used throughout because it is lossless; JPEG artefacts around
//! chart labels and small print confuse vision models.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, warn};

/// Longest edge (px) allowed for an image covering `coverage` (0–1) of its page.
pub fn vision_edge_budget(coverage: f64, min_edge: u32, max_edge: u32) -> u32 {
    let coverage = coverage.clamp(0.0, 1.0);
    (min_edge as f64 + (max_edge.saturating_sub(min_edge)) as f64 * coverage) as u32
}

/// Shrink `bytes` so neither edge exceeds the coverage-based budget.
///
/// Images already within budget are returned untouched, as are images that
/// fail to decode (the vision service may still cope with them).
pub fn resize_for_vision(bytes: &[u8], coverage: f64, min_edge: u32, max_edge: u32) -> Vec<u8> {
    let budget = vision_edge_budget(coverage, min_edge, max_edge);
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!("resize: cannot decode image, sending original ({})", e);
            return bytes.to_vec();
        }
    };
    if img.width() <= budget && img.height() <= budget {
        return bytes.to_vec();
    }

    let resized = img.thumbnail(budget, budget);
    match encode_png(&resized) {
        Ok(out) => {
            debug!(
                "resized {}x{} → {}x{} (budget {} px)",
                img.width(),
                img.height(),
                resized.width(),
                resized.height(),
                budget
            );
            out
        }
        Err(e) => {
            warn!("resize: PNG encoding failed, sending original ({})", e);
            bytes.to_vec()
        }
    }
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Wrap encoded image bytes for a multimodal chat message.
///
/// `detail: "high"` keeps fine print legible on OpenAI-style tiling; other
/// providers ignore it.
pub fn image_data(bytes: &[u8]) -> ImageData {
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "image/png",
    };
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime).with_detail("high")
}
