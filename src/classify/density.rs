//! Graphic-density check for text-dominant images.
//!
//! OCR happily reads the labels of a chart or the callouts of a diagram, so
//! "lots of text" alone does not make an image safe to replace by its
//! transcription. This module measures how much of the image is *neither*
//! background nor text:
//!
//! 1. background colour: most frequent RGB value along the four borders
//! 2. text regions: boxes of OCR tokens above the confidence threshold
//! 3. text colours: the centre pixel of every text region
//! 4. non-text density: sampled pixels outside text regions that are far from
//!    every known colour, over the number of sample points
//! 5. edge density: pixels outside text regions whose edge-filter response
//!    exceeds the intensity threshold, over all non-text pixels
//!
//! The image is *mixed* when either density crosses its policy threshold.

use crate::config::ClassifierPolicy;
use crate::pipeline::ocr::OcrToken;
use image::{imageops, GrayImage, RgbImage};
use std::collections::HashMap;

/// 3×3 Laplacian-style kernel matching the classic "find edges" filter.
const FIND_EDGES: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

/// Both densities measured on one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityReport {
    pub non_text: f64,
    pub edge: f64,
}

impl DensityReport {
    pub fn is_mixed(&self, policy: &ClassifierPolicy) -> bool {
        self.non_text > policy.non_text_density_threshold || self.edge > policy.edge_density_threshold
    }
}

type Rgb = [u8; 3];

/// Half-open pixel rectangle `[x0, x1) × [y0, y1)`, clamped to the image.
#[derive(Debug, Clone, Copy)]
struct Region {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Region {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Decode `bytes` and measure both densities.
pub fn measure(
    bytes: &[u8],
    tokens: &[OcrToken],
    policy: &ClassifierPolicy,
) -> Result<DensityReport, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    let gray = img.to_luma8();

    let regions = text_regions(tokens, policy.token_confidence_threshold, rgb.width(), rgb.height());
    let mut known = text_colors(&rgb, &regions);
    if let Some(bg) = background_color(&rgb) {
        known.push(bg);
    }

    Ok(DensityReport {
        non_text: non_text_density(&rgb, &regions, &known, policy),
        edge: edge_density(&gray, &regions, policy.edge_intensity_threshold),
    })
}

/// Most frequent colour on the border. Ties go to the smallest RGB triple
/// so the result does not depend on hash iteration order.
fn background_color(img: &RgbImage) -> Option<Rgb> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let mut counts: HashMap<Rgb, usize> = HashMap::new();
    let mut tally = |x: u32, y: u32| *counts.entry(img.get_pixel(x, y).0).or_default() += 1;
    for x in 0..w {
        tally(x, 0);
        tally(x, h - 1);
    }
    for y in 0..h {
        tally(0, y);
        tally(w - 1, y);
    }
    counts
        .into_iter()
        .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then_with(|| cb.cmp(ca)))
        .map(|(c, _)| c)
}

fn text_regions(tokens: &[OcrToken], min_confidence: f32, w: u32, h: u32) -> Vec<Region> {
    tokens
        .iter()
        .filter(|t| t.confidence > min_confidence)
        .map(|t| {
            let (x0, y0, x1, y1) = t.rect();
            Region {
                x0: x0.min(w),
                y0: y0.min(h),
                x1: x1.min(w),
                y1: y1.min(h),
            }
        })
        .filter(|r| r.x1 > r.x0 && r.y1 > r.y0)
        .collect()
}

fn text_colors(img: &RgbImage, regions: &[Region]) -> Vec<Rgb> {
    let mut colors: Vec<Rgb> = Vec::new();
    for r in regions {
        let (cx, cy) = ((r.x0 + r.x1) / 2, (r.y0 + r.y1) / 2);
        if cx < img.width() && cy < img.height() {
            let c = img.get_pixel(cx, cy).0;
            if !colors.contains(&c) {
                colors.push(c);
            }
        }
    }
    colors
}

fn color_distance(a: Rgb, b: Rgb) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn in_text(regions: &[Region], x: u32, y: u32) -> bool {
    regions.iter().any(|r| r.contains(x, y))
}

fn non_text_density(img: &RgbImage, regions: &[Region], known: &[Rgb], policy: &ClassifierPolicy) -> f64 {
    let (w, h) = img.dimensions();
    let step = policy.density_sample_step.max(1);
    let samples = (w as f64 * h as f64) / (step as f64 * step as f64);
    if samples <= 0.0 {
        return 0.0;
    }

    let mut unexplained = 0usize;
    for y in (0..h).step_by(step as usize) {
        for x in (0..w).step_by(step as usize) {
            if in_text(regions, x, y) {
                continue;
            }
            let c = img.get_pixel(x, y).0;
            if !known
                .iter()
                .any(|&k| color_distance(c, k) < policy.color_distance_threshold)
            {
                unexplained += 1;
            }
        }
    }
    unexplained as f64 / samples
}

fn edge_density(gray: &GrayImage, regions: &[Region], threshold: u8) -> f64 {
    if gray.width() < 3 || gray.height() < 3 {
        return 0.0;
    }
    let edges: GrayImage = imageops::filter3x3(gray, &FIND_EDGES);
    let mut outside = 0usize;
    let mut strong = 0usize;
    for (x, y, px) in edges.enumerate_pixels() {
        if in_text(regions, x, y) {
            continue;
        }
        outside += 1;
        if px.0[0] > threshold {
            strong += 1;
        }
    }
    if outside == 0 {
        0.0
    } else {
        strong as f64 / outside as f64
    }
}
