//! Point source detection on raw (unstretched) images.
//!
//! The sky is estimated with sigma-clipped statistics, pixels more than
//! `threshold_sigma` standard deviations above the sky median are grouped
//! into 8-connected blobs, and each accepted blob is reduced to an
//! intensity-weighted centroid.

use std::collections::VecDeque;

use crate::image_analysis::{BackgroundStats, FitsImage};

#[derive(Debug, Clone)]
pub struct SourceDetectionParams {
    /// Detection threshold in units of the sky standard deviation
    pub threshold_sigma: f64,
    /// Blobs with fewer pixels are treated as noise or hot pixels
    pub min_pixels: usize,
    /// Drop blobs that touch the image edge
    pub exclude_border: bool,
}

impl Default for SourceDetectionParams {
    fn default() -> Self {
        Self {
            threshold_sigma: 5.0,
            min_pixels: 5,
            exclude_border: true,
        }
    }
}

/// A detected source.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DetectedSource {
    /// 1-based, in order of discovery (raster scan)
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Brightest sky-subtracted pixel
    pub peak: f64,
    /// Sky-subtracted sum over the blob
    pub flux: f64,
    pub npix: usize,
}

#[derive(Debug, Clone)]
pub struct SourceDetectionResult {
    pub sources: Vec<DetectedSource>,
    pub background: BackgroundStats,
    pub threshold: f64,
}

impl SourceDetectionResult {
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.sources.iter().map(|s| (s.x, s.y)).collect()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.sources.iter().map(|s| s.id).collect()
    }
}

pub fn detect_sources(image: &FitsImage, params: &SourceDetectionParams) -> SourceDetectionResult {
    let background = image.background_stats();
    detect_sources_with_background(image, background, params)
}

/// Detect sources given already-computed sky statistics.
pub fn detect_sources_with_background(
    image: &FitsImage,
    background: BackgroundStats,
    params: &SourceDetectionParams,
) -> SourceDetectionResult {
    let threshold = params.threshold_sigma * background.std_dev;
    let width = image.width;
    let height = image.height;

    let mut sources = Vec::new();
    if width == 0 || height == 0 {
        return SourceDetectionResult {
            sources,
            background,
            threshold,
        };
    }

    let subtracted: Vec<f64> = image.data.iter().map(|&v| v - background.median).collect();
    // Strictly above threshold so a flat image yields nothing
    let mask: Vec<bool> = subtracted
        .iter()
        .map(|&v| v.is_finite() && v > threshold)
        .collect();

    let blobs = find_blobs(&mask, width, height);
    tracing::debug!(
        "Sky median {:.3}, std {:.3}, threshold {:.3}: {} candidate blobs",
        background.median,
        background.std_dev,
        threshold,
        blobs.len()
    );

    let mut rejected_small = 0;
    let mut rejected_border = 0;
    for blob in blobs {
        if blob.pixels.len() < params.min_pixels {
            rejected_small += 1;
            continue;
        }
        if params.exclude_border && blob.touches_border(width, height) {
            rejected_border += 1;
            continue;
        }

        let mut flux = 0.0;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut peak = f64::MIN;
        for &(px, py) in &blob.pixels {
            let value = subtracted[py * width + px];
            flux += value;
            sum_x += value * px as f64;
            sum_y += value * py as f64;
            peak = peak.max(value);
        }

        // Every blob pixel is above a non-negative threshold, so flux > 0
        sources.push(DetectedSource {
            id: sources.len() + 1,
            x: sum_x / flux,
            y: sum_y / flux,
            peak,
            flux,
            npix: blob.pixels.len(),
        });
    }

    tracing::debug!(
        "Accepted {} sources (rejected {} too small, {} on border)",
        sources.len(),
        rejected_small,
        rejected_border
    );

    SourceDetectionResult {
        sources,
        background,
        threshold,
    }
}

#[derive(Debug, Clone)]
struct Blob {
    pixels: Vec<(usize, usize)>,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

impl Blob {
    fn touches_border(&self, width: usize, height: usize) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 == width || self.max_y + 1 == height
    }
}

/// Find 8-connected components of the mask using breadth-first flood fill
fn find_blobs(mask: &[bool], width: usize, height: usize) -> Vec<Blob> {
    let mut visited = vec![false; mask.len()];
    let mut blobs = Vec::new();
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !mask[idx] || visited[idx] {
                continue;
            }

            let mut blob = Blob {
                pixels: Vec::new(),
                min_x: x,
                max_x: x,
                min_y: y,
                max_y: y,
            };
            visited[idx] = true;
            queue.push_back((x, y));

            while let Some((cx, cy)) = queue.pop_front() {
                blob.pixels.push((cx, cy));
                blob.min_x = blob.min_x.min(cx);
                blob.max_x = blob.max_x.max(cx);
                blob.min_y = blob.min_y.min(cy);
                blob.max_y = blob.max_y.max(cy);

                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i64 + dx;
                        let ny = cy as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let nidx = ny as usize * width + nx as usize;
                        if mask[nidx] && !visited[nidx] {
                            visited[nidx] = true;
                            queue.push_back((nx as usize, ny as usize));
                        }
                    }
                }
            }

            blobs.push(blob);
        }
    }

    blobs
}
