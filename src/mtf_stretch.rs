//! Midtone Transfer Function (MTF) display stretch.
//!
//! Only used for rendering overlays; photometry always runs on the raw data.

use crate::image_analysis::ImageStatistics;

const MAD_TO_SIGMA: f64 = 1.4826;

/// Configuration for MTF stretching
#[derive(Debug, Clone, Copy)]
pub struct StretchParameters {
    pub factor: f64,         // Target histogram median position
    pub black_clipping: f64, // Shadow clipping in MAD units
}

impl Default for StretchParameters {
    fn default() -> Self {
        Self {
            factor: 0.2,
            black_clipping: -2.8,
        }
    }
}

/// Stretch 16-bit display data so the sky median lands at `factor`.
pub fn stretch_image(data: &[u16], statistics: &ImageStatistics, params: StretchParameters) -> Vec<u16> {
    let stretch_map = get_stretch_map(statistics, params.factor, params.black_clipping);
    data.iter().map(|&pixel| stretch_map[pixel as usize]).collect()
}

fn get_stretch_map(
    statistics: &ImageStatistics,
    target_histogram_median_pct: f64,
    shadows_clipping: f64,
) -> Vec<u16> {
    let normalized_median = normalize_u16(statistics.median.clamp(0.0, 65535.0) as u16);
    let normalized_mad = calculate_mad(statistics) / 65535.0;

    let (shadows, midtones, highlights) = if normalized_median > 0.5 {
        // Image is inverted or overexposed
        let shadows = 0.0;
        let highlights = normalized_median - shadows_clipping * normalized_mad * MAD_TO_SIGMA;
        let midtones = midtones_transfer_function(
            target_histogram_median_pct,
            1.0 - (highlights - normalized_median),
        );
        (shadows, midtones, highlights)
    } else {
        let shadows = normalized_median + shadows_clipping * normalized_mad * MAD_TO_SIGMA;
        let midtones =
            midtones_transfer_function(target_histogram_median_pct, normalized_median - shadows);
        (shadows, midtones, 1.0)
    };

    tracing::debug!(
        "MTF stretch: median={:.4}, mad={:.4}, shadows={:.4}, midtones={:.4}, highlights={:.4}",
        normalized_median,
        normalized_mad,
        shadows,
        midtones,
        highlights
    );

    (0..=u16::MAX)
        .map(|i| {
            let input_value = (1.0 - highlights + normalize_u16(i) - shadows).clamp(0.0, 1.0);
            denormalize_u16(midtones_transfer_function(midtones, input_value))
        })
        .collect()
}

fn calculate_mad(statistics: &ImageStatistics) -> f64 {
    // MAD ≈ 0.6745 * σ for normal distribution
    statistics
        .mad
        .unwrap_or_else(|| statistics.std_dev * 0.6745)
}

fn normalize_u16(value: u16) -> f64 {
    value as f64 / 65535.0
}

fn denormalize_u16(value: f64) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn midtones_transfer_function(midtone_balance: f64, x: f64) -> f64 {
    if x > 0.0 {
        if x < 1.0 {
            return (midtone_balance - 1.0) * x
                / ((2.0 * midtone_balance - 1.0) * x - midtone_balance);
        }
        return 1.0;
    }
    0.0
}
