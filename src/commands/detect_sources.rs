use anyhow::Result;
use std::path::Path;

use crate::image_analysis::FitsImage;
use crate::report::{render_sources, OutputFormat};
use crate::source_detection::{detect_sources, SourceDetectionParams};

pub fn detect(
    fits_path: &str,
    threshold_sigma: f64,
    min_pixels: usize,
    keep_border: bool,
    format: &str,
) -> Result<()> {
    let format: OutputFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    tracing::info!("Loading FITS file: {}", fits_path);
    let image = FitsImage::from_file(Path::new(fits_path))?;
    tracing::info!("Image dimensions: {}x{}", image.width, image.height);

    let params = SourceDetectionParams {
        threshold_sigma,
        min_pixels,
        exclude_border: !keep_border,
    };
    let result = detect_sources(&image, &params);

    tracing::info!(
        "Sky median {:.2}, std dev {:.2} ({} pixels kept after clipping)",
        result.background.median,
        result.background.std_dev,
        result.background.retained
    );
    tracing::info!(
        "Detected {} sources above {:.2} ADU",
        result.sources.len(),
        result.threshold
    );

    print!("{}", render_sources(&result.sources, format)?);
    Ok(())
}
