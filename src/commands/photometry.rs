use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::ApertureOptions;
use crate::fits::{read_fits_metadata, FitsMetadata};
use crate::image_analysis::FitsImage;
use crate::photometry::{compute_photometry_with_ids, PhotometryConfig};
use crate::report::{render_photometry, OutputFormat};
use crate::source_detection::{detect_sources, SourceDetectionParams};

#[allow(clippy::too_many_arguments)]
pub fn photometry(
    fits_path: &str,
    aperture: &ApertureOptions,
    exposure: Option<f64>,
    zero_point: f64,
    threshold_sigma: f64,
    min_pixels: usize,
    format: &str,
    output: Option<String>,
) -> Result<()> {
    let format: OutputFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let path = Path::new(fits_path);

    let metadata = read_fits_metadata(path)?;
    let exposure_time = resolve_exposure(exposure, &metadata)?;
    let config = PhotometryConfig::new(aperture.to_geometry()?, exposure_time)
        .with_zero_point(zero_point)
        .with_method(aperture.to_method()?);
    // Fail on bad radii before spending time on detection
    config.validate()?;

    tracing::info!("Loading FITS file: {}", fits_path);
    let image = FitsImage::from_file(path)?;
    tracing::info!(
        "Image dimensions: {}x{}, exposure {}s",
        image.width,
        image.height,
        exposure_time
    );

    let params = SourceDetectionParams {
        threshold_sigma,
        min_pixels,
        ..Default::default()
    };
    let detection = detect_sources(&image, &params);
    tracing::info!("Detected {} sources", detection.sources.len());

    let geometry = config.geometry;
    tracing::info!(
        "Apertures: r={:.2}, annulus {:.2}-{:.2} ({} overlap)",
        geometry.r_aperture,
        geometry.r_in,
        geometry.r_out,
        config.method
    );
    let rows = compute_photometry_with_ids(
        &image,
        &detection.ids(),
        &detection.positions(),
        &config,
    )?;

    let undefined = rows.iter().filter(|r| r.magnitude.is_err()).count();
    if undefined > 0 {
        tracing::warn!(
            "{} of {} sources have no magnitude (non-positive signal)",
            undefined,
            rows.len()
        );
    }

    let rendered = render_photometry(&rows, format)?;
    match output {
        Some(output_path) => {
            std::fs::write(&output_path, rendered)
                .with_context(|| format!("Failed to write photometry to {}", output_path))?;
            println!("Wrote {} rows to {}", rows.len(), output_path);
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

/// Exposure from the command line, otherwise from the FITS header.
fn resolve_exposure(exposure: Option<f64>, metadata: &FitsMetadata) -> Result<f64> {
    match exposure {
        Some(seconds) => Ok(seconds),
        None => metadata.exposure_time().with_context(|| {
            format!(
                "No exposure time for {}; pass --exposure",
                metadata.filename
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn metadata(header: &[(&str, &str)]) -> FitsMetadata {
        FitsMetadata {
            filename: "light.fits".to_string(),
            primary_header: header
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            image_info: None,
        }
    }

    #[test]
    fn test_command_line_exposure_wins() {
        let meta = metadata(&[("EXPTIME", "30")]);
        assert_eq!(resolve_exposure(Some(5.0), &meta).unwrap(), 5.0);
        assert_eq!(resolve_exposure(None, &meta).unwrap(), 30.0);
    }

    #[test]
    fn test_missing_exposure_is_reported() {
        let err = resolve_exposure(None, &metadata(&[])).unwrap_err();
        assert!(format!("{:#}", err).contains("EXPTIME"));
    }
}
