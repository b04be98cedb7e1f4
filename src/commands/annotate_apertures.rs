use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageBuffer, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::aperture::ApertureGeometry;
use crate::cli::ApertureOptions;
use crate::image_analysis::FitsImage;
use crate::mtf_stretch::{stretch_image, StretchParameters};
use crate::source_detection::{detect_sources, SourceDetectionParams};

const APERTURE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ANNULUS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Render the stretched image with the photometry regions of every source
pub fn annotate_apertures(
    fits_path: &str,
    aperture: &ApertureOptions,
    output: Option<String>,
    threshold_sigma: f64,
    midtone_factor: f64,
    shadow_clipping: f64,
) -> Result<()> {
    let geometry = aperture.to_geometry()?;
    geometry.validate()?;

    tracing::info!("Loading FITS file: {}", fits_path);
    let fits = FitsImage::from_file(Path::new(fits_path))?;
    let width = fits.width;
    let height = fits.height;
    tracing::info!("Image dimensions: {}x{}", width, height);

    let params = SourceDetectionParams {
        threshold_sigma,
        ..Default::default()
    };
    let detection = detect_sources(&fits, &params);
    tracing::info!("Detected {} sources", detection.sources.len());

    let display = fits.to_display_u16();
    let stats = fits.calculate_statistics();
    tracing::debug!(
        "Image stats - Min: {}, Max: {}, Mean: {:.2}, Median: {:.2}",
        stats.min,
        stats.max,
        stats.mean,
        stats.median
    );
    let stretched = stretch_image(
        &display,
        &stats,
        StretchParameters {
            factor: midtone_factor,
            black_clipping: shadow_clipping,
        },
    );

    let mut rgb_image = grayscale_to_rgb(&stretched, width, height);
    draw_regions(&mut rgb_image, &detection.positions(), &geometry);

    let output_path = output.unwrap_or_else(|| {
        let base = fits_path.trim_end_matches(".fits").trim_end_matches(".fit");
        format!("{}_apertures.png", base)
    });

    let file = File::create(&output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path))?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
    encoder
        .write_image(
            &rgb_image,
            width as u32,
            height as u32,
            ColorType::Rgb8.into(),
        )
        .with_context(|| format!("Failed to write PNG image to {}", output_path))?;

    println!("Created annotated image: {}", output_path);
    println!("Annotated {} sources", detection.sources.len());
    Ok(())
}

fn grayscale_to_rgb(stretched: &[u16], width: usize, height: usize) -> RgbImage {
    let mut rgb_image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(width as u32, height as u32);
    for (x, y, pixel) in rgb_image.enumerate_pixels_mut() {
        let value = (stretched[y as usize * width + x as usize] >> 8) as u8;
        *pixel = Rgb([value, value, value]);
    }
    rgb_image
}

/// Aperture in red, both annulus edges in green
fn draw_regions(image: &mut RgbImage, positions: &[(f64, f64)], geometry: &ApertureGeometry) {
    for &(x, y) in positions {
        let center = (x.round() as i32, y.round() as i32);
        draw_hollow_circle_mut(
            image,
            center,
            geometry.r_aperture.round() as i32,
            APERTURE_COLOR,
        );
        draw_hollow_circle_mut(image, center, geometry.r_in.round() as i32, ANNULUS_COLOR);
        draw_hollow_circle_mut(image, center, geometry.r_out.round() as i32, ANNULUS_COLOR);
    }
}
