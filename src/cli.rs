use clap::{Args, Parser, Subcommand};

use crate::aperture::{ApertureGeometry, OverlapMethod};

#[derive(Parser)]
#[command(name = "starphot")]
#[command(about = "Circular aperture photometry on FITS images", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read and display FITS header metadata
    ReadFits {
        /// FITS file or directory to scan
        path: String,

        /// Show all header keywords
        #[arg(short = 'a', long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Detect point sources and list their centroids
    Detect {
        /// FITS file to analyze
        fits: String,

        /// Detection threshold in sky standard deviations
        #[arg(long, default_value = "5.0")]
        threshold_sigma: f64,

        /// Minimum number of connected pixels per source
        #[arg(long, default_value = "5")]
        min_pixels: usize,

        /// Keep sources touching the image edge
        #[arg(long)]
        keep_border: bool,

        /// Output format (table, csv, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Detect sources and measure background-subtracted magnitudes
    Photometry {
        /// FITS file to measure
        fits: String,

        #[command(flatten)]
        aperture: ApertureOptions,

        /// Exposure time in seconds (defaults to the EXPTIME header)
        #[arg(short, long)]
        exposure: Option<f64>,

        /// Magnitude zero point
        #[arg(short, long, default_value = "25.0")]
        zero_point: f64,

        /// Detection threshold in sky standard deviations
        #[arg(long, default_value = "5.0")]
        threshold_sigma: f64,

        /// Minimum number of connected pixels per source
        #[arg(long, default_value = "5")]
        min_pixels: usize,

        /// Output format (table, csv, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Write the result to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Render a stretched PNG with apertures and annuli drawn on detected sources
    Annotate {
        /// FITS file to annotate
        fits: String,

        #[command(flatten)]
        aperture: ApertureOptions,

        /// Output PNG file (defaults to <input>_apertures.png)
        #[arg(short, long)]
        output: Option<String>,

        /// Detection threshold in sky standard deviations
        #[arg(long, default_value = "5.0")]
        threshold_sigma: f64,

        /// MTF midtone balance factor (0.0-1.0, lower = more stretch)
        #[arg(long, default_value = "0.2")]
        midtone_factor: f64,

        /// Shadow clipping in MAD units
        #[arg(long, default_value = "-2.8", allow_hyphen_values = true)]
        shadow_clipping: f64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ApertureOptions {
    /// Seeing in pixels; sets aperture 3x seeing, annulus 3 to 17 px beyond it
    #[arg(long, conflicts_with_all = ["r_aperture", "r_in", "r_out"])]
    pub seeing: Option<f64>,

    /// Aperture radius in pixels
    #[arg(long, requires_all = ["r_in", "r_out"])]
    pub r_aperture: Option<f64>,

    /// Inner annulus radius in pixels
    #[arg(long, requires_all = ["r_aperture", "r_out"])]
    pub r_in: Option<f64>,

    /// Outer annulus radius in pixels
    #[arg(long, requires_all = ["r_aperture", "r_in"])]
    pub r_out: Option<f64>,

    /// Pixel overlap method (exact, center, subpixel)
    #[arg(long, default_value = "exact")]
    pub method: String,

    /// Subdivisions per pixel axis for the subpixel method
    #[arg(long, default_value = "5")]
    pub subpixels: u32,
}

impl ApertureOptions {
    /// Radii from the command line; validation happens in the library.
    pub fn to_geometry(&self) -> anyhow::Result<ApertureGeometry> {
        match (self.seeing, self.r_aperture, self.r_in, self.r_out) {
            (Some(seeing), _, _, _) => Ok(ApertureGeometry::from_seeing(seeing)),
            (None, Some(r_aperture), Some(r_in), Some(r_out)) => {
                Ok(ApertureGeometry::new(r_aperture, r_in, r_out))
            }
            _ => Err(anyhow::anyhow!(
                "Specify either --seeing or all of --r-aperture, --r-in and --r-out"
            )),
        }
    }

    pub fn to_method(&self) -> anyhow::Result<OverlapMethod> {
        let method: OverlapMethod = self.method.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        Ok(match method {
            OverlapMethod::Subpixel(_) => OverlapMethod::Subpixel(self.subpixels),
            other => other,
        })
    }
}
