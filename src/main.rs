use clap::Parser;
use tracing_subscriber::EnvFilter;

use starphot::cli::{Cli, Commands};
use starphot::commands::{annotate_apertures, detect, photometry, read_fits};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::ReadFits { path, all, format } => {
            read_fits(&path, all, &format)?;
        }
        Commands::Detect {
            fits,
            threshold_sigma,
            min_pixels,
            keep_border,
            format,
        } => {
            detect(&fits, threshold_sigma, min_pixels, keep_border, &format)?;
        }
        Commands::Photometry {
            fits,
            aperture,
            exposure,
            zero_point,
            threshold_sigma,
            min_pixels,
            format,
            output,
        } => {
            photometry(
                &fits,
                &aperture,
                exposure,
                zero_point,
                threshold_sigma,
                min_pixels,
                &format,
                output,
            )?;
        }
        Commands::Annotate {
            fits,
            aperture,
            output,
            threshold_sigma,
            midtone_factor,
            shadow_clipping,
        } => {
            annotate_apertures(
                &fits,
                &aperture,
                output,
                threshold_sigma,
                midtone_factor,
                shadow_clipping,
            )?;
        }
    }

    Ok(())
}
