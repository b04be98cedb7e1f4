use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fits::{format_fits_metadata, read_fits_metadata, FitsMetadata};

pub fn read_fits(path: &str, all: bool, format: &str) -> Result<()> {
    let path = Path::new(path);

    if path.is_file() {
        read_single_fits(path, all, format)
    } else if path.is_dir() {
        read_fits_directory(path, all, format)
    } else {
        Err(anyhow::anyhow!(
            "Path does not exist or is not accessible: {}",
            path.display()
        ))
    }
}

fn read_single_fits(path: &Path, all: bool, format: &str) -> Result<()> {
    let metadata = read_fits_metadata(path)?;

    match format.to_lowercase().as_str() {
        "json" => {
            let json_output = if all {
                serde_json::to_string_pretty(&metadata)?
            } else {
                serde_json::to_string_pretty(&PhotometricMetadata::from(&metadata))?
            };
            println!("{}", json_output);
        }
        _ => {
            println!("Reading FITS file: {}\n", path.display());
            println!("{}", format_fits_metadata(&metadata, all));
        }
    }

    Ok(())
}

fn read_fits_directory(dir: &Path, all: bool, format: &str) -> Result<()> {
    let mut fits_files = Vec::new();
    find_fits_files(dir, &mut fits_files)?;
    fits_files.sort();

    let mut successful_metadata = Vec::new();
    let mut error_count = 0;
    for file_path in &fits_files {
        match read_fits_metadata(file_path) {
            Ok(metadata) => successful_metadata.push(metadata),
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", file_path.display(), e);
                error_count += 1;
            }
        }
    }

    match format.to_lowercase().as_str() {
        "json" => {
            let json_output = if all {
                serde_json::to_string_pretty(&successful_metadata)?
            } else {
                let simplified: Vec<_> = successful_metadata
                    .iter()
                    .map(PhotometricMetadata::from)
                    .collect();
                serde_json::to_string_pretty(&simplified)?
            };
            println!("{}", json_output);
        }
        _ => {
            if fits_files.is_empty() {
                println!("No FITS files found in directory.");
                return Ok(());
            }

            println!("Scanning directory: {}\n", dir.display());
            println!("Found {} FITS files\n", fits_files.len());

            for (index, metadata) in successful_metadata.iter().enumerate() {
                println!("File {}/{}:", index + 1, successful_metadata.len());
                println!("{}", format_fits_metadata(metadata, all));
                if index + 1 < successful_metadata.len() {
                    println!("{:-<60}", "");
                }
            }

            println!("\nSummary:");
            println!("  Successfully read: {}", successful_metadata.len());
            if error_count > 0 {
                println!("  Errors: {}", error_count);
            }
        }
    }

    Ok(())
}

fn find_fits_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            find_fits_files(&path, files)?;
        } else if is_fits_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_fits_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "fits" | "fit" | "fts"))
        .unwrap_or(false)
}

/// The header values that matter for photometry.
#[derive(serde::Serialize)]
struct PhotometricMetadata {
    filename: String,
    width: Option<usize>,
    height: Option<usize>,
    bit_depth: Option<i32>,
    date_obs: Option<String>,
    object: Option<String>,
    exposure: Option<f64>,
    filter: Option<String>,
    gain: Option<String>,
    bzero: Option<String>,
    bscale: Option<String>,
}

impl From<&FitsMetadata> for PhotometricMetadata {
    fn from(metadata: &FitsMetadata) -> Self {
        let text = |key: &str| metadata.get(key).map(str::to_string);
        PhotometricMetadata {
            filename: metadata.filename.clone(),
            width: metadata.image_info.as_ref().map(|i| i.width),
            height: metadata.image_info.as_ref().map(|i| i.height),
            bit_depth: metadata.image_info.as_ref().map(|i| i.bit_depth),
            date_obs: text("DATE-OBS"),
            object: text("OBJECT").or_else(|| text("OBJNAME")),
            exposure: metadata.exposure_time().ok(),
            filter: text("FILTER"),
            gain: text("GAIN"),
            bzero: text("BZERO"),
            bscale: text("BSCALE"),
        }
    }
}
