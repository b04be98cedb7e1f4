use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::PhotometryError;

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;
// Don't read more than 36 blocks of header (~100 KB)
const MAX_HEADER_BLOCKS: usize = 36;

/// Header keywords that may carry the exposure time, in lookup order
pub const EXPOSURE_KEYWORDS: [&str; 2] = ["EXPTIME", "EXPOSURE"];

/// Metadata extracted from a FITS file
#[derive(Debug, serde::Serialize)]
pub struct FitsMetadata {
    pub filename: String,
    pub primary_header: HashMap<String, String>,
    pub image_info: Option<ImageInfo>,
}

#[derive(Debug, serde::Serialize)]
pub struct ImageInfo {
    pub width: usize,
    pub height: usize,
    pub bit_depth: i32,
    pub dimensions: Vec<usize>,
}

impl FitsMetadata {
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.primary_header.get(keyword).map(String::as_str)
    }

    /// Numeric value of a header keyword.
    pub fn get_f64(&self, keyword: &str) -> Result<f64, PhotometryError> {
        let value = self
            .get(keyword)
            .ok_or_else(|| PhotometryError::MissingHeader(keyword.to_string()))?;
        value
            .parse::<f64>()
            .map_err(|_| PhotometryError::InvalidHeader {
                keyword: keyword.to_string(),
                value: value.to_string(),
            })
    }

    /// Exposure time in seconds from `EXPTIME`, falling back to `EXPOSURE`.
    pub fn exposure_time(&self) -> Result<f64, PhotometryError> {
        let keyword = EXPOSURE_KEYWORDS
            .iter()
            .find(|k| self.primary_header.contains_key(**k))
            .ok_or_else(|| PhotometryError::MissingHeader(EXPOSURE_KEYWORDS[0].to_string()))?;
        self.get_f64(keyword)
    }
}

/// Read metadata from a FITS file using basic FITS format parsing
pub fn read_fits_metadata(path: &Path) -> Result<FitsMetadata> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

    // Read header blocks until we find END
    let mut header_data = Vec::new();
    for _ in 0..MAX_HEADER_BLOCKS {
        let mut block = vec![0u8; BLOCK_SIZE];
        if file.read_exact(&mut block).is_err() {
            break;
        }
        let has_end = block
            .chunks(CARD_SIZE)
            .any(|card| card.starts_with(b"END") && card[3..].iter().all(|&b| b == b' '));
        header_data.extend_from_slice(&block);
        if has_end {
            break;
        }
    }

    if header_data.is_empty() {
        return Err(anyhow::anyhow!(
            "{} is too short to hold a FITS header",
            path.display()
        ));
    }

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(metadata_from_header(filename, &header_data))
}

fn metadata_from_header(filename: String, header_data: &[u8]) -> FitsMetadata {
    let primary_header = parse_fits_header(header_data);

    // Extract image info from primary header
    let mut image_info = None;
    if let Some(naxis) = primary_header
        .get("NAXIS")
        .and_then(|s| s.parse::<usize>().ok())
    {
        let dimensions: Vec<usize> = (1..=naxis)
            .filter_map(|i| {
                primary_header
                    .get(&format!("NAXIS{}", i))
                    .and_then(|s| s.parse::<usize>().ok())
            })
            .collect();

        if dimensions.len() >= 2 {
            let bit_depth = primary_header
                .get("BITPIX")
                .and_then(|s| s.parse::<i32>().ok())
                .unwrap_or(0);

            image_info = Some(ImageInfo {
                width: dimensions[0],
                height: dimensions[1],
                bit_depth,
                dimensions,
            });
        }
    }

    FitsMetadata {
        filename,
        primary_header,
        image_info,
    }
}

/// Parse FITS header cards (80 characters each) into keyword/value pairs
fn parse_fits_header(data: &[u8]) -> HashMap<String, String> {
    let mut keywords = HashMap::new();

    for chunk in data.chunks(CARD_SIZE) {
        let Ok(card) = std::str::from_utf8(chunk) else {
            continue;
        };
        let card = card.trim_end();

        if card == "END" {
            break;
        }

        // Skip empty cards, COMMENT, and HISTORY
        if card.is_empty() || card.starts_with("COMMENT") || card.starts_with("HISTORY") {
            continue;
        }

        // Value indicator lives in columns 9-10
        let (Some(name), Some("= "), Some(value_part)) =
            (card.get(..8), card.get(8..10), card.get(10..))
        else {
            continue;
        };
        let keyword = name.trim();
        let value = parse_card_value(value_part);

        if !keyword.is_empty() {
            keywords.insert(keyword.to_string(), value);
        }
    }

    keywords
}

/// Value part of a card: quoted strings may contain '/', anything else ends
/// at the comment separator.
fn parse_card_value(value_part: &str) -> String {
    let trimmed = value_part.trim_start();
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // '' inside a string is an escaped quote
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return value.trim_end().to_string();
    }

    let value = match trimmed.find('/') {
        Some(comment_pos) => &trimmed[..comment_pos],
        None => trimmed,
    };
    value.trim().to_string()
}

/// Format FITS metadata for display
pub fn format_fits_metadata(metadata: &FitsMetadata, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("FITS File: {}\n", metadata.filename));

    if let Some(ref img_info) = metadata.image_info {
        output.push_str("\nImage Information:\n");
        output.push_str(&format!(
            "  Dimensions: {} x {}\n",
            img_info.width, img_info.height
        ));
        output.push_str(&format!("  Bit Depth: {}\n", img_info.bit_depth));
        if img_info.dimensions.len() > 2 {
            output.push_str(&format!("  Full Shape: {:?}\n", img_info.dimensions));
        }
    }

    output.push_str("\nKey Metadata:\n");

    let lookups: [(&str, &[&str]); 7] = [
        ("Date", &["DATE-OBS"]),
        ("Object", &["OBJECT", "OBJNAME"]),
        ("Exposure", &EXPOSURE_KEYWORDS),
        ("Filter", &["FILTER"]),
        ("Telescope", &["TELESCOP"]),
        ("Instrument", &["INSTRUME"]),
        ("Gain", &["GAIN"]),
    ];
    for (label, keys) in lookups {
        if let Some(value) = keys.iter().find_map(|k| metadata.get(k)) {
            output.push_str(&format!("  {}: {}\n", label, value));
        }
    }

    if verbose {
        output.push_str("\nAll Keywords:\n");
        let mut sorted_keys: Vec<_> = metadata.primary_header.iter().collect();
        sorted_keys.sort_by_key(|&(k, _)| k);

        for (key, value) in sorted_keys {
            output.push_str(&format!("  {:<16} = {}\n", key, value));
        }
    }

    output
}
