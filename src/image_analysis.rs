use anyhow::{Context, Result};
use bumpalo::Bump;
use fitrs::{Fits, FitsData, FitsDataArray};
use std::path::Path;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageStatistics {
    pub width: usize,
    pub height: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub mad: Option<f64>,
}

/// Sigma-clipped background statistics of an image.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BackgroundStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    /// Samples left after clipping
    pub retained: usize,
}

/// FITS image data structure.
///
/// Samples are stored row-major as `f64`, `data[row * width + col]`, with
/// row = y and column = x. Pixel centres sit on integer coordinates.
#[derive(Debug, Clone)]
pub struct FitsImage {
    pub width: usize,
    pub height: usize,
    pub bit_depth: i32,
    pub data: Vec<f64>,
}

fn header_int(hdu: &fitrs::Hdu, key: &str) -> Result<i64> {
    match hdu.value(key) {
        Some(fitrs::HeaderValue::IntegerNumber(n)) => Ok(*n as i64),
        Some(_) => Err(anyhow::anyhow!("{} is not an integer", key)),
        None => Err(anyhow::anyhow!("Missing {} header", key)),
    }
}

fn header_real(hdu: &fitrs::Hdu, key: &str, default: f64) -> f64 {
    match hdu.value(key) {
        Some(fitrs::HeaderValue::IntegerNumber(n)) => *n as f64,
        Some(fitrs::HeaderValue::RealFloatingNumber(f)) => *f,
        _ => default,
    }
}

impl FitsImage {
    /// Build an image from row-major samples.
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != width * height {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                width * height,
                data.len()
            ));
        }
        Ok(FitsImage {
            width,
            height,
            bit_depth: -64,
            data,
        })
    }

    /// Load the primary HDU of a FITS file using fitrs.
    ///
    /// Integer and floating point data are converted to physical values
    /// with BZERO/BSCALE. Unsigned data reported by fitrs already carries
    /// the offset and is used as is.
    pub fn from_file(path: &Path) -> Result<Self> {
        let fits = Fits::open(path)
            .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

        let hdu = fits
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("No primary HDU found in FITS file"))?;

        let naxis = header_int(&hdu, "NAXIS")?;
        if naxis < 2 {
            return Err(anyhow::anyhow!(
                "FITS file does not contain 2D image data (NAXIS={})",
                naxis
            ));
        }
        let width = header_int(&hdu, "NAXIS1")? as usize;
        let height = header_int(&hdu, "NAXIS2")? as usize;
        let bit_depth = header_int(&hdu, "BITPIX")? as i32;
        let bzero = header_real(&hdu, "BZERO", 0.0);
        let bscale = header_real(&hdu, "BSCALE", 1.0);

        let data: Vec<f64> = match hdu.read_data() {
            FitsData::Characters(_) => {
                return Err(anyhow::anyhow!(
                    "FITS file contains character data, not image data"
                ));
            }
            FitsData::IntegersI32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.map_or(f64::NAN, |raw| raw as f64 * bscale + bzero))
                .collect(),
            FitsData::IntegersU32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x.map_or(f64::NAN, |raw| raw as f64))
                .collect(),
            FitsData::FloatingPoint32(FitsDataArray { data, .. }) => data
                .into_iter()
                .map(|x| x as f64 * bscale + bzero)
                .collect(),
            FitsData::FloatingPoint64(FitsDataArray { data, .. }) => {
                data.into_iter().map(|x| x * bscale + bzero).collect()
            }
        };

        // Cubes keep only their first plane
        let plane = width * height;
        if data.len() < plane {
            return Err(anyhow::anyhow!(
                "Data size mismatch: expected {} pixels, got {}",
                plane,
                data.len()
            ));
        }
        let mut data = data;
        data.truncate(plane);

        tracing::debug!(
            "Loaded {} ({}x{}, BITPIX={}, BZERO={}, BSCALE={})",
            path.display(),
            width,
            height,
            bit_depth,
            bzero,
            bscale
        );

        Ok(FitsImage {
            width,
            height,
            bit_depth,
            data,
        })
    }

    /// Sample at (row, column), `None` outside the image.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.height && col < self.width {
            Some(self.data[row * self.width + col])
        } else {
            None
        }
    }

    /// Mean, median and standard deviation after 3-sigma clipping.
    pub fn background_stats(&self) -> BackgroundStats {
        sigma_clipped_stats(&self.data, 3.0, 5)
    }

    /// Calculate statistics including MAD
    pub fn calculate_statistics(&self) -> ImageStatistics {
        ImageStatistics::from_samples(&self.data, self.width, self.height)
    }

    /// Clamp samples into the 16-bit range for display stretching.
    pub fn to_display_u16(&self) -> Vec<u16> {
        self.data
            .iter()
            .map(|&x| {
                if x.is_finite() {
                    x.round().clamp(0.0, 65535.0) as u16
                } else {
                    0
                }
            })
            .collect()
    }
}

impl ImageStatistics {
    pub fn from_samples(samples: &[f64], width: usize, height: usize) -> Self {
        // Use arena for temporary allocation
        let arena = Bump::new();
        let mut sorted_data = bumpalo::vec![in &arena];
        sorted_data.extend(samples.iter().copied().filter(|x| x.is_finite()));
        sorted_data.sort_by(|a, b| a.total_cmp(b));

        if sorted_data.is_empty() {
            return ImageStatistics {
                width,
                height,
                mean: 0.0,
                median: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                mad: None,
            };
        }

        let n = sorted_data.len();
        let mean = sorted_data.iter().sum::<f64>() / n as f64;
        let median = median_of_sorted(&sorted_data);
        let variance = if n > 1 {
            sorted_data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };

        let mut deviations = bumpalo::vec![in &arena];
        deviations.extend(sorted_data.iter().map(|&x| (x - median).abs()));
        deviations.sort_by(|a, b| a.total_cmp(b));
        let mad = median_of_sorted(&deviations);

        ImageStatistics {
            width,
            height,
            mean,
            median,
            std_dev: variance.sqrt(),
            min: sorted_data[0],
            max: sorted_data[n - 1],
            mad: Some(mad),
        }
    }

    pub fn from_u16(samples: &[u16], width: usize, height: usize) -> Self {
        let values: Vec<f64> = samples.iter().map(|&x| x as f64).collect();
        Self::from_samples(&values, width, height)
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Sigma-clipped mean, median and standard deviation.
///
/// Each pass rejects samples further than `sigma` standard deviations from
/// the median; iteration stops after `max_iters` passes or once a pass
/// rejects nothing. Non-finite samples are ignored.
pub fn sigma_clipped_stats(values: &[f64], sigma: f64, max_iters: usize) -> BackgroundStats {
    let arena = Bump::new();
    let mut working = bumpalo::vec![in &arena];
    working.extend(values.iter().copied().filter(|x| x.is_finite()));

    if working.is_empty() {
        return BackgroundStats {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            retained: 0,
        };
    }

    working.sort_by(|a, b| a.total_cmp(b));
    for _ in 0..max_iters {
        let median = median_of_sorted(&working);
        let std_dev = population_std(&working);
        let before = working.len();
        working.retain(|x| (*x - median).abs() <= sigma * std_dev);
        if working.len() == before || working.is_empty() {
            break;
        }
    }

    if working.is_empty() {
        return BackgroundStats {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            retained: 0,
        };
    }

    let mean = working.iter().sum::<f64>() / working.len() as f64;
    BackgroundStats {
        mean,
        median: median_of_sorted(&working),
        std_dev: population_std(&working),
        retained: working.len(),
    }
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}
