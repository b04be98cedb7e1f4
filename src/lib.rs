pub mod aperture;
pub mod cli;
pub mod commands;
pub mod error;
pub mod fits;
pub mod image_analysis;
pub mod mtf_stretch;
pub mod photometry;
pub mod report;
pub mod source_detection;

#[cfg(test)]
mod test_photometry;

// Re-export commonly used items
pub use aperture::{ApertureGeometry, OverlapMethod};
pub use error::PhotometryError;
pub use image_analysis::{FitsImage, ImageStatistics};
pub use photometry::{compute_photometry, PhotometryConfig, PhotometryRow};
