use thiserror::Error;

/// Errors raised by the photometry library.
///
/// Geometry, exposure and dimension errors are configuration problems and
/// are reported before any pixel is summed. `DomainError` is per source and
/// is stored on the affected row instead of aborting the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhotometryError {
    /// A radius is not positive, or the aperture/annulus ordering is broken.
    #[error("invalid aperture geometry: {0}")]
    InvalidGeometry(String),

    /// Exposure time must be a positive, finite number of seconds.
    #[error("invalid exposure time {0}, must be positive")]
    InvalidExposure(f64),

    /// Two inputs that must be correlated have different lengths.
    #[error("dimension mismatch: expected {expected} entries, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The magnitude formula needs a strictly positive count rate.
    #[error("magnitude undefined for non-positive count rate {count_rate}")]
    DomainError { count_rate: f64 },

    /// A required FITS header keyword is absent.
    #[error("missing FITS header keyword: {0}")]
    MissingHeader(String),

    /// A FITS header keyword is present but cannot be interpreted.
    #[error("FITS header {keyword} has invalid value '{value}'")]
    InvalidHeader { keyword: String, value: String },
}

pub type Result<T> = std::result::Result<T, PhotometryError>;
