//! Aperture photometry with local background subtraction.
//!
//! For each source the signal inside a circular aperture is summed, the sky
//! level per unit area is estimated from a surrounding annulus, and the sky
//! contribution scaled to the aperture area is removed. The result is turned
//! into a count rate and an instrumental magnitude.

use crate::aperture::{ApertureGeometry, OverlapMethod, Region, RegionSummer};
use crate::error::{PhotometryError, Result};
use crate::image_analysis::FitsImage;

pub const DEFAULT_ZERO_POINT: f64 = 25.0;

/// Parameters of a photometry run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotometryConfig {
    pub geometry: ApertureGeometry,
    /// Seconds; count rates are signal per second
    pub exposure_time: f64,
    pub zero_point: f64,
    pub method: OverlapMethod,
}

impl PhotometryConfig {
    pub fn new(geometry: ApertureGeometry, exposure_time: f64) -> Self {
        Self {
            geometry,
            exposure_time,
            zero_point: DEFAULT_ZERO_POINT,
            method: OverlapMethod::Exact,
        }
    }

    pub fn with_zero_point(mut self, zero_point: f64) -> Self {
        self.zero_point = zero_point;
        self
    }

    pub fn with_method(mut self, method: OverlapMethod) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        self.method.validate()?;
        if !self.exposure_time.is_finite() || self.exposure_time <= 0.0 {
            return Err(PhotometryError::InvalidExposure(self.exposure_time));
        }
        Ok(())
    }
}

/// Photometry of one source.
///
/// `annulus_sum`, `annulus_area`, `annulus_coverage` and `annulus_neighbors`
/// are kept so a biased background (a neighbour inside the annulus, or an
/// annulus running off the image) can be spotted in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotometryRow {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub aperture_sum: f64,
    pub annulus_sum: f64,
    pub aperture_area: f64,
    pub annulus_area: f64,
    pub mean_bkg: f64,
    pub source_signal: f64,
    pub count_rate: f64,
    pub magnitude: Result<f64>,
    /// Fraction of the annulus area that lies on the image
    pub annulus_coverage: f64,
    /// Other sources whose aperture reaches into this annulus
    pub annulus_neighbors: usize,
}

impl PhotometryRow {
    /// Derive every column from the raw region sums.
    #[allow(clippy::too_many_arguments)]
    pub fn from_sums(
        id: usize,
        position: (f64, f64),
        aperture_sum: f64,
        annulus_sum: f64,
        aperture_area: f64,
        annulus_area: f64,
        exposure_time: f64,
        zero_point: f64,
    ) -> Self {
        let mean_bkg = annulus_sum / annulus_area;
        let source_signal = aperture_sum - mean_bkg * aperture_area;
        let count_rate = source_signal / exposure_time;

        PhotometryRow {
            id,
            x: position.0,
            y: position.1,
            aperture_sum,
            annulus_sum,
            aperture_area,
            annulus_area,
            mean_bkg,
            source_signal,
            count_rate,
            magnitude: instrumental_magnitude(count_rate, zero_point),
            annulus_coverage: 1.0,
            annulus_neighbors: 0,
        }
    }

    /// True when the background estimate may be biased.
    pub fn background_suspect(&self) -> bool {
        self.annulus_neighbors > 0 || self.annulus_coverage < 0.999
    }
}

/// `-2.5 log10(count_rate) + zero_point`, defined only for positive rates.
pub fn instrumental_magnitude(count_rate: f64, zero_point: f64) -> Result<f64> {
    if !count_rate.is_finite() || count_rate <= 0.0 {
        return Err(PhotometryError::DomainError { count_rate });
    }
    Ok(-2.5 * count_rate.log10() + zero_point)
}

/// Photometry for every position, ids numbered from 1 in input order.
pub fn compute_photometry(
    image: &FitsImage,
    positions: &[(f64, f64)],
    config: &PhotometryConfig,
) -> Result<Vec<PhotometryRow>> {
    let ids: Vec<usize> = (1..=positions.len()).collect();
    compute_photometry_with(&config.method, image, &ids, positions, config)
}

/// Photometry for positions taken from an existing detection table.
pub fn compute_photometry_with_ids(
    image: &FitsImage,
    ids: &[usize],
    positions: &[(f64, f64)],
    config: &PhotometryConfig,
) -> Result<Vec<PhotometryRow>> {
    compute_photometry_with(&config.method, image, ids, positions, config)
}

/// Photometry with an explicit summation strategy.
///
/// All configuration is validated before the summer is first called. Row
/// `i` always belongs to `positions[i]`.
pub fn compute_photometry_with(
    summer: &dyn RegionSummer,
    image: &FitsImage,
    ids: &[usize],
    positions: &[(f64, f64)],
    config: &PhotometryConfig,
) -> Result<Vec<PhotometryRow>> {
    config.validate()?;
    if ids.len() != positions.len() {
        return Err(PhotometryError::DimensionMismatch {
            expected: positions.len(),
            actual: ids.len(),
        });
    }

    let geometry = &config.geometry;
    let aperture_area = geometry.aperture_area();
    let annulus_area = geometry.annulus_area();
    // An aperture closer than this to a source's centre overlaps its annulus
    let contamination_distance = geometry.r_out + geometry.r_aperture;

    let mut rows = Vec::with_capacity(positions.len());
    for (index, (&id, &(x, y))) in ids.iter().zip(positions.iter()).enumerate() {
        let aperture = summer.sum(image, &Region::Circle(geometry.aperture_at(x, y)));
        let annulus = summer.sum(image, &Region::Annulus(geometry.annulus_at(x, y)));

        let mut row = PhotometryRow::from_sums(
            id,
            (x, y),
            aperture.sum,
            annulus.sum,
            aperture_area,
            annulus_area,
            config.exposure_time,
            config.zero_point,
        );
        row.annulus_coverage = annulus.covered_area / annulus_area;
        row.annulus_neighbors = positions
            .iter()
            .enumerate()
            .filter(|&(other, &(ox, oy))| {
                other != index && (ox - x).hypot(oy - y) < contamination_distance
            })
            .count();

        if row.background_suspect() {
            tracing::debug!(
                "Source {} at ({:.2}, {:.2}): annulus coverage {:.3}, {} neighbour(s) in annulus",
                id,
                x,
                y,
                row.annulus_coverage,
                row.annulus_neighbors
            );
        }
        if let Err(e) = &row.magnitude {
            tracing::debug!("Source {}: {}", id, e);
        }

        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aperture::RegionSum;
    use std::cell::Cell;
    use std::f64::consts::PI;

    /// Summer returning fixed sums and counting its calls.
    struct FixedSummer {
        aperture_sum: f64,
        annulus_sum: f64,
        calls: Cell<usize>,
    }

    impl FixedSummer {
        fn new(aperture_sum: f64, annulus_sum: f64) -> Self {
            Self {
                aperture_sum,
                annulus_sum,
                calls: Cell::new(0),
            }
        }
    }

    impl RegionSummer for FixedSummer {
        fn sum(&self, _image: &FitsImage, region: &Region) -> RegionSum {
            self.calls.set(self.calls.get() + 1);
            let sum = match region {
                Region::Circle(_) => self.aperture_sum,
                Region::Annulus(_) => self.annulus_sum,
            };
            RegionSum {
                sum,
                covered_area: region.area(),
            }
        }
    }

    /// Radii giving an aperture area of 10 and an annulus area of 40.
    fn area_10_40() -> ApertureGeometry {
        let r_aperture = (10.0 / PI).sqrt();
        let r_in = r_aperture + 1.0;
        let r_out = (r_in * r_in + 40.0 / PI).sqrt();
        ApertureGeometry::new(r_aperture, r_in, r_out)
    }

    fn blank(width: usize, height: usize) -> FitsImage {
        FitsImage::new(width, height, vec![0.0; width * height]).unwrap()
    }

    #[test]
    fn test_magnitude_formula() {
        assert!((instrumental_magnitude(1.0, 25.0).unwrap() - 25.0).abs() < 1e-12);
        assert!((instrumental_magnitude(100.0, 25.0).unwrap() - 20.0).abs() < 1e-12);
        assert!((instrumental_magnitude(100.0, 0.0).unwrap() + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_decreases_with_count_rate() {
        let mut previous = f64::INFINITY;
        for rate in [0.01, 0.5, 1.0, 3.0, 450.0, 1e6] {
            let mag = instrumental_magnitude(rate, DEFAULT_ZERO_POINT).unwrap();
            assert!(mag < previous);
            previous = mag;
        }
    }

    #[test]
    fn test_magnitude_domain_error() {
        assert_eq!(
            instrumental_magnitude(0.0, 25.0),
            Err(PhotometryError::DomainError { count_rate: 0.0 })
        );
        assert_eq!(
            instrumental_magnitude(-25.0, 25.0),
            Err(PhotometryError::DomainError { count_rate: -25.0 })
        );
        assert!(instrumental_magnitude(f64::NAN, 25.0).is_err());
    }

    #[test]
    fn test_zero_background_scenario() {
        let row = PhotometryRow::from_sums(1, (0.0, 0.0), 640.0, 0.0, 10.0, 40.0, 4.0, 25.0);
        assert_eq!(row.mean_bkg, 0.0);
        assert_eq!(row.source_signal, 640.0);
        assert_eq!(row.count_rate, 160.0);
    }

    #[test]
    fn test_background_subtraction_scenario() {
        let row = PhotometryRow::from_sums(1, (5.0, 6.0), 1000.0, 400.0, 10.0, 40.0, 2.0, 25.0);
        assert_eq!(row.mean_bkg, 10.0);
        assert_eq!(row.source_signal, 900.0);
        assert_eq!(row.count_rate, 450.0);
        let mag = row.magnitude.unwrap();
        assert!((mag - (25.0 - 2.5 * 450.0_f64.log10())).abs() < 1e-12);
        assert!((mag - 18.367).abs() < 0.001);
    }

    #[test]
    fn test_negative_signal_scenario() {
        let row = PhotometryRow::from_sums(3, (0.0, 0.0), 50.0, 400.0, 10.0, 40.0, 1.0, 25.0);
        assert_eq!(row.mean_bkg, 10.0);
        assert_eq!(row.source_signal, -50.0);
        assert!(matches!(
            row.magnitude,
            Err(PhotometryError::DomainError { .. })
        ));
    }

    #[test]
    fn test_scenario_through_summer() {
        let summer = FixedSummer::new(1000.0, 400.0);
        let config = PhotometryConfig::new(area_10_40(), 2.0);
        let rows =
            compute_photometry_with(&summer, &blank(8, 8), &[7], &[(3.0, 4.0)], &config).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, 7);
        assert!((row.aperture_area - 10.0).abs() < 1e-9);
        assert!((row.annulus_area - 40.0).abs() < 1e-9);
        assert!((row.mean_bkg - 10.0).abs() < 1e-9);
        assert!((row.source_signal - 900.0).abs() < 1e-9);
        assert!((row.count_rate - 450.0).abs() < 1e-9);
        assert!((row.magnitude.clone().unwrap() - 18.367).abs() < 0.001);
        assert!((row.annulus_coverage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_geometry_before_summation() {
        let summer = FixedSummer::new(1.0, 1.0);
        let config = PhotometryConfig::new(ApertureGeometry::new(5.0, 5.0, 10.0), 1.0);
        let result = compute_photometry_with(&summer, &blank(4, 4), &[1], &[(1.0, 1.0)], &config);
        assert!(matches!(result, Err(PhotometryError::InvalidGeometry(_))));
        assert_eq!(summer.calls.get(), 0);
    }

    #[test]
    fn test_invalid_exposure_before_summation() {
        let summer = FixedSummer::new(1.0, 1.0);
        for exposure in [0.0, -3.0, f64::INFINITY] {
            let config = PhotometryConfig::new(ApertureGeometry::new(2.0, 4.0, 6.0), exposure);
            let result =
                compute_photometry_with(&summer, &blank(4, 4), &[1], &[(1.0, 1.0)], &config);
            assert!(matches!(result, Err(PhotometryError::InvalidExposure(_))));
        }
        assert_eq!(summer.calls.get(), 0);
    }

    #[test]
    fn test_dimension_mismatch_before_summation() {
        let summer = FixedSummer::new(1.0, 1.0);
        let config = PhotometryConfig::new(ApertureGeometry::new(2.0, 4.0, 6.0), 1.0);
        let result = compute_photometry_with(
            &summer,
            &blank(4, 4),
            &[1, 2, 3],
            &[(1.0, 1.0), (2.0, 2.0)],
            &config,
        );
        assert_eq!(
            result,
            Err(PhotometryError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(summer.calls.get(), 0);
    }

    #[test]
    fn test_rows_follow_input_order() {
        let mut data = vec![0.0; 100 * 100];
        // Distinct brightness per source so rows can be told apart
        let positions = [(80.0, 20.0), (20.0, 20.0), (50.0, 80.0)];
        for (k, &(x, y)) in positions.iter().enumerate() {
            data[y as usize * 100 + x as usize] = 100.0 * (k + 1) as f64;
        }
        let image = FitsImage::new(100, 100, data).unwrap();
        let config = PhotometryConfig::new(ApertureGeometry::new(2.0, 4.0, 8.0), 1.0);

        let rows = compute_photometry(&image, &positions, &config).unwrap();
        assert_eq!(rows.len(), positions.len());
        for (k, row) in rows.iter().enumerate() {
            assert_eq!(row.id, k + 1);
            assert_eq!((row.x, row.y), positions[k]);
            assert!((row.aperture_sum - 100.0 * (k + 1) as f64).abs() < 1e-9);
            assert!(row.annulus_sum.abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_positions() {
        let config = PhotometryConfig::new(ApertureGeometry::new(2.0, 4.0, 8.0), 1.0);
        let rows = compute_photometry(&blank(10, 10), &[], &config).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_one_bad_source_does_not_abort_batch() {
        // Flat sky of 10 with a single bright pixel on the first source
        let mut data = vec![10.0; 60 * 60];
        data[15 * 60 + 15] += 5000.0;
        let image = FitsImage::new(60, 60, data).unwrap();
        let config = PhotometryConfig::new(ApertureGeometry::new(3.0, 5.0, 9.0), 10.0);

        let rows = compute_photometry(&image, &[(15.0, 15.0), (45.0, 45.0)], &config).unwrap();
        assert!((rows[0].source_signal - 5000.0).abs() < 1e-6);
        assert!(rows[0].magnitude.is_ok());
        // Pure sky: signal is zero up to rounding, never a positive flux
        assert!(rows[1].source_signal.abs() < 1e-6);
        if rows[1].source_signal <= 0.0 {
            assert!(rows[1].magnitude.is_err());
        }
    }

    #[test]
    fn test_annulus_diagnostics() {
        let image = FitsImage::new(100, 100, vec![1.0; 100 * 100]).unwrap();
        let config = PhotometryConfig::new(ApertureGeometry::new(3.0, 6.0, 12.0), 1.0);
        let positions = [(50.0, 50.0), (60.0, 50.0), (2.0, 90.0)];

        let rows = compute_photometry(&image, &positions, &config).unwrap();
        assert_eq!(rows[0].annulus_neighbors, 1);
        assert_eq!(rows[1].annulus_neighbors, 1);
        assert_eq!(rows[2].annulus_neighbors, 0);

        assert!((rows[0].annulus_coverage - 1.0).abs() < 1e-9);
        assert!(rows[2].annulus_coverage < 0.9);
        assert!(rows[2].background_suspect());
        assert!(rows[0].background_suspect());

        // A clipped annulus on a flat image still recovers the sky per pixel
        // once the covered area is taken into account
        let row = &rows[2];
        let per_pixel = row.annulus_sum / (row.annulus_coverage * row.annulus_area);
        assert!((per_pixel - 1.0).abs() < 1e-9);
    }
}
