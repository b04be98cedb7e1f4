// End-to-end checks on synthetic frames: Gaussian stars of known flux over a
// flat or noisy sky, run through detection and aperture photometry.

#[cfg(test)]
mod tests {
    use crate::aperture::ApertureGeometry;
    use crate::image_analysis::FitsImage;
    use crate::photometry::{compute_photometry, compute_photometry_with_ids, PhotometryConfig};
    use crate::source_detection::{detect_sources, SourceDetectionParams};
    use rand::prelude::*;
    use std::f64::consts::PI;

    struct SyntheticImage {
        pub data: Vec<f64>,
        pub width: usize,
        pub height: usize,
        pub stars: Vec<SyntheticStar>,
    }

    #[derive(Debug, Clone)]
    struct SyntheticStar {
        pub x: f64,
        pub y: f64,
        pub flux: f64,
        pub sigma: f64,
    }

    impl SyntheticImage {
        /// Sky level plus uniform noise of the given peak-to-peak amplitude
        fn new(width: usize, height: usize, background: f64, noise: f64, seed: u64) -> Self {
            let mut rng = StdRng::seed_from_u64(seed);
            let data = (0..width * height)
                .map(|_| background + (rng.gen::<f64>() - 0.5) * noise)
                .collect();

            SyntheticImage {
                data,
                width,
                height,
                stars: Vec::new(),
            }
        }

        /// Add a circular Gaussian whose pixel values sum to `flux`
        fn add_star(&mut self, x: f64, y: f64, flux: f64, sigma: f64) {
            let norm = flux / (2.0 * PI * sigma * sigma);
            for row in 0..self.height {
                for col in 0..self.width {
                    let dx = col as f64 - x;
                    let dy = row as f64 - y;
                    let r2 = dx * dx + dy * dy;
                    self.data[row * self.width + col] += norm * (-r2 / (2.0 * sigma * sigma)).exp();
                }
            }
            self.stars.push(SyntheticStar { x, y, flux, sigma });
        }

        fn to_fits(&self) -> FitsImage {
            FitsImage::new(self.width, self.height, self.data.clone()).unwrap()
        }
    }

    fn three_star_field() -> SyntheticImage {
        let mut image = SyntheticImage::new(100, 80, 1000.0, 20.0, 42);
        image.add_star(30.2, 20.6, 20000.0, 1.5);
        image.add_star(70.8, 25.3, 15000.0, 1.5);
        image.add_star(45.5, 60.1, 30000.0, 1.8);
        image
    }

    #[test]
    fn test_flat_sky_single_star() {
        let mut synthetic = SyntheticImage::new(100, 80, 100.0, 0.0, 0);
        synthetic.add_star(50.3, 40.7, 10000.0, 1.5);
        let image = synthetic.to_fits();

        let config = PhotometryConfig::new(ApertureGeometry::new(8.0, 12.0, 20.0), 10.0);
        let rows = compute_photometry(&image, &[(50.3, 40.7)], &config).unwrap();
        let row = &rows[0];

        assert!((row.mean_bkg - 100.0).abs() < 1e-6, "mean_bkg {}", row.mean_bkg);
        assert!(
            (row.source_signal - 10000.0).abs() < 1.0,
            "source_signal {}",
            row.source_signal
        );
        assert!((row.count_rate - 1000.0).abs() < 0.1);
        assert!((row.magnitude.clone().unwrap() - 17.5).abs() < 1e-3);
        assert!(!row.background_suspect());
    }

    #[test]
    fn test_detection_recovers_injected_stars() {
        let synthetic = three_star_field();
        let result = detect_sources(&synthetic.to_fits(), &SourceDetectionParams::default());

        assert_eq!(result.sources.len(), synthetic.stars.len());
        // Raster order matches top-to-bottom order of the injected stars
        for (source, star) in result.sources.iter().zip(&synthetic.stars) {
            assert!(
                (source.x - star.x).abs() < 0.5 && (source.y - star.y).abs() < 0.5,
                "source {:?} far from star {:?}",
                source,
                star
            );
        }
        assert_eq!(result.ids(), vec![1, 2, 3]);
        assert!((result.background.median - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_detect_then_measure() {
        let synthetic = three_star_field();
        let image = synthetic.to_fits();
        let detection = detect_sources(&image, &SourceDetectionParams::default());

        let config = PhotometryConfig::new(ApertureGeometry::new(6.0, 9.0, 16.0), 5.0);
        let rows =
            compute_photometry_with_ids(&image, &detection.ids(), &detection.positions(), &config)
                .unwrap();

        assert_eq!(rows.len(), synthetic.stars.len());
        for (row, star) in rows.iter().zip(&synthetic.stars) {
            assert!((row.mean_bkg - 1000.0).abs() < 1.0, "mean_bkg {}", row.mean_bkg);
            let relative = (row.source_signal - star.flux).abs() / star.flux;
            assert!(relative < 0.02, "star {:?}: signal {}", star, row.source_signal);
            assert!((row.count_rate - row.source_signal / 5.0).abs() < 1e-9);
            assert!(row.annulus_coverage > 0.999);
            assert_eq!(row.annulus_neighbors, 0);
            assert!(row.magnitude.is_ok());
        }

        // Brighter star, smaller magnitude
        let mags: Vec<f64> = rows.iter().map(|r| r.magnitude.clone().unwrap()).collect();
        assert!(mags[2] < mags[0] && mags[0] < mags[1]);
    }

    #[test]
    fn test_clipped_annulus_biases_background_low() {
        let image = SyntheticImage::new(60, 60, 50.0, 0.0, 0).to_fits();
        let config = PhotometryConfig::new(ApertureGeometry::new(3.0, 6.0, 12.0), 1.0);
        let rows = compute_photometry(&image, &[(4.0, 30.0)], &config).unwrap();
        let row = &rows[0];

        assert!(row.annulus_coverage < 0.9);
        assert!(row.background_suspect());
        // Off-image pixels contribute nothing while the area stays geometric
        assert!((row.mean_bkg - 50.0 * row.annulus_coverage).abs() < 1e-6);
    }

    #[test]
    fn test_neighbour_in_annulus_is_flagged() {
        let mut synthetic = SyntheticImage::new(80, 80, 10.0, 0.0, 0);
        synthetic.add_star(35.0, 40.0, 5000.0, 1.2);
        synthetic.add_star(45.0, 40.0, 5000.0, 1.2);
        let image = synthetic.to_fits();

        let config = PhotometryConfig::new(ApertureGeometry::new(3.0, 6.0, 12.0), 1.0);
        let rows = compute_photometry(&image, &[(35.0, 40.0), (45.0, 40.0)], &config).unwrap();

        for row in &rows {
            assert_eq!(row.annulus_neighbors, 1);
            assert!(row.background_suspect());
            // Light from the neighbour inflates the sky estimate
            assert!(row.mean_bkg > 10.0);
        }
    }
}
