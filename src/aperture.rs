//! Circular apertures and annuli, and area-weighted pixel summation.
//!
//! Pixel `(row, col)` covers the unit square centred on `(x = col, y = row)`.
//! A region's sum weights each pixel by the fraction of that square the
//! region covers; how the fraction is computed is chosen by [`OverlapMethod`].

use std::f64::consts::PI;

use crate::error::{PhotometryError, Result};
use crate::image_analysis::FitsImage;

/// Circle centred on a source, used to collect its signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAperture {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl CircularAperture {
    pub fn new(x: f64, y: f64, r: f64) -> Self {
        Self { x, y, r }
    }

    /// Geometric area, independent of the pixel grid.
    pub fn area(&self) -> f64 {
        PI * self.r * self.r
    }
}

/// Ring around a source, used to sample the local sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularAnnulus {
    pub x: f64,
    pub y: f64,
    pub r_in: f64,
    pub r_out: f64,
}

impl CircularAnnulus {
    pub fn new(x: f64, y: f64, r_in: f64, r_out: f64) -> Self {
        Self { x, y, r_in, r_out }
    }

    pub fn area(&self) -> f64 {
        PI * (self.r_out * self.r_out - self.r_in * self.r_in)
    }
}

/// A region handed to a [`RegionSummer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Circle(CircularAperture),
    Annulus(CircularAnnulus),
}

impl Region {
    pub fn area(&self) -> f64 {
        match self {
            Region::Circle(c) => c.area(),
            Region::Annulus(a) => a.area(),
        }
    }
}

/// Result of summing an image over a region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionSum {
    /// Area-weighted sum of the samples under the region
    pub sum: f64,
    /// Total pixel weight that landed inside the image
    pub covered_area: f64,
}

/// Sums image samples over a region.
pub trait RegionSummer {
    fn sum(&self, image: &FitsImage, region: &Region) -> RegionSum;
}

/// How boundary pixels are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMethod {
    /// Exact area of the circle/pixel intersection.
    #[default]
    Exact,
    /// A pixel counts fully when its centre is strictly inside the circle.
    Center,
    /// Each pixel is split into n x n sub-pixels tested by their centres.
    Subpixel(u32),
}

impl std::str::FromStr for OverlapMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(OverlapMethod::Exact),
            "center" | "centre" => Ok(OverlapMethod::Center),
            "subpixel" => Ok(OverlapMethod::Subpixel(5)),
            _ => Err(format!("Unknown overlap method: {}", s)),
        }
    }
}

impl std::fmt::Display for OverlapMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlapMethod::Exact => write!(f, "exact"),
            OverlapMethod::Center => write!(f, "center"),
            OverlapMethod::Subpixel(n) => write!(f, "subpixel({})", n),
        }
    }
}

impl OverlapMethod {
    pub fn validate(&self) -> Result<()> {
        match self {
            OverlapMethod::Subpixel(0) => Err(PhotometryError::InvalidGeometry(
                "subpixel sampling needs at least one subdivision".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Fraction of the pixel centred on `(dx, dy)` (relative to the circle
    /// centre) covered by a circle of radius `r`.
    pub fn pixel_weight(&self, dx: f64, dy: f64, r: f64) -> f64 {
        match *self {
            OverlapMethod::Exact => {
                circle_rect_overlap(r, dx - 0.5, dx + 0.5, dy - 0.5, dy + 0.5)
            }
            OverlapMethod::Center => {
                if dx * dx + dy * dy < r * r {
                    1.0
                } else {
                    0.0
                }
            }
            OverlapMethod::Subpixel(n) => {
                let n = n.max(1);
                let step = 1.0 / n as f64;
                let r2 = r * r;
                let mut inside = 0u32;
                for sy in 0..n {
                    let py = dy - 0.5 + (sy as f64 + 0.5) * step;
                    for sx in 0..n {
                        let px = dx - 0.5 + (sx as f64 + 0.5) * step;
                        if px * px + py * py < r2 {
                            inside += 1;
                        }
                    }
                }
                inside as f64 * step * step
            }
        }
    }

    fn sum_circle(&self, image: &FitsImage, cx: f64, cy: f64, r_in: f64, r_out: f64) -> RegionSum {
        if image.width == 0 || image.height == 0 {
            return RegionSum::default();
        }

        let max_col = image.width as isize - 1;
        let max_row = image.height as isize - 1;
        let col_min = ((cx - r_out - 0.5).ceil() as isize).max(0);
        let col_max = ((cx + r_out + 0.5).floor() as isize).min(max_col);
        let row_min = ((cy - r_out - 0.5).ceil() as isize).max(0);
        let row_max = ((cy + r_out + 0.5).floor() as isize).min(max_row);

        let mut result = RegionSum::default();
        if col_min > col_max || row_min > row_max {
            return result;
        }

        for row in row_min..=row_max {
            let dy = row as f64 - cy;
            let offset = row as usize * image.width;
            for col in col_min..=col_max {
                let dx = col as f64 - cx;
                let mut weight = self.pixel_weight(dx, dy, r_out);
                if r_in > 0.0 && weight > 0.0 {
                    weight -= self.pixel_weight(dx, dy, r_in);
                }
                if weight <= 0.0 {
                    continue;
                }
                let value = image.data[offset + col as usize];
                if value.is_finite() {
                    result.sum += weight * value;
                    result.covered_area += weight;
                }
            }
        }

        result
    }
}

impl RegionSummer for OverlapMethod {
    fn sum(&self, image: &FitsImage, region: &Region) -> RegionSum {
        match region {
            Region::Circle(c) => self.sum_circle(image, c.x, c.y, 0.0, c.r),
            Region::Annulus(a) => self.sum_circle(image, a.x, a.y, a.r_in, a.r_out),
        }
    }
}

/// Area of the intersection between a circle of radius `r` centred on the
/// origin and the rectangle `[x0, x1] x [y0, y1]`.
///
/// The x range is cut wherever the circle crosses `y = y0` or `y = y1`;
/// inside each strip the upper and lower bounds are each either a straight
/// edge or an arc, so the area integrates in closed form.
pub fn circle_rect_overlap(r: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    if r <= 0.0 || y0 >= y1 {
        return 0.0;
    }
    let xa = x0.max(-r);
    let xb = x1.min(r);
    if xa >= xb {
        return 0.0;
    }

    let mut cuts = [0.0f64; 6];
    cuts[0] = xa;
    let mut n = 1;
    for y in [y0, y1] {
        if y.abs() < r {
            let x = (r * r - y * y).sqrt();
            for c in [-x, x] {
                if c > xa && c < xb {
                    cuts[n] = c;
                    n += 1;
                }
            }
        }
    }
    cuts[n] = xb;
    n += 1;
    let cuts = &mut cuts[..n];
    cuts.sort_by(|a, b| a.total_cmp(b));

    cuts.windows(2)
        .map(|w| strip_area(r, w[0], w[1], y0, y1))
        .sum::<f64>()
        .max(0.0)
}

fn strip_area(r: f64, a: f64, b: f64, y0: f64, y1: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let mid = 0.5 * (a + b);
    let h = (r * r - mid * mid).max(0.0).sqrt();
    let top_is_arc = h < y1;
    let bottom_is_arc = -h > y0;
    let top = if top_is_arc { h } else { y1 };
    let bottom = if bottom_is_arc { -h } else { y0 };
    if top <= bottom {
        return 0.0;
    }

    let arc = arc_integral(r, b) - arc_integral(r, a);
    let upper = if top_is_arc { arc } else { y1 * (b - a) };
    let lower = if bottom_is_arc { -arc } else { y0 * (b - a) };
    upper - lower
}

// Antiderivative of sqrt(r^2 - x^2)
fn arc_integral(r: f64, x: f64) -> f64 {
    let x = x.clamp(-r, r);
    0.5 * (x * (r * r - x * x).max(0.0).sqrt() + r * r * (x / r).asin())
}

/// Radii shared by every source in a photometry run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ApertureGeometry {
    pub r_aperture: f64,
    pub r_in: f64,
    pub r_out: f64,
}

impl ApertureGeometry {
    pub fn new(r_aperture: f64, r_in: f64, r_out: f64) -> Self {
        Self {
            r_aperture,
            r_in,
            r_out,
        }
    }

    /// Rule of thumb from the seeing FWHM: aperture at three times the
    /// seeing, a 3 px gap, then a 14 px wide annulus.
    pub fn from_seeing(seeing: f64) -> Self {
        let r_aperture = 3.0 * seeing;
        let r_in = r_aperture + 3.0;
        Self::new(r_aperture, r_in, r_in + 14.0)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("r_aperture", self.r_aperture),
            ("r_in", self.r_in),
            ("r_out", self.r_out),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PhotometryError::InvalidGeometry(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.r_in <= self.r_aperture {
            return Err(PhotometryError::InvalidGeometry(format!(
                "annulus inner radius {} must exceed aperture radius {}",
                self.r_in, self.r_aperture
            )));
        }
        if self.r_out <= self.r_in {
            return Err(PhotometryError::InvalidGeometry(format!(
                "annulus outer radius {} must exceed inner radius {}",
                self.r_out, self.r_in
            )));
        }
        Ok(())
    }

    pub fn aperture_at(&self, x: f64, y: f64) -> CircularAperture {
        CircularAperture::new(x, y, self.r_aperture)
    }

    pub fn annulus_at(&self, x: f64, y: f64) -> CircularAnnulus {
        CircularAnnulus::new(x, y, self.r_in, self.r_out)
    }

    pub fn aperture_area(&self) -> f64 {
        PI * self.r_aperture * self.r_aperture
    }

    pub fn annulus_area(&self) -> f64 {
        PI * (self.r_out * self.r_out - self.r_in * self.r_in)
    }
}
