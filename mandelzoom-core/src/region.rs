use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::error::CoreError;

/// A rectangular region of the complex plane.
///
/// Pixel `(0, 0)` maps to `(x_min, y_min)` and the last pixel of each axis
/// maps to `(x_max, y_max)`, matching a `linspace` over each extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Region {
    /// The default view: `[-2, 2] × [-2, 2]`.
    pub const DEFAULT: Self = Self {
        x_min: -2.0,
        x_max: 2.0,
        y_min: -2.0,
        y_max: 2.0,
    };

    /// Create a region, rejecting inverted, degenerate or non-finite bounds.
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> crate::Result<Self> {
        let region = Self {
            x_min,
            x_max,
            y_min,
            y_max,
        };
        region.validate()?;
        Ok(region)
    }

    /// Build a region from two arbitrary corners of a selection box.
    ///
    /// Corners may arrive in any order (a drag can go up-left); they are
    /// sorted per axis. A zero-area box is still rejected.
    pub fn from_corners(a: Complex, b: Complex) -> crate::Result<Self> {
        Self::new(
            a.re.min(b.re),
            a.re.max(b.re),
            a.im.min(b.im),
            a.im.max(b.im),
        )
    }

    /// Region centred on `center` with the given half-extents.
    pub fn from_center(center: Complex, half_width: f64, half_height: f64) -> Self {
        Self {
            x_min: center.re - half_width,
            x_max: center.re + half_width,
            y_min: center.im - half_height,
            y_max: center.im + half_height,
        }
    }

    /// Check the ordering invariant the pixel mapping relies on.
    pub fn validate(&self) -> crate::Result<()> {
        let bounds = [self.x_min, self.x_max, self.y_min, self.y_max];
        if bounds.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidRegion {
                reason: format!("bounds must be finite, got {self}"),
            });
        }
        if self.x_min >= self.x_max || self.y_min >= self.y_max {
            return Err(CoreError::InvalidRegion {
                reason: format!("expected x_min < x_max and y_min < y_max, got {self}"),
            });
        }
        Ok(())
    }

    /// Half of the horizontal and vertical extent.
    pub fn half_extents(&self) -> (f64, f64) {
        (
            (self.x_max - self.x_min) / 2.0,
            (self.y_max - self.y_min) / 2.0,
        )
    }

    pub fn center(&self) -> Complex {
        let (hw, hh) = self.half_extents();
        Complex::new(self.x_min + hw, self.y_min + hh)
    }

    /// Map a pixel coordinate to the point `c` it samples.
    ///
    /// A single-pixel axis samples its minimum edge.
    #[inline]
    pub fn pixel_to_complex(&self, px: u32, py: u32, width: u32, height: u32) -> Complex {
        Complex::new(
            axis_sample(self.x_min, self.x_max, px, width),
            axis_sample(self.y_min, self.y_max, py, height),
        )
    }

    /// All sample points of a `height × width` grid, row-major.
    pub fn sample_points(&self, width: u32, height: u32) -> Vec<Complex> {
        let xs: Vec<f64> = (0..width)
            .map(|px| axis_sample(self.x_min, self.x_max, px, width))
            .collect();
        let mut points = Vec::with_capacity(width as usize * height as usize);
        for py in 0..height {
            let im = axis_sample(self.y_min, self.y_max, py, height);
            points.extend(xs.iter().map(|&re| Complex::new(re, im)));
        }
        points
    }

    /// Bounds as `[x_min, x_max, y_min, y_max]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.x_min, self.x_max, self.y_min, self.y_max]
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}] × [{}, {}]",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}

#[inline]
fn axis_sample(min: f64, max: f64, index: u32, count: u32) -> f64 {
    if count <= 1 {
        return min;
    }
    min + index as f64 / (count - 1) as f64 * (max - min)
}
