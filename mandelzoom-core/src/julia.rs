use serde::{Deserialize, Serialize};

use crate::complex::Complex;
use crate::error::CoreError;
use crate::fractal::Fractal;

/// A quadratic Julia set: `z ← z² + c`, where `c` is a fixed constant
/// and `z₀` is the point on the complex plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Julia {
    /// The fixed constant `c` that defines this Julia set.
    c: Complex,
    max_iterations: u32,
    escape_radius: f64,
}

impl Julia {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 256;
    pub const DEFAULT_ESCAPE_RADIUS: f64 = 4.0;

    pub fn new(c: Complex, max_iterations: u32, escape_radius: f64) -> crate::Result<Self> {
        if max_iterations < 1 {
            return Err(CoreError::InvalidMaxIterations(max_iterations));
        }
        if escape_radius <= 0.0 || !escape_radius.is_finite() {
            return Err(CoreError::InvalidEscapeThreshold(escape_radius));
        }
        Ok(Self {
            c,
            max_iterations,
            escape_radius,
        })
    }

    /// A Julia set with the default budget and radius.
    pub fn with_constant(c: Complex) -> Self {
        Self {
            c,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            escape_radius: Self::DEFAULT_ESCAPE_RADIUS,
        }
    }

    /// A visually interesting default: `c = -0.7 + 0.27015i`.
    pub fn default_c() -> Complex {
        Complex::new(-0.7, 0.27015)
    }

    /// The constant `c` defining this Julia set.
    pub fn c(&self) -> Complex {
        self.c
    }

    pub fn escape_radius(&self) -> f64 {
        self.escape_radius
    }
}

impl Default for Julia {
    fn default() -> Self {
        Self::with_constant(Self::default_c())
    }
}

impl Fractal for Julia {
    fn escape_time(&self, point: Complex) -> u32 {
        let radius_sq = self.escape_radius * self.escape_radius;
        let mut z = point;
        for n in 0..self.max_iterations {
            z = z * z + self.c;
            if z.norm_sq() > radius_sq {
                return n;
            }
        }
        self.max_iterations
    }

    fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_point_escapes() {
        assert_eq!(Julia::default().escape_time(Complex::new(10.0, 0.0)), 0);
    }

    #[test]
    fn c_zero_origin_is_fixed_point() {
        let j = Julia::with_constant(Complex::ZERO);
        assert_eq!(j.escape_time(Complex::ZERO), Julia::DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn c_zero_outside_unit_circle_escapes() {
        // z₀ = 1.5: 2.25, 5.06 (> 4) → pass 1.
        let j = Julia::with_constant(Complex::ZERO);
        assert_eq!(j.escape_time(Complex::new(1.5, 0.0)), 1);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Julia::new(Complex::ZERO, 0, 4.0).is_err());
        assert!(Julia::new(Complex::ZERO, 10, 0.0).is_err());
        assert!(Julia::new(Complex::ZERO, 10, f64::NAN).is_err());
    }

    #[test]
    fn deterministic_results() {
        let j = Julia::default();
        let points = [Complex::new(0.0, 0.0), Complex::new(0.5, 0.5), Complex::new(-1.0, 0.3)];
        let run1: Vec<_> = points.iter().map(|&p| j.escape_time(p)).collect();
        let run2: Vec<_> = points.iter().map(|&p| j.escape_time(p)).collect();
        assert_eq!(run1, run2);
    }
}
