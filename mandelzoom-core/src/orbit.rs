//! Single-step orbit updates shared by the grid kernel and the per-point
//! iterators.

use crate::complex::Complex;
use crate::error::CoreError;

/// One native-complex step: `z^degree + c`.
#[inline]
pub fn step_native(z: Complex, c: Complex, degree: u32) -> Complex {
    z.powi(degree) + c
}

/// Closed-form expansion of `(zx + i·zy)^degree` for the degrees the
/// decomposed representation supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecomposedPower {
    Quadratic,
    Cubic,
    Quartic,
}

impl DecomposedPower {
    pub fn degree(self) -> u32 {
        match self {
            Self::Quadratic => 2,
            Self::Cubic => 3,
            Self::Quartic => 4,
        }
    }

    /// `(zx + i·zy)^degree` as a `(re, im)` pair.
    #[inline]
    pub fn power(self, zx: f64, zy: f64) -> (f64, f64) {
        match self {
            Self::Quadratic => (zx * zx - zy * zy, 2.0 * zx * zy),
            Self::Cubic => {
                let zx2 = zx * zx;
                let zy2 = zy * zy;
                (zx2 * zx - 3.0 * zx * zy2, 3.0 * zx2 * zy - zy2 * zy)
            }
            Self::Quartic => {
                let zx2 = zx * zx;
                let zy2 = zy * zy;
                (
                    zx2 * zx2 - 6.0 * zx2 * zy2 + zy2 * zy2,
                    4.0 * zx2 * zx * zy - 4.0 * zx * zy2 * zy,
                )
            }
        }
    }

    /// One decomposed step: `(zx + i·zy)^degree + (cx + i·cy)`.
    #[inline]
    pub fn step(self, zx: f64, zy: f64, cx: f64, cy: f64) -> (f64, f64) {
        let (re, im) = self.power(zx, zy);
        (re + cx, im + cy)
    }
}

impl TryFrom<u32> for DecomposedPower {
    type Error = CoreError;

    fn try_from(degree: u32) -> Result<Self, Self::Error> {
        match degree {
            2 => Ok(Self::Quadratic),
            3 => Ok(Self::Cubic),
            4 => Ok(Self::Quartic),
            _ => Err(CoreError::UnsupportedDegree {
                degree,
                strategy: "decomposed",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn closed_forms_agree_with_complex_powers() {
        let z = Complex::new(0.7, -0.4);
        for degree in 2..=4 {
            let power = DecomposedPower::try_from(degree).unwrap();
            let (re, im) = power.power(z.re, z.im);
            let expected = z.powi(degree);
            assert!((re - expected.re).abs() < EPSILON, "degree {degree} re");
            assert!((im - expected.im).abs() < EPSILON, "degree {degree} im");
        }
    }

    #[test]
    fn quadratic_step_is_bit_identical_to_native() {
        let z = Complex::new(-0.123456789, 0.987654321);
        let c = Complex::new(0.25, -0.5);
        let native = step_native(z, c, 2);
        let (re, im) = DecomposedPower::Quadratic.step(z.re, z.im, c.re, c.im);
        assert_eq!(native, Complex::new(re, im));
    }

    #[test]
    fn unsupported_degrees_fail() {
        assert!(DecomposedPower::try_from(1).is_err());
        assert!(DecomposedPower::try_from(5).is_err());
        assert_eq!(DecomposedPower::try_from(3).unwrap().degree(), 3);
    }
}
