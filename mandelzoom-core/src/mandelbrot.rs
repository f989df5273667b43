use crate::complex::Complex;
use crate::config::RenderConfig;
use crate::fractal::Fractal;
use crate::orbit::step_native;

/// The Multibrot family `z ← z^degree + c`, starting from `z₀ = 0`.
///
/// The point `c` is the coordinate on the complex plane. This is the
/// point-at-a-time counterpart of the grid kernel and serves as its oracle
/// in tests.
#[derive(Debug, Clone)]
pub struct Mandelbrot {
    max_iterations: u32,
    degree: u32,
    escape_threshold_sq: f64,
}

impl Mandelbrot {
    /// Build from an already-validated config.
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            degree: config.degree,
            escape_threshold_sq: config.escape_threshold_sq(),
        }
    }

    pub fn degree(&self) -> u32 {
        self.degree
    }
}

impl Default for Mandelbrot {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl Fractal for Mandelbrot {
    fn escape_time(&self, c: Complex) -> u32 {
        let mut z = Complex::ZERO;
        for n in 0..self.max_iterations {
            z = step_native(z, c, self.degree);
            if z.norm_sq() > self.escape_threshold_sq {
                return n;
            }
        }
        self.max_iterations
    }

    fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}
