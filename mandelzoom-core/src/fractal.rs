use crate::complex::Complex;

/// Per-point escape-time evaluation.
///
/// Designed for **static dispatch**: grid renderers are generic over
/// `F: Fractal` so the compiler can inline the iteration loop.
pub trait Fractal {
    /// Iterate a single point and return its divergence time: the 0-based
    /// pass at which `|z|` first exceeded the threshold, or
    /// [`max_iterations`](Self::max_iterations) if it never did.
    fn escape_time(&self, point: Complex) -> u32;

    /// The pass budget, also used as the "did not escape" sentinel.
    fn max_iterations(&self) -> u32;
}
