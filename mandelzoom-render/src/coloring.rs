//! Post-processing of divergence-time grids into display values.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mandelzoom_core::{CoreError, RenderConfig};

use crate::divergence_grid::DivergenceGrid;
use crate::error::{ColoringResolveError, RenderError};

/// Floor applied before taking logarithms.
pub const EPSILON: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Request / output
// ---------------------------------------------------------------------------

/// Everything a coloring transform may look at.
#[derive(Debug, Clone)]
pub struct ColoringRequest<'a> {
    pub raw: &'a DivergenceGrid,
    /// Per-pixel `|z|` source, same length as `raw.data`.
    pub magnitude: Vec<f64>,
    /// `true` where the pixel escaped within the budget.
    pub escape_mask: Vec<bool>,
    pub max_iterations: u32,
    pub cycles: f64,
}

impl<'a> ColoringRequest<'a> {
    /// Derive magnitude and mask from the grid itself.
    ///
    /// The magnitude source is the divergence time reinterpreted as a float,
    /// with zeros lifted to [`EPSILON`].
    pub fn from_grid(raw: &'a DivergenceGrid, cycles: f64) -> Self {
        let magnitude = raw
            .data
            .iter()
            .map(|&t| if t == 0 { EPSILON } else { t as f64 })
            .collect();
        let escape_mask = raw.data.iter().map(|&t| t < raw.max_iterations).collect();
        Self {
            raw,
            magnitude,
            escape_mask,
            max_iterations: raw.max_iterations,
            cycles,
        }
    }

    /// Replace the derived magnitude with real `|z|` values.
    pub fn with_magnitude(mut self, magnitude: Vec<f64>) -> crate::Result<Self> {
        if magnitude.len() != self.raw.len() {
            return Err(RenderError::GridSizeMismatch {
                width: self.raw.width,
                height: self.raw.height,
                len: magnitude.len(),
            });
        }
        self.magnitude = magnitude;
        Ok(self)
    }

    /// Period colors repeat with.
    pub fn period(&self) -> f64 {
        self.max_iterations as f64 / self.cycles
    }
}

/// Real-valued output of a coloring transform, same shape as its input.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayGrid {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f64>,
}

impl DisplayGrid {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// `(min, max)` over all finite cells, or `None` if there are none.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// One way of turning divergence times into display values.
pub trait ColoringTransform: Send + Sync {
    fn apply(&self, request: &ColoringRequest<'_>) -> Vec<f64>;
}

/// Euclidean modulo that never returns `period` itself.
#[inline]
fn wrap(v: f64, period: f64) -> f64 {
    let r = v.rem_euclid(period);
    if r >= period {
        0.0
    } else {
        r
    }
}

/// Exact passthrough of the divergence times.
pub struct Identity;

impl ColoringTransform for Identity {
    fn apply(&self, request: &ColoringRequest<'_>) -> Vec<f64> {
        request.raw.data.iter().map(|&t| t as f64).collect()
    }
}

/// Continuous escape count `n + 1 + log₂(ln 2 / ln |z|)`.
pub struct LogSmoothed;

impl ColoringTransform for LogSmoothed {
    fn apply(&self, request: &ColoringRequest<'_>) -> Vec<f64> {
        let period = request.period();
        let inv_ln2 = 1.0 / std::f64::consts::LN_2;
        request
            .raw
            .data
            .par_iter()
            .zip(request.magnitude.par_iter())
            .zip(request.escape_mask.par_iter())
            .map(|((&t, &mag), &escaped)| {
                let arg = if escaped { mag } else { 2.0 };
                let log_arg = arg.max(EPSILON).ln().max(EPSILON);
                let v = t as f64 + 1.0 + inv_ln2 * (std::f64::consts::LN_2 / log_arg).ln();
                wrap(v, period)
            })
            .collect()
    }
}

/// `sqrt(max + 2 − n)`, min-max normalized and scaled back to the budget.
pub struct SqrtNormalized;

impl ColoringTransform for SqrtNormalized {
    fn apply(&self, request: &ColoringRequest<'_>) -> Vec<f64> {
        let max = request.max_iterations as f64;
        let period = request.period();
        let transformed: Vec<f64> = request
            .raw
            .data
            .par_iter()
            .map(|&t| (max + 2.0 - t as f64).sqrt())
            .collect();

        let (lo, hi) = transformed
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = hi - lo;
        if span <= 0.0 {
            return vec![0.0; transformed.len()];
        }
        transformed
            .into_par_iter()
            .map(|v| wrap((v - lo) / span * max, period))
            .collect()
    }
}

/// Cumulative-histogram equalization over `[0, max_iterations]`.
pub struct HistogramEqualized;

impl ColoringTransform for HistogramEqualized {
    fn apply(&self, request: &ColoringRequest<'_>) -> Vec<f64> {
        let max = request.max_iterations;
        let period = request.period();
        let bins = max as usize + 1;

        let mut counts = vec![0u64; bins];
        for &t in &request.raw.data {
            counts[t.min(max) as usize] += 1;
        }
        let total = request.raw.len().max(1) as f64;
        let mut running = 0u64;
        let cdf: Vec<f64> = counts
            .iter()
            .map(|&n| {
                running += n;
                running as f64 / total
            })
            .collect();

        request
            .raw
            .data
            .par_iter()
            .map(|&t| wrap(cdf[t.min(max) as usize] * max as f64, period))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Kind / pipeline
// ---------------------------------------------------------------------------

/// The closed set of coloring transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColoringKind {
    Identity,
    #[default]
    LogSmoothed,
    SqrtNormalized,
    HistogramEqualized,
}

impl ColoringKind {
    pub const ALL: [Self; 4] = [
        Self::Identity,
        Self::LogSmoothed,
        Self::SqrtNormalized,
        Self::HistogramEqualized,
    ];

    /// Short identifier accepted by [`FromStr`].
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Identity => "none",
            Self::LogSmoothed => "log",
            Self::SqrtNormalized => "sqrt",
            Self::HistogramEqualized => "hist",
        }
    }

    fn transform(self) -> &'static dyn ColoringTransform {
        match self {
            Self::Identity => &Identity,
            Self::LogSmoothed => &LogSmoothed,
            Self::SqrtNormalized => &SqrtNormalized,
            Self::HistogramEqualized => &HistogramEqualized,
        }
    }
}

impl FromStr for ColoringKind {
    type Err = ColoringResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "identity" => Ok(Self::Identity),
            "log" | "logsmoothed" | "log_smoothed" => Ok(Self::LogSmoothed),
            "sqrt" | "sqrtnormalized" | "sqrt_normalized" => Ok(Self::SqrtNormalized),
            "hist" | "histogramequalized" | "histogram_equalized" => {
                Ok(Self::HistogramEqualized)
            }
            _ => Err(ColoringResolveError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for ColoringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// A resolved coloring transform, ready to apply to any number of grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColoringPipeline {
    kind: ColoringKind,
}

impl ColoringPipeline {
    pub fn new(kind: ColoringKind) -> Self {
        Self { kind }
    }

    /// Resolve a transform by identifier.
    ///
    /// Unknown identifiers fall back to [`ColoringKind::Identity`]; the
    /// resolution error is returned alongside so the caller can surface it.
    pub fn resolve(identifier: &str) -> (Self, Option<ColoringResolveError>) {
        match identifier.parse::<ColoringKind>() {
            Ok(kind) => (Self::new(kind), None),
            Err(e) => {
                warn!(identifier, "Unknown coloring strategy, falling back to identity");
                (Self::new(ColoringKind::Identity), Some(e))
            }
        }
    }

    pub fn kind(&self) -> ColoringKind {
        self.kind
    }

    /// Transform `request` into display values.
    pub fn apply(&self, request: &ColoringRequest<'_>) -> crate::Result<DisplayGrid> {
        if request.cycles <= 0.0 || !request.cycles.is_finite() {
            return Err(CoreError::InvalidCycles(request.cycles).into());
        }
        if request.max_iterations < RenderConfig::MIN_ITERATIONS {
            return Err(CoreError::InvalidMaxIterations(request.max_iterations).into());
        }
        let len = request.raw.len();
        for derived in [request.magnitude.len(), request.escape_mask.len()] {
            if derived != len {
                return Err(RenderError::GridSizeMismatch {
                    width: request.raw.width,
                    height: request.raw.height,
                    len: derived,
                });
            }
        }
        debug!(
            coloring = self.kind.identifier(),
            cycles = request.cycles,
            pixels = request.raw.len(),
            "Applying coloring"
        );
        Ok(DisplayGrid {
            width: request.raw.width,
            height: request.raw.height,
            data: self.kind.transform().apply(request),
        })
    }

    /// Shorthand for `apply(&ColoringRequest::from_grid(grid, cycles))`.
    pub fn colorize(&self, grid: &DivergenceGrid, cycles: f64) -> crate::Result<DisplayGrid> {
        self.apply(&ColoringRequest::from_grid(grid, cycles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::compute;
    use mandelzoom_core::{Region, Shape};

    fn sample_grid() -> DivergenceGrid {
        let config = RenderConfig::default()
            .with_shape(Shape::new(40, 50))
            .with_max_iterations(64);
        compute(&config, &Region::new(-2.0, 1.0, -1.2, 1.2).unwrap()).unwrap()
    }

    #[test]
    fn identity_is_exact_passthrough() {
        let grid = sample_grid();
        let out = ColoringPipeline::new(ColoringKind::Identity)
            .colorize(&grid, 3.0)
            .unwrap();
        assert_eq!(out.width, grid.width);
        for (a, &b) in out.data.iter().zip(&grid.data) {
            assert_eq!(*a, b as f64);
        }
    }

    #[test]
    fn wrapped_transforms_stay_in_period() {
        let grid = sample_grid();
        for kind in [
            ColoringKind::LogSmoothed,
            ColoringKind::SqrtNormalized,
            ColoringKind::HistogramEqualized,
        ] {
            for cycles in [0.5, 1.0, 2.5, 7.0] {
                let out = ColoringPipeline::new(kind).colorize(&grid, cycles).unwrap();
                let period = grid.max_iterations as f64 / cycles;
                assert_eq!(out.len(), grid.len());
                assert!(
                    out.data.iter().all(|&v| v >= 0.0 && v < period),
                    "{kind} with {cycles} cycles left [0, {period})"
                );
            }
        }
    }

    #[test]
    fn histogram_of_all_interior_is_constant() {
        let grid = DivergenceGrid::new(8, 8, 30);
        let out = ColoringPipeline::new(ColoringKind::HistogramEqualized)
            .colorize(&grid, 1.0)
            .unwrap();
        let first = out.data[0];
        assert!(first.is_finite());
        assert!(out.data.iter().all(|&v| v == first));
    }

    #[test]
    fn sqrt_of_constant_grid_is_zero() {
        let grid = DivergenceGrid::from_data(2, 2, 10, vec![4; 4]).unwrap();
        let out = ColoringPipeline::new(ColoringKind::SqrtNormalized)
            .colorize(&grid, 1.0)
            .unwrap();
        assert!(out.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn log_uses_two_for_interior_pixels() {
        // Interior: max + 1 + log2(ln2 / ln2) = max + 1, wrapped by max.
        let grid = DivergenceGrid::new(1, 1, 20);
        let out = ColoringPipeline::new(ColoringKind::LogSmoothed)
            .colorize(&grid, 1.0)
            .unwrap();
        assert!((out.data[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_orders_by_divergence_time() {
        let grid = DivergenceGrid::from_data(4, 1, 100, vec![1, 2, 3, 100]).unwrap();
        let out = ColoringPipeline::new(ColoringKind::HistogramEqualized)
            .colorize(&grid, 1.0)
            .unwrap();
        assert!((out.data[0] - 25.0).abs() < 1e-9);
        assert!((out.data[1] - 50.0).abs() < 1e-9);
        assert!((out.data[2] - 75.0).abs() < 1e-9);
        // Cumulative frequency 1 × 100 wraps to 0.
        assert_eq!(out.data[3], 0.0);
    }

    #[test]
    fn invalid_cycles_rejected() {
        let grid = DivergenceGrid::new(2, 2, 10);
        let pipeline = ColoringPipeline::default();
        for cycles in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                pipeline.colorize(&grid, cycles),
                Err(RenderError::Core(CoreError::InvalidCycles(_)))
            ));
        }
    }

    #[test]
    fn resolve_accepts_known_identifiers() {
        for (id, kind) in [
            ("none", ColoringKind::Identity),
            ("Log", ColoringKind::LogSmoothed),
            ("SQRT", ColoringKind::SqrtNormalized),
            ("hist", ColoringKind::HistogramEqualized),
            ("HistogramEqualized", ColoringKind::HistogramEqualized),
        ] {
            let (pipeline, err) = ColoringPipeline::resolve(id);
            assert_eq!(pipeline.kind(), kind, "{id}");
            assert!(err.is_none());
        }
    }

    #[test]
    fn resolve_falls_back_to_identity() {
        let (pipeline, err) = ColoringPipeline::resolve("plasma-swirl");
        assert_eq!(pipeline.kind(), ColoringKind::Identity);
        assert_eq!(
            err,
            Some(ColoringResolveError::UnknownStrategy("plasma-swirl".into()))
        );
    }

    #[test]
    fn identifier_round_trips_through_from_str() {
        for kind in ColoringKind::ALL {
            assert_eq!(kind.identifier().parse::<ColoringKind>(), Ok(kind));
        }
    }

    #[test]
    fn custom_magnitude_must_match_shape() {
        let grid = DivergenceGrid::new(3, 3, 10);
        assert!(ColoringRequest::from_grid(&grid, 1.0)
            .with_magnitude(vec![1.0; 4])
            .is_err());
    }

    #[test]
    fn apply_rejects_derived_grids_of_wrong_length() {
        let grid = DivergenceGrid::new(3, 3, 10);
        let pipeline = ColoringPipeline::new(ColoringKind::LogSmoothed);

        let mut request = ColoringRequest::from_grid(&grid, 1.0);
        request.magnitude = vec![1.0; 4];
        assert!(matches!(
            pipeline.apply(&request),
            Err(RenderError::GridSizeMismatch { len: 4, .. })
        ));

        let mut request = ColoringRequest::from_grid(&grid, 1.0);
        request.escape_mask.truncate(5);
        assert!(matches!(
            pipeline.apply(&request),
            Err(RenderError::GridSizeMismatch { len: 5, .. })
        ));
    }

    #[test]
    fn budget_below_two_is_rejected() {
        let grid = DivergenceGrid::from_data(2, 1, 0, vec![0, 0]).unwrap();
        for kind in ColoringKind::ALL {
            assert!(matches!(
                ColoringPipeline::new(kind).colorize(&grid, 1.0),
                Err(RenderError::Core(CoreError::InvalidMaxIterations(0)))
            ));
        }
    }
}
