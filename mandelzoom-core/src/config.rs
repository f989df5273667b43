use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Grid dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub height: u32,
    pub width: u32,
}

impl Shape {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// A square `side × side` grid.
    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn pixel_count(&self) -> usize {
        self.height as usize * self.width as usize
    }
}

/// How the kernel represents and updates the orbit grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// Keep `z` as one complex value per pixel; otherwise split it into
    /// separate real and imaginary planes.
    pub use_native_complex: bool,
    /// Update the orbit buffers in place instead of allocating new ones
    /// every pass.
    pub mutate_in_place: bool,
    /// Skip pixels that already escaped. Only meaningful in place.
    pub use_early_exit_mask: bool,
}

impl Strategy {
    /// The reference strategy: native complex, reallocating.
    pub const REFERENCE: Self = Self {
        use_native_complex: true,
        mutate_in_place: false,
        use_early_exit_mask: false,
    };

    pub fn new(use_native_complex: bool, mutate_in_place: bool, use_early_exit_mask: bool) -> Self {
        Self {
            use_native_complex,
            mutate_in_place,
            use_early_exit_mask,
        }
    }

    /// Every flag combination, reference first.
    pub fn all() -> [Self; 8] {
        let mut out = [Self::REFERENCE; 8];
        let mut i = 0;
        for native in [true, false] {
            for in_place in [false, true] {
                for mask in [false, true] {
                    out[i] = Self::new(native, in_place, mask);
                    i += 1;
                }
            }
        }
        out
    }

    /// Whether the mask actually takes effect (it is ignored when reallocating).
    pub fn is_masked(&self) -> bool {
        self.mutate_in_place && self.use_early_exit_mask
    }

    /// Short label for logs and error messages.
    pub fn label(&self) -> &'static str {
        match (
            self.use_native_complex,
            self.mutate_in_place,
            self.is_masked(),
        ) {
            (true, false, _) => "native-complex/reallocating",
            (true, true, false) => "native-complex/in-place",
            (true, true, true) => "native-complex/in-place/masked",
            (false, false, _) => "decomposed/reallocating",
            (false, true, false) => "decomposed/in-place",
            (false, true, true) => "decomposed/in-place/masked",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::REFERENCE
    }
}

/// Everything the kernel needs besides the region.
///
/// The cached `escape_threshold_sq` field is recomputed on deserialization so
/// saved configs always stay consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderConfig {
    pub shape: Shape,

    /// Pass budget; also the sentinel for "did not escape".
    pub max_iterations: u32,

    /// Exponent of the iterated polynomial `z ← z^degree + c`.
    pub degree: u32,

    /// An orbit has escaped once `|z|` exceeds this.
    pub escape_threshold: f64,

    pub strategy: Strategy,

    #[serde(skip)]
    escape_threshold_sq: f64,
}

impl<'de> Deserialize<'de> for RenderConfig {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            shape: Shape,
            max_iterations: u32,
            #[serde(default = "default_degree")]
            degree: u32,
            #[serde(default = "default_threshold")]
            escape_threshold: f64,
            #[serde(default)]
            strategy: Strategy,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self {
            shape: raw.shape,
            max_iterations: raw.max_iterations,
            degree: raw.degree,
            escape_threshold: raw.escape_threshold,
            strategy: raw.strategy,
            escape_threshold_sq: raw.escape_threshold * raw.escape_threshold,
        })
    }
}

fn default_degree() -> u32 {
    RenderConfig::DEFAULT_DEGREE
}

fn default_threshold() -> f64 {
    RenderConfig::DEFAULT_ESCAPE_THRESHOLD
}

impl RenderConfig {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
    pub const DEFAULT_RESOLUTION: u32 = 800;
    pub const DEFAULT_DEGREE: u32 = 2;
    pub const DEFAULT_ESCAPE_THRESHOLD: f64 = 2.0;
    pub const MIN_ITERATIONS: u32 = 2;

    /// Build and validate a configuration.
    pub fn new(
        shape: Shape,
        max_iterations: u32,
        degree: u32,
        escape_threshold: f64,
        strategy: Strategy,
    ) -> crate::Result<Self> {
        let config = Self {
            shape,
            max_iterations,
            degree,
            escape_threshold,
            strategy,
            escape_threshold_sq: escape_threshold * escape_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against the kernel's preconditions.
    pub fn validate(&self) -> crate::Result<()> {
        if self.shape.height == 0 || self.shape.width == 0 {
            return Err(CoreError::InvalidShape {
                height: self.shape.height,
                width: self.shape.width,
            });
        }
        if self.max_iterations < Self::MIN_ITERATIONS {
            return Err(CoreError::InvalidMaxIterations(self.max_iterations));
        }
        if self.escape_threshold <= 0.0 || !self.escape_threshold.is_finite() {
            return Err(CoreError::InvalidEscapeThreshold(self.escape_threshold));
        }
        if self.degree < 2 || (!self.strategy.use_native_complex && self.degree > 4) {
            return Err(CoreError::UnsupportedDegree {
                degree: self.degree,
                strategy: self.strategy.label(),
            });
        }
        Ok(())
    }

    /// Pre-computed squared threshold for the inner loop.
    #[inline]
    pub fn escape_threshold_sq(&self) -> f64 {
        self.escape_threshold_sq
    }

    /// Update the threshold and recompute the cached square.
    pub fn set_escape_threshold(&mut self, threshold: f64) {
        self.escape_threshold = threshold;
        self.escape_threshold_sq = threshold * threshold;
    }

    /// Return a copy with a different `max_iterations` value.
    pub fn with_max_iterations(self, max_iterations: u32) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Return a copy with a different threshold.
    pub fn with_escape_threshold(mut self, threshold: f64) -> Self {
        self.set_escape_threshold(threshold);
        self
    }

    pub fn with_shape(self, shape: Shape) -> Self {
        Self { shape, ..self }
    }

    pub fn with_degree(self, degree: u32) -> Self {
        Self { degree, ..self }
    }

    pub fn with_strategy(self, strategy: Strategy) -> Self {
        Self { strategy, ..self }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            shape: Shape::square(Self::DEFAULT_RESOLUTION),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            degree: Self::DEFAULT_DEGREE,
            escape_threshold: Self::DEFAULT_ESCAPE_THRESHOLD,
            strategy: Strategy::REFERENCE,
            escape_threshold_sq: Self::DEFAULT_ESCAPE_THRESHOLD * Self::DEFAULT_ESCAPE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = RenderConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.max_iterations, 100);
        assert!((c.escape_threshold_sq() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let base = RenderConfig::default();
        assert!(base.with_shape(Shape::new(0, 10)).validate().is_err());
        assert!(base.with_shape(Shape::new(10, 0)).validate().is_err());
        assert!(base.with_shape(Shape::new(1, 1)).validate().is_ok());
    }

    #[test]
    fn too_few_iterations_is_rejected() {
        let base = RenderConfig::default();
        assert_eq!(
            base.with_max_iterations(1).validate(),
            Err(CoreError::InvalidMaxIterations(1))
        );
        assert!(base.with_max_iterations(2).validate().is_ok());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let base = RenderConfig::default();
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(base.with_escape_threshold(t).validate().is_err());
        }
    }

    #[test]
    fn decomposed_strategy_limits_degree() {
        let decomposed = RenderConfig::default().with_strategy(Strategy::new(false, true, false));
        for d in 2..=4 {
            assert!(decomposed.with_degree(d).validate().is_ok());
        }
        assert!(matches!(
            decomposed.with_degree(5).validate(),
            Err(CoreError::UnsupportedDegree { degree: 5, .. })
        ));
        assert!(RenderConfig::default().with_degree(7).validate().is_ok());
        assert!(RenderConfig::default().with_degree(1).validate().is_err());
    }

    #[test]
    fn all_strategies_are_distinct() {
        let all = Strategy::all();
        assert_eq!(all[0], Strategy::REFERENCE);
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn deserialize_recomputes_cached_square() {
        let json = r#"{"shape":{"height":4,"width":5},"max_iterations":50,"escape_threshold":3.0}"#;
        let c: RenderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.degree, 2);
        assert_eq!(c.strategy, Strategy::REFERENCE);
        assert!((c.escape_threshold_sq() - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_round_trip_preserves_fields() {
        let c = RenderConfig::new(Shape::new(3, 7), 42, 3, 2.5, Strategy::new(false, true, true))
            .unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let back: RenderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
