use thiserror::Error;

/// Configuration errors raised by the core before any computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid max iterations: {0} (must be >= 2)")]
    InvalidMaxIterations(u32),

    #[error("invalid escape threshold: {0} (must be finite and > 0.0)")]
    InvalidEscapeThreshold(f64),

    #[error("invalid shape: {height}×{width} (both dimensions must be >= 1)")]
    InvalidShape { height: u32, width: u32 },

    #[error("degree {degree} is not supported by the {strategy} strategy")]
    UnsupportedDegree { degree: u32, strategy: &'static str },

    #[error("invalid region: {reason}")]
    InvalidRegion { reason: String },

    #[error("invalid cycles: {0} (must be finite and > 0.0)")]
    InvalidCycles(f64),

    #[error("invalid frame count: {0} (must be >= 1)")]
    InvalidFrameCount(u32),
}
