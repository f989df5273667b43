use thiserror::Error;

/// Errors originating from the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,

    #[error("unknown colormap: {0}")]
    UnknownColormap(String),

    #[error("grid dimensions {width}×{height} do not match {len} values")]
    GridSizeMismatch { width: u32, height: u32, len: usize },

    #[error("invalid grid file: {reason}")]
    GridFormat { reason: String },

    #[error("sample step must be at least 1")]
    InvalidSampleStep,

    #[error("video encoding failed: {0}")]
    Video(String),

    #[error(transparent)]
    Core(#[from] mandelzoom_core::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Png(#[from] png::EncodingError),
}

/// A coloring identifier that names no known transform.
///
/// Non-fatal: the pipeline falls back to identity and hands this back as a
/// report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColoringResolveError {
    #[error("unknown coloring strategy '{0}'")]
    UnknownStrategy(String),
}
