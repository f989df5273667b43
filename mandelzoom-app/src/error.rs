use thiserror::Error;

use crate::job::JobError;

/// Errors surfaced by the command-line front end.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Usage(String),

    #[error("no divergence grid has been computed yet")]
    NoGrid,

    #[error(transparent)]
    Core(#[from] mandelzoom_core::CoreError),

    #[error(transparent)]
    Render(#[from] mandelzoom_render::RenderError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
