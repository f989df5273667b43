pub mod animate;
pub mod buffer;
pub mod coloring;
pub mod colormap;
pub mod divergence_grid;
pub mod error;
pub mod export;
pub mod grid_file;
pub mod julia_batch;
pub mod kernel;

pub use animate::{AnimationOutput, AnimationRunner};
pub use buffer::RenderBuffer;
pub use coloring::{
    ColoringKind, ColoringPipeline, ColoringRequest, ColoringTransform, DisplayGrid,
};
pub use colormap::{colormap_index, colormap_names, Colormap, DEFAULT_COLORMAP};
pub use divergence_grid::DivergenceGrid;
pub use error::{ColoringResolveError, RenderError};
pub use export::{ordered_frames, ExportMetadata, ImageWriter, PngImageWriter, VideoEncoder};
pub use grid_file::{load_grid, save_grid};
pub use julia_batch::{render_julia_batch, JuliaBatchOutput, JuliaBatchSettings};
pub use kernel::{compute, compute_cancellable, compute_julia, KernelRun, RenderCancel};

/// Convenience result type for the render crate.
pub type Result<T> = std::result::Result<T, RenderError>;
